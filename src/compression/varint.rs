use bytes::{Buf, BufMut};
use crate::core::error::{Error, ErrorKind, Result};

/// Variable byte encoding for integers (best for small integers).
/// Values < 128 use 1 byte, < 16384 use 2 bytes, etc.
pub fn write_u64(out: &mut impl BufMut, mut value: u64) -> usize {
    let mut written = 1;
    while value >= 128 {
        out.put_u8((value & 127) as u8 | 128); // Set continuation bit
        value >>= 7;
        written += 1;
    }
    out.put_u8(value as u8); // Last byte without continuation bit
    written
}

pub fn write_u32(out: &mut impl BufMut, value: u32) -> usize {
    write_u64(out, value as u64)
}

pub fn read_u64(input: &mut impl Buf) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0;

    while input.has_remaining() {
        let byte = input.get_u8();
        value |= ((byte & 127) as u64) << shift;

        if byte & 128 == 0 {
            return Ok(value);
        }

        shift += 7;
        if shift > 63 {
            return Err(Error::new(ErrorKind::Parse, "varint overflow"));
        }
    }

    Err(Error::new(ErrorKind::Parse, "incomplete varint"))
}

pub fn read_u32(input: &mut impl Buf) -> Result<u32> {
    let v = read_u64(input)?;
    if v > u32::MAX as u64 {
        return Err(Error::new(ErrorKind::Parse, "varint overflow"));
    }
    Ok(v as u32)
}

/// Encoded size of a value without writing it.
pub fn len_u64(value: u64) -> usize {
    let bits = 64 - value.leading_zeros().max(0) as usize;
    (bits.max(1) + 6) / 7
}

/// Encoded size of a delta-coded list.
pub fn deltas_len(values: &[u32]) -> usize {
    let mut last = 0u32;
    let mut len = 0;
    for &v in values {
        len += len_u64(v.wrapping_sub(last) as u64);
        last = v;
    }
    len
}

/// Delta-encode a sorted list of u32 values (exploits the sorted property).
pub fn write_deltas(out: &mut impl BufMut, values: &[u32]) -> usize {
    let mut last = 0u32;
    let mut written = 0;
    for &v in values {
        written += write_u32(out, v.wrapping_sub(last));
        last = v;
    }
    written
}

pub fn read_deltas(input: &mut impl Buf, count: usize) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(count);
    let mut last = 0u32;
    for _ in 0..count {
        last = last.wrapping_add(read_u32(input)?);
        out.push(last);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_varint_roundtrip() {
        let mut buf = BytesMut::new();
        for v in [0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            write_u64(&mut buf, v);
        }
        let mut rd = buf.freeze();
        for v in [0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            assert_eq!(read_u64(&mut rd).unwrap(), v);
        }
    }

    #[test]
    fn test_deltas() {
        let values = [3u32, 9, 10, 150, 4000];
        let mut buf = BytesMut::new();
        write_deltas(&mut buf, &values);
        let mut rd = buf.freeze();
        assert_eq!(read_deltas(&mut rd, values.len()).unwrap(), values);
    }

    #[test]
    fn test_incomplete_varint() {
        let mut rd = &[0x80u8][..];
        assert!(read_u64(&mut rd).is_err());
    }
}
