use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use crate::core::error::{Error, ErrorKind, Result};

const BLOB_MAGIC: u32 = 0x5844_4258; // "XDBX"
const BLOB_VERSION: u8 = 1;

/// Minimal persistence capability the engine asks of its host: opaque blobs
/// addressed by key.
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, blob: Vec<u8>);
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn delete(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        MemoryBlobStore::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, blob: Vec<u8>) {
        self.blobs.write().insert(key.to_string(), blob);
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(key).cloned()
    }

    fn delete(&self, key: &str) {
        self.blobs.write().remove(key);
    }
}

/// Frame layout: magic, version, crc32 of the compressed body, body
/// (lz4-compressed bincode).
pub fn encode_blob<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let body = bincode::serialize(value)?;
    let compressed = lz4_flex::compress_prepend_size(&body);
    let crc = crc32fast::hash(&compressed);

    let mut out = Vec::with_capacity(compressed.len() + 9);
    out.extend_from_slice(&BLOB_MAGIC.to_le_bytes());
    out.push(BLOB_VERSION);
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

pub fn decode_blob<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    if raw.len() < 9 || raw[..4] != BLOB_MAGIC.to_le_bytes() {
        return Err(Error::new(ErrorKind::Parse, "bad blob header"));
    }
    if raw[4] != BLOB_VERSION {
        return Err(Error::new(
            ErrorKind::Parse,
            format!("unsupported blob version {}", raw[4]),
        ));
    }
    let crc = u32::from_le_bytes([raw[5], raw[6], raw[7], raw[8]]);
    let compressed = &raw[9..];
    if crc32fast::hash(compressed) != crc {
        return Err(Error::new(ErrorKind::Parse, "blob checksum mismatch"));
    }
    let body = lz4_flex::decompress_size_prepended(compressed)
        .map_err(|e| Error::new(ErrorKind::Parse, e.to_string()))?;
    Ok(bincode::deserialize(&body)?)
}
