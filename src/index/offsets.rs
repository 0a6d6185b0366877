use serde::{Serialize, Deserialize};

/// Span of token positions a single full-text field occupies inside a
/// document's global position sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldByteRange {
    pub field_bit: u32,
    pub first_tok: u32,
    pub last_tok: u32,
}

/// Per-document map from token position to the byte range of that token in
/// the original field text. Built at ingest, consumed by the highlighter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ByteOffsets {
    pub fields: Vec<FieldByteRange>,
    /// Indexed by global token position. Positions dropped by a token
    /// filter hold an empty range.
    pub ranges: Vec<(u32, u32)>,
}

impl ByteOffsets {
    pub fn field_range(&self, field_bit: u32) -> Option<&FieldByteRange> {
        self.fields.iter().find(|f| f.field_bit == field_bit)
    }

    /// Byte range of the token at `position`, if it belongs to the field.
    pub fn token_range(&self, field_bit: u32, position: u32) -> Option<(u32, u32)> {
        let fr = self.field_range(field_bit)?;
        if position < fr.first_tok || position > fr.last_tok {
            return None;
        }
        match self.ranges.get(position as usize) {
            Some(&(s, e)) if e > s => Some((s, e)),
            _ => None,
        }
    }
}

/// Accumulates byte offsets across the fields of one document while it is
/// being tokenized; moved into the metadata table on id assignment.
#[derive(Debug, Default)]
pub struct ByteOffsetsWriter {
    out: ByteOffsets,
    field_base: u32,
}

impl ByteOffsetsWriter {
    pub fn new() -> Self {
        ByteOffsetsWriter::default()
    }

    /// Open a field whose tokens start at `base_position` in the document's
    /// global position sequence.
    pub fn begin_field(&mut self, field_bit: u32, base_position: u32) {
        self.field_base = base_position;
        self.out.fields.push(FieldByteRange {
            field_bit,
            first_tok: base_position,
            last_tok: base_position,
        });
    }

    /// Record the byte range of the token at `position` (field-relative).
    /// Gaps left by dropped tokens stay empty.
    pub fn record_token(&mut self, position: u32, byte_offset: u32, byte_len: u32) {
        let global = (self.field_base + position) as usize;
        if self.out.ranges.len() <= global {
            self.out.ranges.resize(global + 1, (0, 0));
        }
        self.out.ranges[global] = (byte_offset, byte_offset + byte_len);
        if let Some(fr) = self.out.fields.last_mut() {
            fr.last_tok = global as u32;
        }
    }

    pub fn into_offsets(self) -> ByteOffsets {
        self.out
    }

    pub fn is_empty(&self) -> bool {
        self.out.ranges.is_empty()
    }
}
