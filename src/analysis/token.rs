use serde::{Serialize, Deserialize};

/// Token representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub text: String,       // The token text, after filtering
    pub position: u32,      // Position in the field (for phrase queries)
    pub byte_offset: u32,   // Byte offset in the original text
    pub byte_len: u32,      // Token length in bytes, in the original text
    /// Set by the stemmer filter: the unstemmed surface form, kept so exact
    /// matches can still be highlighted.
    pub raw: Option<String>,
}

impl Token {
    pub fn new(text: String, position: u32, byte_offset: u32, byte_len: u32) -> Self {
        Token {
            text,
            position,
            byte_offset,
            byte_len,
            raw: None,
        }
    }
}
