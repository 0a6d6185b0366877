use serde::{Serialize, Deserialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u64);

impl DocId {
    pub fn new(id: u64) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Id 0 is reserved for "not yet assigned".
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id)
    }
}

/// Bitfield with one bit per full-text field. ANDed along the query tree and
/// used to filter postings at read time.
pub type FieldMask = u64;

pub const FIELD_MASK_ALL: FieldMask = u64::MAX;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Numeric(f64),
    /// Comma-separated tag values are split by the tag indexer.
    Tag(String),
    /// Longitude, latitude.
    Geo(f64, f64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Tag(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FieldValue::Numeric(n) => Some(*n),
            _ => None,
        }
    }
}

/// A document as submitted for indexing: an external key plus named fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub score: f32,
    pub language: Language,
    pub payload: Option<Vec<u8>>,
    pub fields: Vec<(String, FieldValue)>,
}

impl Document {
    pub fn new(key: impl Into<String>) -> Self {
        Document {
            key: key.into(),
            score: 1.0,
            language: Language::English,
            payload: None,
            fields: Vec::new(),
        }
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(name, FieldValue::Text(value.into()))
    }

    pub fn numeric(self, name: impl Into<String>, value: f64) -> Self {
        self.field(name, FieldValue::Numeric(value))
    }

    pub fn tags(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(name, FieldValue::Tag(value.into()))
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Merge fields from `other` that this document does not list itself.
    /// Used by PARTIAL replace.
    pub fn merge_missing(&mut self, other: &HashMap<String, FieldValue>) {
        for (name, value) in other {
            if self.get_field(name).is_none() {
                self.fields.push((name.clone(), value.clone()));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    English,
    French,
    German,
    Spanish,
    None,
}

impl Language {
    pub fn from_str(s: &str) -> Option<Language> {
        match s.to_ascii_lowercase().as_str() {
            "english" => Some(Language::English),
            "french" => Some(Language::French),
            "german" => Some(Language::German),
            "spanish" => Some(Language::Spanish),
            "none" => Some(Language::None),
            _ => None,
        }
    }
}
