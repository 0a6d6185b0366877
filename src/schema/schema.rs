use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::FieldMask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    FullText,
    Numeric,
    Tag,
    Geo,
}

/// Definition of one field in an index schema.
///
/// A full-text field owns one bit of the index's field mask; a sortable field
/// owns one slot of every document's sorting vector. Both assignments are
/// stable for the life of the index: removing a field never renumbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub indexable: bool,
    pub sortable: bool,
    pub no_stem: bool,
    pub phonetic: bool,
    /// Slot in the document sorting vector, when sortable.
    pub sort_ordinal: Option<usize>,
    /// Bit index into the field mask, for full-text fields.
    pub text_bit: Option<u32>,
    pub tag_separator: char,
}

impl FieldSpec {
    pub fn mask_bit(&self) -> FieldMask {
        match self.text_bit {
            Some(bit) => 1u64 << bit,
            None => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
    next_text_bit: u32,
    next_sort_ordinal: usize,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    fn push_field(&mut self, mut fs: FieldSpec) -> Result<()> {
        if self.field(&fs.name).is_some() {
            return Err(Error::new(
                ErrorKind::AddArgs,
                format!("duplicate field `{}`", fs.name),
            ));
        }
        if fs.field_type == FieldType::FullText {
            if self.next_text_bit >= 64 {
                return Err(Error::new(ErrorKind::Limit, "too many full-text fields"));
            }
            fs.text_bit = Some(self.next_text_bit);
            self.next_text_bit += 1;
        }
        if fs.sortable {
            fs.sort_ordinal = Some(self.next_sort_ordinal);
            self.next_sort_ordinal += 1;
        }
        self.fields.push(fs);
        Ok(())
    }

    pub fn add_text_field(mut self, name: &str, sortable: bool) -> Self {
        let _ = self.push_field(FieldSpec {
            name: name.to_string(),
            field_type: FieldType::FullText,
            indexable: true,
            sortable,
            no_stem: false,
            phonetic: false,
            sort_ordinal: None,
            text_bit: None,
            tag_separator: ',',
        });
        self
    }

    pub fn add_phonetic_text_field(mut self, name: &str) -> Self {
        let _ = self.push_field(FieldSpec {
            name: name.to_string(),
            field_type: FieldType::FullText,
            indexable: true,
            sortable: false,
            no_stem: false,
            phonetic: true,
            sort_ordinal: None,
            text_bit: None,
            tag_separator: ',',
        });
        self
    }

    pub fn add_numeric_field(mut self, name: &str, sortable: bool) -> Self {
        let _ = self.push_field(FieldSpec {
            name: name.to_string(),
            field_type: FieldType::Numeric,
            indexable: true,
            sortable,
            no_stem: false,
            phonetic: false,
            sort_ordinal: None,
            text_bit: None,
            tag_separator: ',',
        });
        self
    }

    pub fn add_tag_field(mut self, name: &str, separator: char) -> Self {
        let _ = self.push_field(FieldSpec {
            name: name.to_string(),
            field_type: FieldType::Tag,
            indexable: true,
            sortable: false,
            no_stem: false,
            phonetic: false,
            sort_ordinal: None,
            text_bit: None,
            tag_separator: separator,
        });
        self
    }

    pub fn add_geo_field(mut self, name: &str) -> Self {
        let _ = self.push_field(FieldSpec {
            name: name.to_string(),
            field_type: FieldType::Geo,
            indexable: true,
            sortable: false,
            no_stem: false,
            phonetic: false,
            sort_ordinal: None,
            text_bit: None,
            tag_separator: ',',
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn text_field_mask(&self, name: &str) -> Option<FieldMask> {
        self.field(name).and_then(|f| {
            if f.field_type == FieldType::FullText {
                Some(f.mask_bit())
            } else {
                None
            }
        })
    }

    pub fn field_name_by_bit(&self, bit: FieldMask) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.mask_bit() == bit)
            .map(|f| f.name.as_str())
    }

    pub fn num_sortables(&self) -> usize {
        self.next_sort_ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_bits_and_ordinals() {
        let schema = Schema::new()
            .add_text_field("title", true)
            .add_text_field("body", false)
            .add_numeric_field("price", true)
            .add_tag_field("tags", ',');

        assert_eq!(schema.field("title").unwrap().text_bit, Some(0));
        assert_eq!(schema.field("body").unwrap().text_bit, Some(1));
        assert_eq!(schema.field("title").unwrap().sort_ordinal, Some(0));
        assert_eq!(schema.field("price").unwrap().sort_ordinal, Some(1));
        assert_eq!(schema.text_field_mask("body"), Some(2));
        assert_eq!(schema.text_field_mask("price"), None);
        assert_eq!(schema.num_sortables(), 2);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut schema = Schema::new().add_text_field("title", false);
        let dup = FieldSpec {
            name: "title".to_string(),
            field_type: FieldType::Numeric,
            indexable: true,
            sortable: false,
            no_stem: false,
            phonetic: false,
            sort_ordinal: None,
            text_bit: None,
            tag_separator: ',',
        };
        assert!(schema.push_field(dup).is_err());
    }
}
