use crate::core::types::DocId;
use crate::index::inverted::{IndexEncoder, IndexWriteEntry, InvertedIndex};
use crate::trie::TrieMap;

/// Per-field tag index: a trie map from tag value to the posting list of
/// documents carrying that tag. Values are normalized (trimmed, lowercased)
/// before both insert and lookup.
#[derive(Debug, Default)]
pub struct TagIndex {
    pub values: TrieMap<InvertedIndex>,
    pub num_docs: usize,
}

pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Split a raw field value on the separator. An empty separator means the
/// whole value is a single tag.
pub fn split_tags(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(normalize_tag)
        .filter(|t| !t.is_empty())
        .collect()
}

impl TagIndex {
    pub fn new() -> Self {
        TagIndex::default()
    }

    /// Index one document's tags. Duplicate values in the same document
    /// collapse to a single posting.
    pub fn index_document(&mut self, doc_id: DocId, tags: &[String]) -> usize {
        let mut written = 0;
        let mut seen: Vec<&str> = Vec::with_capacity(tags.len());
        for tag in tags {
            if seen.contains(&tag.as_str()) {
                continue;
            }
            seen.push(tag);
            let idx = self
                .values
                .get_or_insert_with(tag.as_bytes(), || {
                    InvertedIndex::new(IndexEncoder::DocIdsOnly)
                });
            written += idx.write_entry(&IndexWriteEntry::id_only(doc_id), 100, 1 << 16);
        }
        self.num_docs += 1;
        written
    }

    pub fn posting(&self, tag: &str) -> Option<&InvertedIndex> {
        self.values.get(normalize_tag(tag).as_bytes())
    }

    /// DocIds for an exact tag value, decoded in order.
    pub fn doc_ids(&self, tag: &str) -> Vec<DocId> {
        let mut out = Vec::new();
        if let Some(idx) = self.posting(tag) {
            for b in 0..idx.num_blocks() {
                if let Ok(recs) = idx.decode_block(b) {
                    out.extend(recs.into_iter().map(|r| r.doc_id));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_normalize() {
        assert_eq!(split_tags(" Red, blue ,,GREEN", ','), vec!["red", "blue", "green"]);
    }

    #[test]
    fn test_index_and_lookup() {
        let mut idx = TagIndex::new();
        idx.index_document(DocId(1), &split_tags("a,b", ','));
        idx.index_document(DocId(2), &split_tags("b,c", ','));
        idx.index_document(DocId(3), &split_tags("a", ','));

        assert_eq!(idx.doc_ids("a"), vec![DocId(1), DocId(3)]);
        assert_eq!(idx.doc_ids("b"), vec![DocId(1), DocId(2)]);
        assert_eq!(idx.doc_ids("c"), vec![DocId(2)]);
        assert!(idx.doc_ids("a b").is_empty());
    }

    #[test]
    fn test_duplicate_tags_collapse() {
        let mut idx = TagIndex::new();
        idx.index_document(DocId(1), &split_tags("x,X, x", ','));
        assert_eq!(idx.doc_ids("x"), vec![DocId(1)]);
    }
}
