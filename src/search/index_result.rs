use std::sync::Arc;
use crate::core::types::{DocId, FieldMask, FIELD_MASK_ALL};

/// Query-term metadata shared by every hit of one reader: the term itself,
/// its inverse document frequency and the query-assigned weight.
#[derive(Debug)]
pub struct TermData {
    pub term: Vec<u8>,
    pub idf: f64,
    pub weight: f64,
}

impl TermData {
    pub fn new(term: &[u8], idf: f64, weight: f64) -> Arc<TermData> {
        Arc::new(TermData {
            term: term.to_vec(),
            idf,
            weight,
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.term).into_owned()
    }
}

#[derive(Debug, Clone)]
pub enum IndexResultData {
    /// A single term hit with its position offsets.
    Term { term: Arc<TermData>, offsets: Vec<u32> },
    /// Composite of child results, produced by intersections and unions.
    Aggregate(Vec<IndexResult>),
    /// A numeric or geo hit carrying its value.
    Numeric(f64),
    /// A hit with no term data (wildcard, NOT, optional misses).
    Virtual,
}

/// One match flowing out of the iterator tree. Nestable: aggregate results
/// own their children.
#[derive(Debug, Clone)]
pub struct IndexResult {
    pub doc_id: DocId,
    pub freq: u32,
    pub field_mask: FieldMask,
    pub data: IndexResultData,
}

impl IndexResult {
    pub fn term(
        doc_id: DocId,
        freq: u32,
        field_mask: FieldMask,
        offsets: Vec<u32>,
        term: Arc<TermData>,
    ) -> Self {
        IndexResult {
            doc_id,
            freq,
            field_mask,
            data: IndexResultData::Term { term, offsets },
        }
    }

    pub fn virt(doc_id: DocId) -> Self {
        IndexResult {
            doc_id,
            freq: 0,
            field_mask: FIELD_MASK_ALL,
            data: IndexResultData::Virtual,
        }
    }

    pub fn numeric(doc_id: DocId, value: f64) -> Self {
        IndexResult {
            doc_id,
            freq: 1,
            field_mask: FIELD_MASK_ALL,
            data: IndexResultData::Numeric(value),
        }
    }

    pub fn aggregate(doc_id: DocId, children: Vec<IndexResult>) -> Self {
        let freq = children.iter().map(|c| c.freq).sum();
        let field_mask = children.iter().fold(0, |m, c| m | c.field_mask);
        IndexResult {
            doc_id,
            freq,
            field_mask,
            data: IndexResultData::Aggregate(children),
        }
    }

    pub fn children(&self) -> &[IndexResult] {
        match &self.data {
            IndexResultData::Aggregate(c) => c,
            _ => &[],
        }
    }

    /// All leaf term positions of this subtree, in ascending order.
    pub fn positions(&self) -> Vec<u32> {
        let mut out = Vec::new();
        self.collect_positions(&mut out);
        out.sort_unstable();
        out
    }

    fn collect_positions(&self, out: &mut Vec<u32>) {
        match &self.data {
            IndexResultData::Term { offsets, .. } => out.extend_from_slice(offsets),
            IndexResultData::Aggregate(children) => {
                for c in children {
                    c.collect_positions(out);
                }
            }
            _ => {}
        }
    }

    /// Visit every leaf term hit of the subtree.
    pub fn for_each_term(&self, f: &mut impl FnMut(&Arc<TermData>, &[u32], u32)) {
        match &self.data {
            IndexResultData::Term { term, offsets } => f(term, offsets, self.freq),
            IndexResultData::Aggregate(children) => {
                for c in children {
                    c.for_each_term(f);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_rollup() {
        let td = TermData::new(b"x", 1.0, 1.0);
        let a = IndexResult::term(DocId(7), 2, 1, vec![0, 4], td.clone());
        let b = IndexResult::term(DocId(7), 1, 2, vec![1], td);
        let agg = IndexResult::aggregate(DocId(7), vec![a, b]);
        assert_eq!(agg.freq, 3);
        assert_eq!(agg.field_mask, 3);
        assert_eq!(agg.positions(), vec![0, 1, 4]);
        assert_eq!(agg.children().len(), 2);
    }
}
