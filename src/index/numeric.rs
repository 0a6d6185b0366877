use serde::{Serialize, Deserialize};
use crate::core::types::DocId;
use crate::index::inverted::{IndexEncoder, IndexWriteEntry, InvertedIndex, PostingRecord};

/// Unique values a leaf may hold before it is split.
const SPLIT_CARD: usize = 16;
/// Depth cap; beyond it leaves grow without splitting.
const MAX_DEPTH: u32 = 20;

/// Persisted form of a numeric filter, kept as a plain 4-tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericFilter {
    pub min: f64,
    pub max: f64,
    pub inclusive_min: bool,
    pub inclusive_max: bool,
    pub field: String,
}

impl NumericFilter {
    pub fn new(field: &str, min: f64, max: f64) -> Self {
        NumericFilter {
            min,
            max,
            inclusive_min: true,
            inclusive_max: true,
            field: field.to_string(),
        }
    }

    pub fn matches(&self, value: f64) -> bool {
        let lo = if self.inclusive_min {
            value >= self.min
        } else {
            value > self.min
        };
        let hi = if self.inclusive_max {
            value <= self.max
        } else {
            value < self.max
        };
        lo && hi
    }
}

/// A leaf range: bounds plus an entries list encoded as a numeric-variant
/// inverted index.
#[derive(Debug)]
pub struct NumericRange {
    pub min_val: f64,
    pub max_val: f64,
    pub entries: InvertedIndex,
    /// Distinct values seen, up to SPLIT_CARD; used to pick a split point.
    values: Vec<f64>,
}

impl NumericRange {
    fn new() -> Self {
        NumericRange {
            min_val: f64::INFINITY,
            max_val: f64::NEG_INFINITY,
            entries: InvertedIndex::new(IndexEncoder::Numeric),
            values: Vec::new(),
        }
    }

    fn add(&mut self, doc_id: DocId, value: f64) -> usize {
        self.min_val = self.min_val.min(value);
        self.max_val = self.max_val.max(value);
        if self.values.len() < SPLIT_CARD && !self.values.contains(&value) {
            self.values.push(value);
        }
        self.entries
            .write_entry(&IndexWriteEntry::numeric(doc_id, value), 100, 1 << 16)
    }

    fn card(&self) -> usize {
        self.values.len()
    }

    /// Does this leaf overlap the queried interval at all.
    pub fn overlaps(&self, min: f64, max: f64) -> bool {
        self.min_val <= max && self.max_val >= min
    }

    pub fn decode_all(&self) -> Vec<PostingRecord> {
        let mut out = Vec::new();
        for b in 0..self.entries.num_blocks() {
            if let Ok(recs) = self.entries.decode_block(b) {
                out.extend(recs);
            }
        }
        out
    }
}

#[derive(Debug)]
enum NumericNode {
    Leaf(NumericRange),
    Inner {
        /// Values <= split go left.
        split: f64,
        left: Box<NumericNode>,
        right: Box<NumericNode>,
    },
}

/// Balanced-ish tree of non-overlapping ranges for one numeric field.
/// Leaves split on cardinality; every split bumps `revision_id` so resumed
/// readers can detect the shape changed underneath them.
#[derive(Debug)]
pub struct NumericRangeTree {
    root: NumericNode,
    pub num_ranges: usize,
    pub num_entries: usize,
    pub last_doc_id: u64,
    pub revision_id: u64,
}

impl Default for NumericRangeTree {
    fn default() -> Self {
        NumericRangeTree {
            root: NumericNode::Leaf(NumericRange::new()),
            num_ranges: 1,
            num_entries: 0,
            last_doc_id: 0,
            revision_id: 0,
        }
    }
}

impl NumericRangeTree {
    pub fn new() -> Self {
        NumericRangeTree::default()
    }

    pub fn add(&mut self, doc_id: DocId, value: f64) -> usize {
        if doc_id.0 <= self.last_doc_id {
            return 0;
        }
        self.last_doc_id = doc_id.0;
        self.num_entries += 1;

        let mut split_happened = false;
        let written = Self::add_node(&mut self.root, doc_id, value, 0, &mut split_happened);
        if split_happened {
            self.num_ranges += 1;
            self.revision_id += 1;
        }
        written
    }

    fn add_node(
        node: &mut NumericNode,
        doc_id: DocId,
        value: f64,
        depth: u32,
        split_happened: &mut bool,
    ) -> usize {
        match node {
            NumericNode::Inner { split, left, right } => {
                if value <= *split {
                    Self::add_node(left, doc_id, value, depth + 1, split_happened)
                } else {
                    Self::add_node(right, doc_id, value, depth + 1, split_happened)
                }
            }
            NumericNode::Leaf(range) => {
                let written = range.add(doc_id, value);
                if range.card() >= SPLIT_CARD && depth < MAX_DEPTH {
                    *node = Self::split_leaf(range);
                    *split_happened = true;
                }
                written
            }
        }
    }

    fn split_leaf(range: &NumericRange) -> NumericNode {
        let mut values = range.values.clone();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let split = values[values.len() / 2];

        let mut left = NumericRange::new();
        let mut right = NumericRange::new();
        // Records decode in docId order, so each side stays sorted.
        for rec in range.decode_all() {
            if rec.value <= split {
                left.add(rec.doc_id, rec.value);
            } else {
                right.add(rec.doc_id, rec.value);
            }
        }
        NumericNode::Inner {
            split,
            left: Box::new(NumericNode::Leaf(left)),
            right: Box::new(NumericNode::Leaf(right)),
        }
    }

    /// Collect the leaves overlapping `[min, max]`.
    pub fn find(&self, min: f64, max: f64) -> Vec<&NumericRange> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                NumericNode::Leaf(range) => {
                    if range.overlaps(min, max) {
                        out.push(range);
                    }
                }
                NumericNode::Inner { split, left, right } => {
                    if min <= *split {
                        stack.push(left);
                    }
                    if max > *split {
                        stack.push(right);
                    }
                }
            }
        }
        out
    }

    /// Materialize all (docId, value) pairs matching the filter, in docId
    /// order; this is the snapshot the numeric iterator runs over.
    pub fn collect_matching(&self, filter: &NumericFilter) -> Vec<(DocId, f64)> {
        let mut out = Vec::new();
        for range in self.find(filter.min, filter.max) {
            for rec in range.decode_all() {
                if filter.matches(rec.value) {
                    out.push((rec.doc_id, rec.value));
                }
            }
        }
        out.sort_by_key(|(id, _)| *id);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_filter() {
        let mut tree = NumericRangeTree::new();
        tree.add(DocId(1), 10.0);
        tree.add(DocId(2), 20.0);
        tree.add(DocId(3), 30.0);

        let f = NumericFilter::new("price", 15.0, 25.0);
        let hits = tree.collect_matching(&f);
        assert_eq!(hits, vec![(DocId(2), 20.0)]);
    }

    #[test]
    fn test_exclusive_bounds() {
        let mut tree = NumericRangeTree::new();
        tree.add(DocId(1), 10.0);
        tree.add(DocId(2), 20.0);
        let mut f = NumericFilter::new("price", 10.0, 20.0);
        f.inclusive_min = false;
        f.inclusive_max = false;
        assert!(tree.collect_matching(&f).is_empty());
    }

    #[test]
    fn test_split_keeps_entries() {
        let mut tree = NumericRangeTree::new();
        for i in 1..=200u64 {
            tree.add(DocId(i), (i % 50) as f64);
        }
        assert!(tree.num_ranges > 1);
        assert!(tree.revision_id > 0);
        assert_eq!(tree.num_entries, 200);

        let f = NumericFilter::new("n", 0.0, 49.0);
        let hits = tree.collect_matching(&f);
        assert_eq!(hits.len(), 200);
        // docId order maintained across leaves
        for w in hits.windows(2) {
            assert!(w[0].0 < w[1].0);
        }
    }
}
