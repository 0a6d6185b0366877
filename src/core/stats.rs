use serde::{Serialize, Deserialize};

/// Per-index statistics, updated by the indexing pipeline under the index
/// write lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub num_documents: usize,
    pub num_terms: usize,
    pub num_records: usize,
    pub inverted_size_bytes: usize,
    pub offset_vecs_size: usize,
    pub offset_vec_records: usize,
    pub total_doc_len: u64,
}

impl IndexStats {
    pub fn avg_doc_len(&self) -> f64 {
        if self.num_documents == 0 {
            0.0
        } else {
            self.total_doc_len as f64 / self.num_documents as f64
        }
    }
}
