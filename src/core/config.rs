use serde::{Serialize, Deserialize};

/// Timeout behavior for queries that exceed their deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeoutPolicy {
    /// Return whatever has been accumulated so far.
    ReturnPartial,
    /// Fail the query with a Timeout error.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upper bound on prefix/fuzzy/lex-range term expansions per node.
    pub max_prefix_expansions: usize,
    /// Minimum number of characters allowed in a prefix query.
    pub min_term_prefix: usize,
    /// Maximum number of documents merged into one indexing bulk.
    pub max_bulk_docs: usize,
    /// Iteration throttle for the forward-index merge loop.
    pub merge_iteration_cap: usize,
    /// Postings block rollover thresholds.
    pub block_max_entries: usize,
    pub block_max_bytes: usize,
    /// When false, every index runs its pipeline inline on the caller thread.
    pub concurrent_mode: bool,
    pub timeout_policy: TimeoutPolicy,
    /// Cursors idle longer than this are reclaimed.
    pub cursor_max_idle_ms: u64,
    pub cursor_chunk_size: usize,
    /// Deleted metadata entries tolerated before the worker runs a
    /// reclamation pass.
    pub gc_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_prefix_expansions: 200,
            min_term_prefix: 2,
            max_bulk_docs: 1024,
            merge_iteration_cap: 1000,
            block_max_entries: 100,
            block_max_bytes: 16 * 1024,
            concurrent_mode: true,
            timeout_policy: TimeoutPolicy::ReturnPartial,
            cursor_max_idle_ms: 300_000,
            cursor_chunk_size: 1000,
            gc_threshold: 100,
        }
    }
}
