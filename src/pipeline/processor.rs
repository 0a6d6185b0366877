use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use crate::concurrent::{ConcurrentCtx, TickOutcome};
use crate::core::error::Result;
use crate::core::spec::IndexSpec;
use crate::core::types::{DocId, FieldValue};
use crate::index::doc_table::DocumentMetadata;
use crate::scoring::ScoreExplanation;
use crate::search::index_result::IndexResult;
use crate::search::iterator::IndexIterator;
use crate::value::lookup::{LookupKey, LookupRow};
use crate::value::Value;

/// What a processor's `next` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpResult {
    Ok,
    Eof,
}

/// One row moving down the processor chain.
#[derive(Default)]
pub struct SearchResult {
    pub doc_id: DocId,
    pub score: f64,
    pub score_explain: Option<ScoreExplanation>,
    pub index_result: Option<IndexResult>,
    pub dmd: Option<Arc<DocumentMetadata>>,
    pub row: LookupRow,
}

impl SearchResult {
    pub fn new() -> Self {
        SearchResult::default()
    }

    /// Reset for reuse, keeping the row allocation.
    pub fn clear(&mut self) {
        self.doc_id = DocId(0);
        self.score = 0.0;
        self.score_explain = None;
        self.index_result = None;
        self.dmd = None;
        self.row.wipe();
    }
}

/// Value resolution used by the sorter, grouper and reducers: the row wins;
/// otherwise fall back to the document's sorting vector.
pub fn resolve_value(res: &SearchResult, key: &LookupKey) -> Option<Value> {
    if let Some(v) = res.row.get(key) {
        return Some(v.clone());
    }
    let ordinal = key.sort_ordinal?;
    let sv = res.dmd.as_ref()?.sort_vector()?;
    sv.get(ordinal).filter(|v| !v.is_null()).cloned()
}

pub fn field_to_value(v: &FieldValue) -> Value {
    match v {
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Numeric(n) => Value::Number(*n),
        FieldValue::Tag(s) => Value::String(s.clone()),
        FieldValue::Geo(lon, lat) => Value::String(format!("{lon},{lat}")),
    }
}

/// State shared along one chain: the running result count, the scorer's
/// lower bound, the truncation flag, and the out-of-band error slot the
/// sorter's comparator reports through.
#[derive(Default)]
pub struct QueryProcessingCtx {
    pub total_results: AtomicUsize,
    pub min_score: Mutex<f64>,
    pub timed_out: AtomicBool,
    pub err: Mutex<Option<crate::core::error::Error>>,
}

impl QueryProcessingCtx {
    pub fn new() -> Arc<Self> {
        Arc::new(QueryProcessingCtx::default())
    }

    pub fn total(&self) -> usize {
        self.total_results.load(Ordering::Acquire)
    }
}

/// One stage of the pull-based output pipeline.
pub trait ResultProcessor: Send {
    fn name(&self) -> &'static str;
    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult>;
}

/// The topmost processor of every chain: pulls raw matches from the root
/// iterator, drops deleted documents, attaches metadata and counts results.
/// Ticks the concurrent context once per pulled row.
pub struct RootProcessor {
    it: Box<dyn IndexIterator>,
    spec: Arc<IndexSpec>,
    qctx: Arc<QueryProcessingCtx>,
    conc: ConcurrentCtx,
}

impl RootProcessor {
    pub fn new(
        it: Box<dyn IndexIterator>,
        spec: Arc<IndexSpec>,
        qctx: Arc<QueryProcessingCtx>,
        conc: ConcurrentCtx,
    ) -> Self {
        RootProcessor {
            it,
            spec,
            qctx,
            conc,
        }
    }
}

impl ResultProcessor for RootProcessor {
    fn name(&self) -> &'static str {
        "Index"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        loop {
            match self.conc.tick()? {
                TickOutcome::Continue => {}
                TickOutcome::TruncateResults => {
                    self.qctx.timed_out.store(true, Ordering::Release);
                    return Ok(RpResult::Eof);
                }
            }
            let Some(r) = self.it.read() else {
                return Ok(RpResult::Eof);
            };
            let dmd = self.spec.inner.read().docs.get_by_id(r.doc_id);
            let Some(dmd) = dmd else {
                continue;
            };
            if dmd.is_deleted() {
                continue;
            }

            self.qctx.total_results.fetch_add(1, Ordering::AcqRel);
            res.clear();
            res.doc_id = r.doc_id;
            res.index_result = Some(r);
            res.dmd = Some(dmd);
            return Ok(RpResult::Ok);
        }
    }
}
