use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use crate::aggregate::expr::{eval_expr, parse_expr, ExprAst};
use crate::aggregate::plan::{AggregatePlan, PlanStep};
use crate::concurrent::ConcurrentCtx;
use crate::core::config::TimeoutPolicy;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::spec::IndexSpec;
use crate::core::types::{DocId, Language};
use crate::index::geo::GeoFilter;
use crate::index::numeric::NumericFilter;
use crate::pipeline::grouper::GrouperProcessor;
use crate::pipeline::highlighter::{HighlightField, HighlighterProcessor};
use crate::pipeline::loader::LoaderProcessor;
use crate::pipeline::pager::PagerProcessor;
use crate::pipeline::processor::{
    QueryProcessingCtx, ResultProcessor, RootProcessor, RpResult, SearchResult,
};
use crate::pipeline::reducer::make_reducer;
use crate::pipeline::scorer::ScorerProcessor;
use crate::pipeline::sorter::{SortMode, SorterProcessor, SORTASCMAP_MAXFIELDS};
use crate::query::eval::{QueryEvalCtx, SearchOptions};
use crate::query::expander::{expand_query, StemmerExpander};
use crate::query::parser::{DefaultOperator, QueryParser};
use crate::scoring::{ScorerRegistry, ScoringArgs};
use crate::value::lookup::{key_flags, Lookup, LookupKey};
use crate::value::{Reply, Value};

pub mod qexec_flags {
    /// Contains aggregations or projections.
    pub const IS_EXTENDED: u32 = 0x01;
    pub const SEND_SCORES: u32 = 0x02;
    pub const SEND_SORTKEYS: u32 = 0x04;
    pub const SEND_NOFIELDS: u32 = 0x08;
    pub const SEND_PAYLOADS: u32 = 0x10;
    pub const IS_CURSOR: u32 = 0x20;
    /// Force single-threaded execution.
    pub const SAFEMODE: u32 = 0x100;
    /// The inverse of IS_EXTENDED; the two cannot coexist.
    pub const IS_SEARCH: u32 = 0x200;
    pub const SEND_HIGHLIGHT: u32 = 0x400;
    /// Only the result count is returned.
    pub const NO_ROWS: u32 = 0x800;
    /// Keep value types instead of stringifying.
    pub const TYPED: u32 = 0x1000;
    pub const SEND_RAWIDS: u32 = 0x2000;
    pub const SEND_SCOREEXPLAIN: u32 = 0x4000;
}

pub const DEFAULT_LIMIT: usize = 10;

/// A fully specified query execution request against one index.
#[derive(Clone)]
pub struct SearchRequest {
    pub query: String,
    pub flags: u32,
    pub timeout_ms: u64,
    pub timeout_policy: Option<TimeoutPolicy>,
    pub offset: usize,
    pub limit: usize,
    /// (field, ascending) pairs; capped by the ascending bitmap width.
    pub sort_by: Vec<(String, bool)>,
    pub scorer: Option<String>,
    pub language: Language,
    pub verbatim: bool,
    pub default_operator: DefaultOperator,
    /// Empty means every non-hidden field.
    pub return_fields: Vec<String>,
    pub highlight: Vec<HighlightField>,
    pub numeric_filters: Vec<NumericFilter>,
    pub geo_filter: Option<GeoFilter>,
    pub id_filter: Vec<DocId>,
    pub slop: i32,
    pub in_order: bool,
    pub plan: AggregatePlan,
    pub cursor_chunk_size: Option<usize>,
}

impl SearchRequest {
    pub fn search(query: &str) -> Self {
        SearchRequest {
            query: query.to_string(),
            flags: qexec_flags::IS_SEARCH,
            timeout_ms: 0,
            timeout_policy: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
            sort_by: Vec::new(),
            scorer: None,
            language: Language::English,
            verbatim: false,
            default_operator: DefaultOperator::Or,
            return_fields: Vec::new(),
            highlight: Vec::new(),
            numeric_filters: Vec::new(),
            geo_filter: None,
            id_filter: Vec::new(),
            slop: -1,
            in_order: false,
            plan: AggregatePlan::new(),
            cursor_chunk_size: None,
        }
    }

    pub fn aggregate(query: &str, plan: AggregatePlan) -> Self {
        let mut req = SearchRequest::search(query);
        req.flags = qexec_flags::IS_EXTENDED;
        req.plan = plan;
        req
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    pub fn limit(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn sort(mut self, field: &str, ascending: bool) -> Self {
        self.sort_by.push((field.to_string(), ascending));
        self
    }

    pub fn filter(mut self, filter: NumericFilter) -> Self {
        self.numeric_filters.push(filter);
        self
    }

    pub fn operator(mut self, op: DefaultOperator) -> Self {
        self.default_operator = op;
        self
    }

    pub fn timeout(mut self, ms: u64, policy: TimeoutPolicy) -> Self {
        self.timeout_ms = ms;
        self.timeout_policy = Some(policy);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.flags & qexec_flags::IS_SEARCH != 0 && self.flags & qexec_flags::IS_EXTENDED != 0 {
            return Err(Error::new(
                ErrorKind::ParseArgs,
                "search and extended modes are mutually exclusive",
            ));
        }
        if self.sort_by.len() > SORTASCMAP_MAXFIELDS {
            return Err(Error::new(
                ErrorKind::Limit,
                format!("cannot sort by more than {SORTASCMAP_MAXFIELDS} fields"),
            ));
        }
        Ok(())
    }

    /// Compile query and plan into a pullable execution.
    pub fn build(&self, spec: &Arc<IndexSpec>) -> Result<Execution> {
        self.validate()?;

        let parser = QueryParser::new(self.default_operator);
        let mut ast = parser.parse(&spec.schema, &self.query)?;
        for nf in &self.numeric_filters {
            ast.set_global_numeric_filter(nf.clone());
        }
        if let Some(gf) = &self.geo_filter {
            ast.set_global_geo_filter(gf.clone());
        }
        if !self.id_filter.is_empty() {
            ast.set_global_id_filter(self.id_filter.clone());
        }
        if !self.verbatim {
            expand_query(
                &mut ast.root,
                &StemmerExpander,
                None,
                &spec.schema,
                self.language,
            );
        }

        let opts = SearchOptions {
            slop: self.slop,
            in_order: self.in_order,
            language: self.language,
            verbatim: self.verbatim,
            ..SearchOptions::default()
        };
        let mut eval_ctx = QueryEvalCtx::new(spec.clone(), opts, ast.num_tokens());
        let root_iter = eval_ctx.eval(&ast.root);

        let policy = self.timeout_policy.unwrap_or(spec.config.timeout_policy);
        let mut conc = ConcurrentCtx::new(spec.clone(), self.timeout_ms, policy);
        conc.register_keys(eval_ctx.opened_keys.drain(..));

        let qctx = QueryProcessingCtx::new();
        let lookup = Arc::new(Mutex::new(Lookup::new()));
        {
            // Sortable fields resolve from the sorting vector without a load.
            let mut lk = lookup.lock();
            for fs in &spec.schema.fields {
                if let Some(ordinal) = fs.sort_ordinal {
                    lk.create(&fs.name, key_flags::SORT_KEY, Some(ordinal));
                }
            }
        }

        let mut chain: Box<dyn ResultProcessor> = Box::new(RootProcessor::new(
            root_iter,
            spec.clone(),
            qctx.clone(),
            conc,
        ));

        if self.flags & qexec_flags::IS_EXTENDED != 0 {
            chain = self.build_extended(chain, spec, &qctx, &lookup)?;
        } else {
            chain = self.build_implicit(chain, spec, &qctx, &lookup)?;
        }

        let sort_key = self
            .sort_by
            .first()
            .and_then(|(name, _)| lookup.lock().get(name));
        Ok(Execution {
            end: chain,
            qctx,
            lookup,
            spec: spec.clone(),
            flags: self.flags,
            sort_key,
            return_fields: self.return_fields.clone(),
            done: false,
        })
    }

    /// The implicit search pipeline: scorer (unless sorting by fields),
    /// sorter, pager, loader, highlighter.
    fn build_implicit(
        &self,
        mut chain: Box<dyn ResultProcessor>,
        spec: &Arc<IndexSpec>,
        qctx: &Arc<QueryProcessingCtx>,
        lookup: &Arc<Mutex<Lookup>>,
    ) -> Result<Box<dyn ResultProcessor>> {
        let (sort_mode, need_scorer) = if self.sort_by.is_empty() {
            (SortMode::Score, true)
        } else {
            let mut keys = Vec::new();
            let mut ascmap = 0u64;
            for (i, (name, ascending)) in self.sort_by.iter().enumerate() {
                keys.push(lookup.lock().get_or_create(name, 0));
                if *ascending {
                    ascmap |= 1 << i;
                }
            }
            (
                SortMode::Fields {
                    keys,
                    ascending_map: ascmap,
                },
                false,
            )
        };

        if need_scorer {
            let registry = ScorerRegistry::new();
            let scorer = match &self.scorer {
                Some(name) => registry.get(name).ok_or_else(|| {
                    Error::new(ErrorKind::NoOption, format!("no such scorer `{name}`"))
                })?,
                None => registry.default_scorer(),
            };
            let stats = spec.stats();
            chain = Box::new(ScorerProcessor::new(
                chain,
                scorer,
                ScoringArgs {
                    total_docs: stats.num_documents,
                    avg_doc_len: stats.avg_doc_len(),
                    explain: self.flags & qexec_flags::SEND_SCOREEXPLAIN != 0,
                },
                qctx.clone(),
            ));
        }

        chain = Box::new(SorterProcessor::new(
            chain,
            sort_mode,
            self.offset + self.limit,
            qctx.clone(),
        ));
        chain = Box::new(PagerProcessor::new(chain, self.offset, self.limit));

        if self.flags & qexec_flags::SEND_NOFIELDS == 0 {
            let keys = if self.return_fields.is_empty() {
                None
            } else {
                let mut lk = lookup.lock();
                Some(
                    self.return_fields
                        .iter()
                        .map(|f| lk.get_or_create(f, key_flags::DOC_SRC))
                        .collect(),
                )
            };
            chain = Box::new(LoaderProcessor::new(
                chain,
                spec.doc_store.clone(),
                lookup.clone(),
                keys,
            ));
        }
        if !self.highlight.is_empty() {
            chain = Box::new(HighlighterProcessor::new(
                chain,
                spec.clone(),
                lookup.clone(),
                self.highlight.clone(),
            ));
        }
        Ok(chain)
    }

    /// Lower the explicit step list onto the chain.
    fn build_extended(
        &self,
        mut chain: Box<dyn ResultProcessor>,
        spec: &Arc<IndexSpec>,
        qctx: &Arc<QueryProcessingCtx>,
        lookup: &Arc<Mutex<Lookup>>,
    ) -> Result<Box<dyn ResultProcessor>> {
        for step in &self.plan.steps {
            match step {
                PlanStep::Load { fields } => {
                    let keys = if fields.is_empty() {
                        None
                    } else {
                        let mut lk = lookup.lock();
                        Some(
                            fields
                                .iter()
                                .map(|f| lk.get_or_create(f, key_flags::DOC_SRC))
                                .collect(),
                        )
                    };
                    chain = Box::new(LoaderProcessor::new(
                        chain,
                        spec.doc_store.clone(),
                        lookup.clone(),
                        keys,
                    ));
                }
                PlanStep::Apply { expr, alias } => {
                    let ast = parse_expr(expr)?;
                    let dst = lookup
                        .lock()
                        .get_or_create(alias, key_flags::OVERRIDE);
                    chain = Box::new(ApplyProcessor {
                        upstream: chain,
                        ast,
                        dst,
                        lookup: lookup.clone(),
                    });
                }
                PlanStep::Filter { expr } => {
                    let ast = parse_expr(expr)?;
                    chain = Box::new(FilterProcessor {
                        upstream: chain,
                        ast,
                        lookup: lookup.clone(),
                        qctx: qctx.clone(),
                    });
                }
                PlanStep::Group { by, reducers } => {
                    let mut lk = lookup.lock();
                    let src_keys: Vec<Arc<LookupKey>> =
                        by.iter().map(|n| lk.get_or_create(n, 0)).collect();
                    // Group keys are written back under the same names.
                    let dst_keys = src_keys.clone();
                    let mut built = Vec::with_capacity(reducers.len());
                    for spec_r in reducers {
                        let src = spec_r
                            .property
                            .as_ref()
                            .map(|p| lk.get_or_create(p, 0));
                        let dst = lk.get_or_create(&spec_r.alias, key_flags::OVERRIDE);
                        built.push((make_reducer(&spec_r.name, src)?, dst));
                    }
                    drop(lk);
                    chain = Box::new(GrouperProcessor::new(chain, src_keys, dst_keys, built));
                }
                PlanStep::Arrange { sort_by, limit } => {
                    if sort_by.len() > SORTASCMAP_MAXFIELDS {
                        return Err(Error::new(
                            ErrorKind::Limit,
                            format!("cannot sort by more than {SORTASCMAP_MAXFIELDS} fields"),
                        ));
                    }
                    let mut keys = Vec::new();
                    let mut ascmap = 0u64;
                    {
                        let mut lk = lookup.lock();
                        for (i, (name, ascending)) in sort_by.iter().enumerate() {
                            keys.push(lk.get_or_create(name, 0));
                            if *ascending {
                                ascmap |= 1 << i;
                            }
                        }
                    }
                    let size = limit.map(|(off, num)| off + num).unwrap_or(0);
                    chain = Box::new(SorterProcessor::new(
                        chain,
                        SortMode::Fields {
                            keys,
                            ascending_map: ascmap,
                        },
                        size,
                        qctx.clone(),
                    ));
                    if let Some((off, num)) = limit {
                        chain = Box::new(PagerProcessor::new(chain, *off, *num));
                    }
                }
                PlanStep::Limit { offset, num } => {
                    chain = Box::new(PagerProcessor::new(chain, *offset, *num));
                }
            }
        }
        Ok(chain)
    }

    /// Build and drain the whole pipeline.
    pub fn execute(&self, spec: &Arc<IndexSpec>) -> Result<QueryResponse> {
        let mut exec = self.build(spec)?;
        let (response, _done) = exec.drain(usize::MAX)?;
        Ok(response)
    }

    /// Build the pipeline, park it behind a cursor, and return the first
    /// chunk. Requires the cursor flag.
    pub fn execute_cursor(
        &self,
        spec: &Arc<IndexSpec>,
        registry: &crate::aggregate::cursor::CursorRegistry,
    ) -> Result<(QueryResponse, Option<u64>)> {
        if self.flags & qexec_flags::IS_CURSOR == 0 {
            return Err(Error::new(
                ErrorKind::ParseArgs,
                "request was not opened with the cursor flag",
            ));
        }
        let exec = self.build(spec)?;
        let chunk = self
            .cursor_chunk_size
            .unwrap_or(spec.config.cursor_chunk_size);
        let id = registry.open(exec, spec.config.cursor_max_idle_ms, chunk);
        registry.read(id, chunk)
    }
}

/// Evaluates an expression into a destination key on every row. Evaluation
/// errors leave the key unset.
struct ApplyProcessor {
    upstream: Box<dyn ResultProcessor>,
    ast: ExprAst,
    dst: Arc<LookupKey>,
    lookup: Arc<Mutex<Lookup>>,
}

impl ResultProcessor for ApplyProcessor {
    fn name(&self) -> &'static str {
        "Apply"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        match self.upstream.next(res)? {
            RpResult::Eof => Ok(RpResult::Eof),
            RpResult::Ok => {
                if let Ok(v) = eval_expr(&self.ast, res, &self.lookup) {
                    res.row.set(&self.dst, v);
                }
                Ok(RpResult::Ok)
            }
        }
    }
}

/// Drops rows whose expression is falsy or fails to evaluate.
struct FilterProcessor {
    upstream: Box<dyn ResultProcessor>,
    ast: ExprAst,
    lookup: Arc<Mutex<Lookup>>,
    qctx: Arc<QueryProcessingCtx>,
}

impl ResultProcessor for FilterProcessor {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        loop {
            match self.upstream.next(res)? {
                RpResult::Eof => return Ok(RpResult::Eof),
                RpResult::Ok => {}
            }
            let keep = eval_expr(&self.ast, res, &self.lookup)
                .map(|v| v.truthy())
                .unwrap_or(false);
            if keep {
                return Ok(RpResult::Ok);
            }
            self.qctx.total_results.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// One serialized output row.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub doc_key: Option<String>,
    pub doc_id: Option<u64>,
    pub score: Option<f64>,
    pub score_explain: Option<crate::scoring::ScoreExplanation>,
    pub sort_key: Option<Reply>,
    pub payload: Option<Vec<u8>>,
    pub fields: Vec<(String, Reply)>,
}

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub total: usize,
    pub rows: Vec<ResultRow>,
    pub timed_out: bool,
    /// Out-of-band warning, e.g. a sort comparison on mismatched types.
    pub warning: Option<String>,
}

/// A compiled, pullable chain; also what a cursor pauses and resumes.
pub struct Execution {
    end: Box<dyn ResultProcessor>,
    qctx: Arc<QueryProcessingCtx>,
    lookup: Arc<Mutex<Lookup>>,
    spec: Arc<IndexSpec>,
    flags: u32,
    sort_key: Option<Arc<LookupKey>>,
    return_fields: Vec<String>,
    done: bool,
}

impl Execution {
    /// Pull up to `max_rows` rows. Returns the chunk and whether the chain
    /// is exhausted.
    pub fn drain(&mut self, max_rows: usize) -> Result<(QueryResponse, bool)> {
        let mut rows = Vec::new();
        let mut res = SearchResult::new();
        while !self.done && rows.len() < max_rows {
            match self.end.next(&mut res)? {
                RpResult::Eof => self.done = true,
                RpResult::Ok => {
                    if self.flags & qexec_flags::NO_ROWS == 0 {
                        rows.push(self.serialize_row(&res));
                    }
                }
            }
        }
        let warning = self.qctx.err.lock().take().map(|e| e.to_string());
        let response = QueryResponse {
            total: self.qctx.total(),
            rows,
            timed_out: self.qctx.timed_out.load(Ordering::Acquire),
            warning,
        };
        Ok((response, self.done))
    }

    fn to_reply(&self, v: &Value) -> Reply {
        if self.flags & qexec_flags::TYPED != 0 {
            Reply::from_value(v)
        } else {
            Reply::from_value_stringified(v)
        }
    }

    fn serialize_row(&self, res: &SearchResult) -> ResultRow {
        let dmd = res.dmd.as_ref();
        let mut fields = Vec::new();
        if self.flags & qexec_flags::SEND_NOFIELDS == 0 {
            let lookup = self.lookup.lock();
            let explicit = !self.return_fields.is_empty();
            for key in lookup.visible_keys() {
                if explicit && !self.return_fields.contains(&key.name) {
                    continue;
                }
                if let Some(v) = res.row.get(key) {
                    fields.push((key.name.clone(), self.to_reply(v)));
                }
            }
        }
        let sort_key = if self.flags & qexec_flags::SEND_SORTKEYS != 0 {
            self.sort_key
                .as_ref()
                .and_then(|k| crate::pipeline::processor::resolve_value(res, k))
                .map(|v| self.to_reply(&v))
        } else {
            None
        };
        ResultRow {
            doc_key: dmd.map(|d| d.key.clone()),
            doc_id: (self.flags & qexec_flags::SEND_RAWIDS != 0).then(|| res.doc_id.0),
            score: (self.flags & qexec_flags::SEND_SCORES != 0).then_some(res.score),
            score_explain: if self.flags & qexec_flags::SEND_SCOREEXPLAIN != 0 {
                res.score_explain.clone()
            } else {
                None
            },
            sort_key,
            payload: if self.flags & qexec_flags::SEND_PAYLOADS != 0 {
                dmd.and_then(|d| d.payload.clone())
            } else {
                None
            },
            fields,
        }
    }

    pub fn spec(&self) -> &Arc<IndexSpec> {
        &self.spec
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::cursor::CursorRegistry;
    use crate::aggregate::plan::ReducerSpec;
    use crate::core::config::Config;
    use crate::core::types::Document;
    use crate::schema::Schema;

    fn spec_with_docs() -> Arc<IndexSpec> {
        let schema = Schema::new()
            .add_text_field("title", false)
            .add_numeric_field("price", true)
            .add_tag_field("tags", ',');
        let config = Config {
            concurrent_mode: false,
            ..Config::default()
        };
        let spec = IndexSpec::new("books", schema, config);
        spec.add(
            Document::new("d1")
                .score(1.0)
                .text("title", "hello world")
                .numeric("price", 10.0)
                .tags("tags", "a,b"),
        )
        .unwrap();
        spec.add(
            Document::new("d2")
                .score(2.0)
                .text("title", "hello there")
                .numeric("price", 20.0)
                .tags("tags", "b,c"),
        )
        .unwrap();
        spec.add(
            Document::new("d3")
                .score(3.0)
                .text("title", "goodbye world")
                .numeric("price", 30.0)
                .tags("tags", "a"),
        )
        .unwrap();
        spec
    }

    fn keys(resp: &QueryResponse) -> Vec<&str> {
        resp.rows
            .iter()
            .filter_map(|r| r.doc_key.as_deref())
            .collect()
    }

    #[test]
    fn test_two_word_query_ranks_by_hits() {
        let spec = spec_with_docs();
        let resp = SearchRequest::search("hello world")
            .with_flags(qexec_flags::SEND_SCORES)
            .execute(&spec)
            .unwrap();
        assert_eq!(resp.total, 3);
        assert_eq!(keys(&resp)[0], "d1");
        assert!(resp.rows[0].score.unwrap() > resp.rows[1].score.unwrap());

        let resp = SearchRequest::search("hello world")
            .limit(0, 1)
            .execute(&spec)
            .unwrap();
        assert_eq!(keys(&resp), vec!["d1"]);
        // With a full heap the scorer drops results under the floor, so the
        // count only covers what could still make the page.
        assert!(resp.total >= 1);

        // Required term plus optional term: only the hello docs match, and
        // the optional hit still lifts d1 above d2.
        let resp = SearchRequest::search("hello ~world")
            .operator(DefaultOperator::And)
            .with_flags(qexec_flags::SEND_SCORES)
            .execute(&spec)
            .unwrap();
        let mut got = keys(&resp);
        got.sort();
        assert_eq!(got, vec!["d1", "d2"]);
        assert_eq!(keys(&resp)[0], "d1");
    }

    #[test]
    fn test_masked_union_intersection() {
        let spec = spec_with_docs();
        let req = SearchRequest::search("@title:(hello|goodbye) world")
            .operator(DefaultOperator::And);
        let resp = req.execute(&spec).unwrap();
        let mut got = keys(&resp);
        got.sort();
        assert_eq!(got, vec!["d1", "d3"]);

        // A document without the queried fields changes nothing.
        spec.add(Document::new("d4").numeric("price", 5.0)).unwrap();
        let resp = req.execute(&spec).unwrap();
        let mut got = keys(&resp);
        got.sort();
        assert_eq!(got, vec!["d1", "d3"]);
    }

    #[test]
    fn test_wildcard_with_numeric_filter() {
        let spec = spec_with_docs();
        let resp = SearchRequest::search("*")
            .filter(NumericFilter::new("price", 15.0, 25.0))
            .execute(&spec)
            .unwrap();
        assert_eq!(keys(&resp), vec!["d2"]);
    }

    #[test]
    fn test_tag_queries() {
        let spec = spec_with_docs();
        let resp = SearchRequest::search("@tags:{a}").execute(&spec).unwrap();
        let mut got = keys(&resp);
        got.sort();
        assert_eq!(got, vec!["d1", "d3"]);

        let resp = SearchRequest::search("@tags:{a|c}").execute(&spec).unwrap();
        assert_eq!(resp.total, 3);

        let resp = SearchRequest::search("@tags:{a b}").execute(&spec).unwrap();
        assert_eq!(resp.total, 0);
    }

    #[test]
    fn test_group_by_with_count() {
        let schema = Schema::new().add_text_field("body", false).add_tag_field("color", ',');
        let config = Config {
            concurrent_mode: false,
            ..Config::default()
        };
        let spec = IndexSpec::new("colors", schema, config);
        for i in 0..5 {
            spec.add(Document::new(format!("r{i}")).text("body", "item").tags("color", "red"))
                .unwrap();
        }
        for i in 0..3 {
            spec.add(Document::new(format!("b{i}")).text("body", "item").tags("color", "blue"))
                .unwrap();
        }

        let plan = AggregatePlan::new()
            .load(&["color"])
            .group_by(&["color"], vec![ReducerSpec::new("COUNT", None, "n")]);
        let resp = SearchRequest::aggregate("item", plan)
            .with_flags(qexec_flags::TYPED)
            .execute(&spec)
            .unwrap();
        assert_eq!(resp.rows.len(), 2);
        let row0: Vec<_> = resp.rows[0].fields.iter().cloned().collect();
        assert!(row0.contains(&("color".to_string(), Reply::String("red".into()))));
        assert!(row0.contains(&("n".to_string(), Reply::Integer(5))));
        let row1: Vec<_> = resp.rows[1].fields.iter().cloned().collect();
        assert!(row1.contains(&("color".to_string(), Reply::String("blue".into()))));
        assert!(row1.contains(&("n".to_string(), Reply::Integer(3))));
    }

    #[test]
    fn test_apply_and_filter_steps() {
        let spec = spec_with_docs();
        let plan = AggregatePlan::new()
            .load(&["price"])
            .filter("@price >= 15")
            .apply("@price * 2", "double_price");
        let resp = SearchRequest::aggregate("*", plan)
            .with_flags(qexec_flags::TYPED)
            .execute(&spec)
            .unwrap();
        assert_eq!(resp.rows.len(), 2);
        for row in &resp.rows {
            let doubled = row
                .fields
                .iter()
                .find(|(n, _)| n == "double_price")
                .map(|(_, v)| v.clone());
            assert!(matches!(doubled, Some(Reply::Integer(40)) | Some(Reply::Integer(60))));
        }
        assert_eq!(resp.total, 2);
    }

    #[test]
    fn test_sort_by_field_with_limit() {
        let spec = spec_with_docs();
        let resp = SearchRequest::search("*")
            .sort("price", false)
            .limit(0, 2)
            .with_flags(qexec_flags::SEND_SORTKEYS)
            .execute(&spec)
            .unwrap();
        assert_eq!(keys(&resp), vec!["d3", "d2"]);
        assert_eq!(resp.rows[0].sort_key, Some(Reply::String("30".into())));

        let resp = SearchRequest::search("*")
            .sort("price", true)
            .limit(1, 2)
            .execute(&spec)
            .unwrap();
        assert_eq!(keys(&resp), vec!["d2", "d3"]);
    }

    #[test]
    fn test_delete_then_query_roundtrip() {
        let spec = spec_with_docs();
        assert!(spec.delete_document("d1"));
        let resp = SearchRequest::search("hello").execute(&spec).unwrap();
        assert_eq!(keys(&resp), vec!["d2"]);
        assert!(!spec.delete_document("d1"));
    }

    #[test]
    fn test_replace_swaps_payload_and_fields() {
        let spec = spec_with_docs();
        spec.replace(
            Document::new("d1")
                .payload(b"fresh".to_vec())
                .text("title", "brand new thing")
                .numeric("price", 99.0),
        )
        .unwrap();

        let resp = SearchRequest::search("hello").execute(&spec).unwrap();
        assert_eq!(keys(&resp), vec!["d2"]);

        let resp = SearchRequest::search("brand")
            .with_flags(qexec_flags::SEND_PAYLOADS)
            .execute(&spec)
            .unwrap();
        assert_eq!(keys(&resp), vec!["d1"]);
        assert_eq!(resp.rows[0].payload.as_deref(), Some(&b"fresh"[..]));
        let price = resp.rows[0]
            .fields
            .iter()
            .find(|(n, _)| n == "price")
            .map(|(_, v)| v.clone());
        assert_eq!(price, Some(Reply::String("99".into())));
    }

    #[test]
    fn test_return_fields_and_norows() {
        let spec = spec_with_docs();
        let resp = SearchRequest::search("hello")
            .execute(&spec)
            .unwrap();
        assert!(resp.rows[0].fields.iter().any(|(n, _)| n == "title"));

        let mut req = SearchRequest::search("hello");
        req.return_fields = vec!["price".to_string()];
        let resp = req.execute(&spec).unwrap();
        assert!(resp.rows[0].fields.iter().all(|(n, _)| n == "price"));

        let resp = SearchRequest::search("hello")
            .with_flags(qexec_flags::NO_ROWS)
            .execute(&spec)
            .unwrap();
        assert_eq!(resp.total, 2);
        assert!(resp.rows.is_empty());
    }

    #[test]
    fn test_highlight_and_summarize() {
        let spec = spec_with_docs();
        let mut req = SearchRequest::search("hello");
        req.highlight = vec![HighlightField::highlight("title")];
        let resp = req.execute(&spec).unwrap();
        let title = resp.rows[0]
            .fields
            .iter()
            .find(|(n, _)| n == "title")
            .map(|(_, v)| v.clone())
            .unwrap();
        match title {
            Reply::String(s) => assert!(s.contains("<b>hello</b>"), "{s}"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_cursor_protocol() {
        let spec = spec_with_docs();
        let registry = CursorRegistry::new();
        let exec = SearchRequest::search("*").limit(0, 10).build(&spec).unwrap();
        let id = registry.open(exec, 60_000, 2);

        let (chunk, more) = registry.read(id, 2).unwrap();
        assert_eq!(chunk.rows.len(), 2);
        assert_eq!(more, Some(id));

        let (chunk, more) = registry.read(id, 2).unwrap();
        assert_eq!(chunk.rows.len(), 1);
        assert_eq!(more, None);
        assert!(registry.read(id, 2).is_err());
        assert!(registry.is_empty());

        // The request-level entry point enforces the cursor flag and uses
        // the configured chunk size.
        let mut req = SearchRequest::search("*").with_flags(qexec_flags::IS_CURSOR);
        req.cursor_chunk_size = Some(2);
        let (chunk, more) = req.execute_cursor(&spec, &registry).unwrap();
        assert_eq!(chunk.rows.len(), 2);
        assert!(more.is_some());
        registry.del(more.unwrap()).unwrap();

        let plain = SearchRequest::search("*");
        assert!(plain.execute_cursor(&spec, &registry).is_err());
    }

    #[test]
    fn test_geo_query() {
        let schema = Schema::new().add_text_field("name", false).add_geo_field("loc");
        let config = Config {
            concurrent_mode: false,
            ..Config::default()
        };
        let spec = IndexSpec::new("places", schema, config);
        spec.add(Document::new("paris").text("name", "cafe").field(
            "loc",
            crate::core::types::FieldValue::Geo(2.3522, 48.8566),
        ))
        .unwrap();
        spec.add(Document::new("london").text("name", "cafe").field(
            "loc",
            crate::core::types::FieldValue::Geo(-0.1278, 51.5074),
        ))
        .unwrap();

        let resp = SearchRequest::search("cafe @loc:[2.35 48.85 20 km]")
            .operator(DefaultOperator::And)
            .execute(&spec)
            .unwrap();
        assert_eq!(keys(&resp), vec!["paris"]);

        // Replace purges the on-demand geo entries of the old document.
        spec.replace(Document::new("paris").text("name", "cafe"))
            .unwrap();
        let resp = SearchRequest::search("cafe @loc:[2.35 48.85 20 km]")
            .operator(DefaultOperator::And)
            .execute(&spec)
            .unwrap();
        assert_eq!(resp.total, 0);
    }

    #[test]
    fn test_flag_conflict_rejected() {
        let spec = spec_with_docs();
        let req = SearchRequest::search("x")
            .with_flags(qexec_flags::IS_EXTENDED);
        assert_eq!(
            req.execute(&spec).unwrap_err().kind,
            ErrorKind::ParseArgs
        );
    }

    #[test]
    fn test_stemming_expander_recall() {
        let schema = Schema::new().add_text_field("body", false);
        let config = Config {
            concurrent_mode: false,
            ..Config::default()
        };
        let spec = IndexSpec::new("stems", schema, config);
        spec.add(Document::new("d1").text("body", "running shoes")).unwrap();

        let resp = SearchRequest::search("running").execute(&spec).unwrap();
        assert_eq!(keys(&resp), vec!["d1"]);

        // Verbatim mode skips the expansion and misses the stemmed term.
        let mut req = SearchRequest::search("running");
        req.verbatim = true;
        let resp = req.execute(&spec).unwrap();
        assert_eq!(resp.total, 0);
    }
}
