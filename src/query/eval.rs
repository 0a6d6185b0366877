use levenshtein_automata::LevenshteinAutomatonBuilder;
use std::sync::Arc;
use crate::core::spec::IndexSpec;
use crate::core::types::{FieldMask, Language, FIELD_MASK_ALL};
use crate::index::tag::normalize_tag;
use crate::query::ast::{QueryNode, QueryNodeKind};
use crate::schema::FieldType;
use crate::search::exclusion::{NotIterator, OptionalIterator};
use crate::search::index_result::TermData;
use crate::search::intersect::IntersectIterator;
use crate::search::iterator::{
    EmptyIterator, GeoFilterIterator, IdListIterator, IndexIterator, NumericFilterIterator,
    WildcardIterator,
};
use crate::search::term_iterator::{PostingKey, PostingSource, TermIterator};
use crate::search::union::UnionIterator;

/// Request-level options that shape evaluation.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub slop: i32,
    pub in_order: bool,
    pub field_mask: FieldMask,
    pub language: Language,
    /// Disables query expansion entirely.
    pub verbatim: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            slop: -1,
            in_order: false,
            field_mask: FIELD_MASK_ALL,
            language: Language::English,
            verbatim: false,
        }
    }
}

/// Evaluation context: translates each AST node into an iterator. An
/// unsatisfiable node (missing field, wrong type, too-short prefix) becomes
/// an empty iterator rather than an error.
pub struct QueryEvalCtx {
    pub spec: Arc<IndexSpec>,
    pub opts: SearchOptions,
    pub num_tokens: usize,
    /// Keys opened during evaluation; the caller hands them to the
    /// concurrent context for resume-safe revalidation.
    pub opened_keys: Vec<PostingKey>,
    total_docs: usize,
    max_doc_id: u64,
}

impl QueryEvalCtx {
    pub fn new(spec: Arc<IndexSpec>, opts: SearchOptions, num_tokens: usize) -> Self {
        let (total_docs, max_doc_id) = {
            let inner = spec.inner.read();
            (inner.docs.count, inner.docs.max_doc_id)
        };
        QueryEvalCtx {
            spec,
            opts,
            num_tokens,
            opened_keys: Vec::new(),
            total_docs,
            max_doc_id,
        }
    }

    pub fn eval(&mut self, node: &QueryNode) -> Box<dyn IndexIterator> {
        self.eval_masked(node, self.opts.field_mask)
    }

    fn eval_masked(&mut self, node: &QueryNode, mask: FieldMask) -> Box<dyn IndexIterator> {
        let eff_mask = node.opts.field_mask & mask;
        match &node.kind {
            QueryNodeKind::Token { term, .. } => self.eval_token(term, eff_mask, node.opts.weight),
            QueryNodeKind::Prefix { prefix } => self.eval_prefix(prefix, eff_mask, node.opts.weight),
            QueryNodeKind::Fuzzy { term, max_dist } => {
                self.eval_fuzzy(term, *max_dist, eff_mask, node.opts.weight)
            }
            QueryNodeKind::LexRange {
                begin,
                include_begin,
                end,
                include_end,
            } => self.eval_lex_range(
                begin.as_deref(),
                *include_begin,
                end.as_deref(),
                *include_end,
                eff_mask,
                node.opts.weight,
            ),
            QueryNodeKind::Phrase { exact } => self.eval_phrase(node, *exact, eff_mask),
            QueryNodeKind::Union => self.eval_union(node, eff_mask),
            QueryNodeKind::Not => {
                let child = node
                    .children
                    .first()
                    .map(|c| self.eval_masked(c, eff_mask));
                Box::new(NotIterator::new(child, self.max_doc_id))
            }
            QueryNodeKind::Optional => {
                let child = node
                    .children
                    .first()
                    .map(|c| self.eval_masked(c, eff_mask));
                Box::new(OptionalIterator::new(child, self.max_doc_id, node.opts.weight))
            }
            QueryNodeKind::Numeric { filter } => {
                let is_numeric = self
                    .spec
                    .schema
                    .field(&filter.field)
                    .is_some_and(|f| f.field_type == FieldType::Numeric);
                if !is_numeric {
                    return Box::new(EmptyIterator);
                }
                let inner = self.spec.inner.read();
                match inner.numeric.get(&filter.field) {
                    Some(tree) => {
                        Box::new(NumericFilterIterator::new(tree.collect_matching(filter)))
                    }
                    None => Box::new(EmptyIterator),
                }
            }
            QueryNodeKind::Geo { filter } => {
                let is_geo = self
                    .spec
                    .schema
                    .field(&filter.field)
                    .is_some_and(|f| f.field_type == FieldType::Geo);
                if !is_geo {
                    return Box::new(EmptyIterator);
                }
                let inner = self.spec.inner.read();
                match inner.geo.get(&filter.field) {
                    Some(gi) => Box::new(GeoFilterIterator::new(gi.query(filter))),
                    None => Box::new(EmptyIterator),
                }
            }
            QueryNodeKind::Ids { ids } => Box::new(IdListIterator::new(ids.clone())),
            QueryNodeKind::Tag { field } => self.eval_tag(node, field, node.opts.weight),
            QueryNodeKind::Wildcard => Box::new(WildcardIterator::new(self.max_doc_id)),
            QueryNodeKind::Null => Box::new(EmptyIterator),
        }
    }

    fn idf(&self, doc_freq: u32) -> f64 {
        (1.0 + self.total_docs as f64 / doc_freq.max(1) as f64).ln()
    }

    fn eval_token(
        &mut self,
        term: &str,
        mask: FieldMask,
        weight: f64,
    ) -> Box<dyn IndexIterator> {
        // Single-word fast path: only when the mask is unrestricted and the
        // weight is default.
        let fast_path = self.num_tokens == 1 && mask == FIELD_MASK_ALL && weight == 1.0;
        self.open_term_reader(term.as_bytes(), mask, weight, fast_path)
    }

    fn open_term_reader(
        &mut self,
        term: &[u8],
        mask: FieldMask,
        weight: f64,
        fast_path: bool,
    ) -> Box<dyn IndexIterator> {
        let doc_freq = {
            let inner = self.spec.inner.read();
            inner.text.get(term).map(|idx| idx.num_docs)
        };
        let Some(doc_freq) = doc_freq else {
            return Box::new(EmptyIterator);
        };
        let key = PostingKey::Term(term.to_vec());
        self.opened_keys.push(key.clone());
        Box::new(TermIterator::new(
            PostingSource::new(self.spec.clone(), key),
            TermData::new(term, self.idf(doc_freq), weight),
            mask,
            fast_path,
        ))
    }

    fn make_union(&self, mut iters: Vec<Box<dyn IndexIterator>>) -> Box<dyn IndexIterator> {
        match iters.len() {
            0 => Box::new(EmptyIterator),
            1 => iters.pop().unwrap(),
            _ => Box::new(UnionIterator::new(iters)),
        }
    }

    /// Expand through the terms trie and union one reader per expansion.
    fn eval_expanded_terms(
        &mut self,
        terms: Vec<Vec<u8>>,
        mask: FieldMask,
        weight: f64,
    ) -> Box<dyn IndexIterator> {
        let iters: Vec<Box<dyn IndexIterator>> = terms
            .iter()
            .map(|t| self.open_term_reader(t, mask, weight, false))
            .collect();
        self.make_union(iters)
    }

    fn eval_prefix(
        &mut self,
        prefix: &str,
        mask: FieldMask,
        weight: f64,
    ) -> Box<dyn IndexIterator> {
        if prefix.len() < self.spec.config.min_term_prefix {
            return Box::new(EmptyIterator);
        }
        let terms = {
            let inner = self.spec.inner.read();
            inner
                .terms
                .find_prefix(prefix.as_bytes(), self.spec.config.max_prefix_expansions)
        };
        self.eval_expanded_terms(terms, mask, weight)
    }

    fn eval_fuzzy(
        &mut self,
        term: &str,
        max_dist: u8,
        mask: FieldMask,
        weight: f64,
    ) -> Box<dyn IndexIterator> {
        let dfa = LevenshteinAutomatonBuilder::new(max_dist, true).build_dfa(term);
        let terms = {
            let inner = self.spec.inner.read();
            inner
                .terms
                .find_fuzzy(&dfa, self.spec.config.max_prefix_expansions)
        };
        self.eval_expanded_terms(terms, mask, weight)
    }

    fn eval_lex_range(
        &mut self,
        begin: Option<&str>,
        include_begin: bool,
        end: Option<&str>,
        include_end: bool,
        mask: FieldMask,
        weight: f64,
    ) -> Box<dyn IndexIterator> {
        let terms = {
            let inner = self.spec.inner.read();
            inner.terms.find_range(
                begin.map(|s| s.as_bytes()),
                include_begin,
                end.map(|s| s.as_bytes()),
                include_end,
                self.spec.config.max_prefix_expansions,
            )
        };
        self.eval_expanded_terms(terms, mask, weight)
    }

    fn eval_phrase(
        &mut self,
        node: &QueryNode,
        exact: bool,
        mask: FieldMask,
    ) -> Box<dyn IndexIterator> {
        if node.children.is_empty() {
            return Box::new(EmptyIterator);
        }
        if node.children.len() == 1 {
            return self.eval_masked(&node.children[0], mask);
        }
        let iters: Vec<Box<dyn IndexIterator>> = node
            .children
            .iter()
            .map(|c| self.eval_masked(c, mask))
            .collect();

        let (slop, in_order) = if exact {
            (0, true)
        } else {
            let mut slop = if node.opts.max_slop == -1 {
                self.opts.slop
            } else {
                node.opts.max_slop
            };
            let in_order = self.opts.in_order || node.opts.in_order;
            // Without a slop bound the order of results cannot be checked,
            // so in-order implies the widest window.
            if in_order && slop == -1 {
                slop = i32::MAX;
            }
            (slop, in_order)
        };
        Box::new(IntersectIterator::new(iters, slop, in_order, node.opts.weight))
    }

    fn eval_union(&mut self, node: &QueryNode, mask: FieldMask) -> Box<dyn IndexIterator> {
        if node.children.len() == 1 {
            return self.eval_masked(&node.children[0], mask);
        }
        let iters: Vec<Box<dyn IndexIterator>> = node
            .children
            .iter()
            .map(|c| self.eval_masked(c, mask))
            .collect();
        self.make_union(iters)
    }

    fn open_tag_reader(&mut self, field: &str, value: &[u8], weight: f64) -> Option<Box<dyn IndexIterator>> {
        let doc_freq = {
            let inner = self.spec.inner.read();
            inner
                .tags
                .get(field)
                .and_then(|t| t.values.get(value))
                .map(|idx| idx.num_docs)
        }?;
        let key = PostingKey::Tag {
            field: field.to_string(),
            value: value.to_vec(),
        };
        self.opened_keys.push(key.clone());
        Some(Box::new(TermIterator::new(
            PostingSource::new(self.spec.clone(), key),
            TermData::new(value, self.idf(doc_freq), weight),
            FIELD_MASK_ALL,
            false,
        )))
    }

    fn eval_single_tag_node(
        &mut self,
        field: &str,
        child: &QueryNode,
        weight: f64,
    ) -> Option<Box<dyn IndexIterator>> {
        match &child.kind {
            QueryNodeKind::Token { term, .. } => {
                self.open_tag_reader(field, normalize_tag(term).as_bytes(), weight)
            }
            QueryNodeKind::Prefix { prefix } => {
                if prefix.len() < self.spec.config.min_term_prefix {
                    return None;
                }
                let values = {
                    let inner = self.spec.inner.read();
                    inner.tags.get(field).map(|t| {
                        t.values.keys_with_prefix(
                            prefix.as_bytes(),
                            self.spec.config.max_prefix_expansions,
                        )
                    })
                }?;
                let iters: Vec<Box<dyn IndexIterator>> = values
                    .iter()
                    .filter_map(|v| self.open_tag_reader(field, v, weight))
                    .collect();
                if iters.is_empty() {
                    None
                } else {
                    Some(self.make_union(iters))
                }
            }
            QueryNodeKind::LexRange {
                begin,
                include_begin,
                end,
                include_end,
            } => {
                let values = {
                    let inner = self.spec.inner.read();
                    inner.tags.get(field).map(|t| {
                        t.values.keys_in_range(
                            begin.as_deref().map(|s| s.as_bytes()),
                            *include_begin,
                            end.as_deref().map(|s| s.as_bytes()),
                            *include_end,
                            self.spec.config.max_prefix_expansions,
                        )
                    })
                }?;
                let iters: Vec<Box<dyn IndexIterator>> = values
                    .iter()
                    .filter_map(|v| self.open_tag_reader(field, v, weight))
                    .collect();
                if iters.is_empty() {
                    None
                } else {
                    Some(self.make_union(iters))
                }
            }
            QueryNodeKind::Phrase { .. } => {
                // Multi-word tags are a single value with spaces.
                let joined = child
                    .children
                    .iter()
                    .filter_map(|c| match &c.kind {
                        QueryNodeKind::Token { term, .. } => Some(term.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                self.open_tag_reader(field, normalize_tag(&joined).as_bytes(), weight)
            }
            _ => None,
        }
    }

    fn eval_tag(&mut self, node: &QueryNode, field: &str, weight: f64) -> Box<dyn IndexIterator> {
        let is_tag = self
            .spec
            .schema
            .field(field)
            .is_some_and(|f| f.field_type == FieldType::Tag);
        if !is_tag {
            return Box::new(EmptyIterator);
        }
        let iters: Vec<Box<dyn IndexIterator>> = node
            .children
            .iter()
            .filter_map(|c| self.eval_single_tag_node(field, c, weight))
            .collect();
        self.make_union(iters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::spec::IndexSpec;
    use crate::core::types::Document;
    use crate::query::parser::{DefaultOperator, QueryParser};
    use crate::schema::Schema;

    fn sample_spec() -> Arc<IndexSpec> {
        let schema = Schema::new()
            .add_text_field("title", false)
            .add_numeric_field("price", false)
            .add_tag_field("tags", ',');
        let config = Config {
            concurrent_mode: false,
            ..Config::default()
        };
        let spec = IndexSpec::new("books", schema, config);
        spec.add(Document::new("d1").text("title", "hello world").numeric("price", 10.0).tags("tags", "a,b"))
            .unwrap();
        spec.add(Document::new("d2").text("title", "hello there").numeric("price", 20.0).tags("tags", "b,c"))
            .unwrap();
        spec.add(Document::new("d3").text("title", "goodbye world").numeric("price", 30.0).tags("tags", "a"))
            .unwrap();
        spec
    }

    fn run(spec: &Arc<IndexSpec>, query: &str, op: DefaultOperator) -> Vec<u64> {
        let ast = QueryParser::new(op).parse(&spec.schema, query).unwrap();
        let mut ctx = QueryEvalCtx::new(spec.clone(), SearchOptions::default(), ast.num_tokens());
        let mut it = ctx.eval(&ast.root);
        std::iter::from_fn(|| it.read()).map(|r| r.doc_id.0).collect()
    }

    #[test]
    fn test_term_and_union() {
        let spec = sample_spec();
        assert_eq!(run(&spec, "hello", DefaultOperator::Or), vec![1, 2]);
        assert_eq!(run(&spec, "hello world", DefaultOperator::Or), vec![1, 2, 3]);
        assert_eq!(run(&spec, "hello world", DefaultOperator::And), vec![1]);
    }

    #[test]
    fn test_field_masking() {
        let spec = sample_spec();
        assert_eq!(run(&spec, "@title:hello", DefaultOperator::Or), vec![1, 2]);
        assert!(run(&spec, "@missing:hello", DefaultOperator::Or).is_empty());
    }

    #[test]
    fn test_numeric_filter() {
        let spec = sample_spec();
        assert_eq!(run(&spec, "@price:[15 25]", DefaultOperator::Or), vec![2]);
        assert!(run(&spec, "@price:[(20 (30]", DefaultOperator::Or).is_empty());
    }

    #[test]
    fn test_tags() {
        let spec = sample_spec();
        assert_eq!(run(&spec, "@tags:{a}", DefaultOperator::Or), vec![1, 3]);
        assert_eq!(run(&spec, "@tags:{a|c}", DefaultOperator::Or), vec![1, 2, 3]);
        assert!(run(&spec, "@tags:{a b}", DefaultOperator::Or).is_empty());
    }

    #[test]
    fn test_not_and_wildcard() {
        let spec = sample_spec();
        assert_eq!(run(&spec, "*", DefaultOperator::Or), vec![1, 2, 3]);
        assert_eq!(run(&spec, "-hello", DefaultOperator::Or), vec![3]);
    }

    #[test]
    fn test_prefix_too_short_and_expansion() {
        let spec = sample_spec();
        assert!(run(&spec, "h*", DefaultOperator::Or).is_empty());
        assert_eq!(run(&spec, "hel*", DefaultOperator::Or), vec![1, 2]);
    }

    #[test]
    fn test_fuzzy() {
        let spec = sample_spec();
        assert_eq!(run(&spec, "%helo%", DefaultOperator::Or), vec![1, 2]);
    }

    #[test]
    fn test_exact_phrase_matches_order() {
        let spec = sample_spec();
        assert_eq!(run(&spec, "\"hello world\"", DefaultOperator::Or), vec![1]);
        assert!(run(&spec, "\"world hello\"", DefaultOperator::Or).is_empty());
    }

    #[test]
    fn test_deleted_doc_filtered_by_reader() {
        let spec = sample_spec();
        spec.delete_document("d1");
        assert_eq!(run(&spec, "hello", DefaultOperator::Or), vec![2]);
    }

    #[test]
    fn test_registered_keys() {
        let spec = sample_spec();
        let ast = QueryParser::default().parse(&spec.schema, "@tags:{a} hello").unwrap();
        let mut ctx = QueryEvalCtx::new(spec.clone(), SearchOptions::default(), ast.num_tokens());
        let _it = ctx.eval(&ast.root);
        assert_eq!(ctx.opened_keys.len(), 2);
    }
}
