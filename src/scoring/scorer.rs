use std::collections::HashMap;
use std::sync::Arc;
use crate::index::doc_table::DocumentMetadata;
use crate::search::index_result::IndexResult;

/// Sentinel a scoring function returns to drop the row entirely.
pub const SCORE_FILTEROUT: f64 = -1.0;

/// Score explanation tree, captured when the request asks for it.
#[derive(Debug, Clone)]
pub struct ScoreExplanation {
    pub value: f64,
    pub description: String,
    pub children: Vec<ScoreExplanation>,
}

/// Collection-level statistics handed to every scoring call.
#[derive(Debug, Clone, Copy)]
pub struct ScoringArgs {
    pub total_docs: usize,
    pub avg_doc_len: f64,
    pub explain: bool,
}

pub trait ScoringFunction: Send + Sync {
    fn name(&self) -> &str;

    fn score(
        &self,
        args: &ScoringArgs,
        res: &IndexResult,
        md: &DocumentMetadata,
        min_score: f64,
    ) -> (f64, Option<ScoreExplanation>);
}

/// Default scorer: sum of freq * idf * weight over the term hits,
/// normalized by the document's max term frequency. The document score does
/// not factor in; scorers that want it use `bm25` or `docscore`. Results
/// falling under the current minimum are filtered.
pub struct TfIdfScorer;

impl ScoringFunction for TfIdfScorer {
    fn name(&self) -> &str {
        "tfidf"
    }

    fn score(
        &self,
        args: &ScoringArgs,
        res: &IndexResult,
        md: &DocumentMetadata,
        min_score: f64,
    ) -> (f64, Option<ScoreExplanation>) {
        let mut raw = 0.0;
        let mut children = Vec::new();
        res.for_each_term(&mut |term, _offsets, freq| {
            let contribution = freq as f64 * term.idf * term.weight;
            raw += contribution;
            if args.explain {
                children.push(ScoreExplanation {
                    value: contribution,
                    description: format!(
                        "term `{}`: freq {} * idf {:.3} * weight {}",
                        term.text(),
                        freq,
                        term.idf,
                        term.weight
                    ),
                    children: Vec::new(),
                });
            }
        });
        let norm = md.max_freq().max(1) as f64;
        let score = raw / norm;
        if score < min_score {
            return (SCORE_FILTEROUT, None);
        }
        let explain = args.explain.then(|| ScoreExplanation {
            value: score,
            description: format!("tfidf {raw:.3} / maxFreq {norm}"),
            children,
        });
        (score, explain)
    }
}

pub struct Bm25Scorer {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Bm25Scorer { k1: 1.2, b: 0.75 }
    }
}

impl ScoringFunction for Bm25Scorer {
    fn name(&self) -> &str {
        "bm25"
    }

    fn score(
        &self,
        args: &ScoringArgs,
        res: &IndexResult,
        md: &DocumentMetadata,
        _min_score: f64,
    ) -> (f64, Option<ScoreExplanation>) {
        let doc_len = md.len() as f64;
        let avg = if args.avg_doc_len > 0.0 { args.avg_doc_len } else { 1.0 };
        let mut score = 0.0;
        let mut children = Vec::new();
        res.for_each_term(&mut |term, _offsets, freq| {
            let f = freq as f64;
            let denom = f + self.k1 * (1.0 - self.b + self.b * doc_len / avg);
            let contribution = term.idf * f * (self.k1 + 1.0) / denom * term.weight;
            score += contribution;
            if args.explain {
                children.push(ScoreExplanation {
                    value: contribution,
                    description: format!("term `{}`: bm25 partial", term.text()),
                    children: Vec::new(),
                });
            }
        });
        score *= md.score as f64;
        let explain = args.explain.then(|| ScoreExplanation {
            value: score,
            description: format!("bm25, k1={} b={}", self.k1, self.b),
            children,
        });
        (score, explain)
    }
}

/// Ranks purely by the score assigned at ADD time.
pub struct DocScoreScorer;

impl ScoringFunction for DocScoreScorer {
    fn name(&self) -> &str {
        "docscore"
    }

    fn score(
        &self,
        args: &ScoringArgs,
        _res: &IndexResult,
        md: &DocumentMetadata,
        _min_score: f64,
    ) -> (f64, Option<ScoreExplanation>) {
        let explain = args.explain.then(|| ScoreExplanation {
            value: md.score as f64,
            description: "document score".to_string(),
            children: Vec::new(),
        });
        (md.score as f64, explain)
    }
}

/// Process-wide scorer registry, built at start-up and read-only after.
pub struct ScorerRegistry {
    scorers: HashMap<String, Arc<dyn ScoringFunction>>,
}

impl Default for ScorerRegistry {
    fn default() -> Self {
        let mut scorers: HashMap<String, Arc<dyn ScoringFunction>> = HashMap::new();
        scorers.insert("tfidf".to_string(), Arc::new(TfIdfScorer));
        scorers.insert("bm25".to_string(), Arc::new(Bm25Scorer::default()));
        scorers.insert("docscore".to_string(), Arc::new(DocScoreScorer));
        ScorerRegistry { scorers }
    }
}

impl ScorerRegistry {
    pub fn new() -> Self {
        ScorerRegistry::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScoringFunction>> {
        self.scorers.get(name).cloned()
    }

    pub fn default_scorer(&self) -> Arc<dyn ScoringFunction> {
        self.scorers["tfidf"].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;
    use crate::search::index_result::TermData;

    fn md(score: f32, max_freq: u32) -> Arc<DocumentMetadata> {
        let mut table = crate::index::doc_table::DocTable::new();
        table.put("k", score, 0, None).unwrap();
        let md = table.get_by_id(DocId(1)).unwrap();
        md.set_max_freq(max_freq);
        md.set_len(10);
        md
    }

    #[test]
    fn test_tfidf_more_hits_score_higher() {
        let args = ScoringArgs {
            total_docs: 3,
            avg_doc_len: 2.0,
            explain: false,
        };
        let term = TermData::new(b"hello", 1.0, 1.0);
        let two_hits = IndexResult::aggregate(
            DocId(1),
            vec![
                IndexResult::term(DocId(1), 1, 1, vec![0], term.clone()),
                IndexResult::term(DocId(1), 1, 1, vec![1], term.clone()),
            ],
        );
        let one_hit = IndexResult::term(DocId(1), 1, 1, vec![0], term);
        let meta = md(1.0, 1);
        let (s2, _) = TfIdfScorer.score(&args, &two_hits, &meta, 0.0);
        let (s1, _) = TfIdfScorer.score(&args, &one_hit, &meta, 0.0);
        assert!(s2 > s1);
    }

    #[test]
    fn test_min_score_filters_out() {
        let args = ScoringArgs {
            total_docs: 3,
            avg_doc_len: 2.0,
            explain: false,
        };
        let term = TermData::new(b"hello", 0.1, 1.0);
        let hit = IndexResult::term(DocId(1), 1, 1, vec![0], term);
        let meta = md(1.0, 1);
        let (s, _) = TfIdfScorer.score(&args, &hit, &meta, 1_000.0);
        assert_eq!(s, SCORE_FILTEROUT);
    }

    #[test]
    fn test_registry() {
        let reg = ScorerRegistry::new();
        assert!(reg.get("bm25").is_some());
        assert!(reg.get("nope").is_none());
        assert_eq!(reg.default_scorer().name(), "tfidf");
    }

    #[test]
    fn test_explain_captured() {
        let args = ScoringArgs {
            total_docs: 3,
            avg_doc_len: 2.0,
            explain: true,
        };
        let term = TermData::new(b"hello", 1.0, 1.0);
        let hit = IndexResult::term(DocId(1), 2, 1, vec![0, 3], term);
        let meta = md(2.0, 2);
        let (_, explain) = TfIdfScorer.score(&args, &hit, &meta, 0.0);
        let explain = explain.unwrap();
        assert_eq!(explain.children.len(), 1);
        assert!(explain.description.contains("tfidf"));
    }
}
