use std::sync::Arc;
use std::sync::atomic::Ordering;
use crate::core::error::Result;
use crate::pipeline::processor::{QueryProcessingCtx, ResultProcessor, RpResult, SearchResult};
use crate::scoring::{ScoringArgs, ScoringFunction, SCORE_FILTEROUT};

/// Applies the configured scoring function to every row. A FILTEROUT
/// sentinel drops the row and undoes the root's count increment.
pub struct ScorerProcessor {
    upstream: Box<dyn ResultProcessor>,
    scorer: Arc<dyn ScoringFunction>,
    args: ScoringArgs,
    qctx: Arc<QueryProcessingCtx>,
}

impl ScorerProcessor {
    pub fn new(
        upstream: Box<dyn ResultProcessor>,
        scorer: Arc<dyn ScoringFunction>,
        args: ScoringArgs,
        qctx: Arc<QueryProcessingCtx>,
    ) -> Self {
        ScorerProcessor {
            upstream,
            scorer,
            args,
            qctx,
        }
    }
}

impl ResultProcessor for ScorerProcessor {
    fn name(&self) -> &'static str {
        "Scorer"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        loop {
            match self.upstream.next(res)? {
                RpResult::Eof => return Ok(RpResult::Eof),
                RpResult::Ok => {}
            }
            let (Some(ir), Some(dmd)) = (res.index_result.as_ref(), res.dmd.as_ref()) else {
                res.score = 0.0;
                return Ok(RpResult::Ok);
            };
            let min_score = *self.qctx.min_score.lock();
            let (score, explain) = self.scorer.score(&self.args, ir, dmd, min_score);
            if score == SCORE_FILTEROUT {
                // Excluded by the scorer; undo the upstream count.
                self.qctx.total_results.fetch_sub(1, Ordering::AcqRel);
                continue;
            }
            res.score = score;
            res.score_explain = explain;
            return Ok(RpResult::Ok);
        }
    }
}
