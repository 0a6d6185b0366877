use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;
use crate::core::config::TimeoutPolicy;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::spec::IndexSpec;
use crate::search::term_iterator::PostingKey;

/// How many ticks pass between deadline checks.
const TICK_CHECK_INTERVAL: u32 = 32;

/// What the pipeline should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Deadline passed under the Return-partial policy: stop pulling and
    /// flush what is accumulated.
    TruncateResults,
}

/// Resume token for a long-running query: the deadline, the timeout policy
/// and the registry of every key opened while evaluating, so that each
/// resume can re-validate the index is still the one the query started on.
pub struct ConcurrentCtx {
    spec: Arc<IndexSpec>,
    expected_id: Uuid,
    deadline: Option<Instant>,
    policy: TimeoutPolicy,
    ticks: u32,
    keys: Vec<PostingKey>,
}

impl ConcurrentCtx {
    pub fn new(spec: Arc<IndexSpec>, timeout_ms: u64, policy: TimeoutPolicy) -> Self {
        let expected_id = spec.unique_id;
        let deadline = if timeout_ms == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(timeout_ms))
        };
        ConcurrentCtx {
            spec,
            expected_id,
            deadline,
            policy,
            ticks: 0,
            keys: Vec::new(),
        }
    }

    pub fn register_key(&mut self, key: PostingKey) {
        self.keys.push(key);
    }

    pub fn register_keys(&mut self, keys: impl IntoIterator<Item = PostingKey>) {
        self.keys.extend(keys);
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Re-validate the index and every registered key after a yield. A
    /// dropped or replaced index terminates the query with Concurrent.
    pub fn revalidate(&self) -> Result<()> {
        if self.spec.is_dropped() || self.spec.unique_id != self.expected_id {
            return Err(Error::new(
                ErrorKind::Concurrent,
                "index was dropped during query",
            ));
        }
        let inner = self.spec.inner.read();
        for key in &self.keys {
            let ok = match key {
                PostingKey::Term(term) => inner.text.contains_key(term),
                PostingKey::Tag { field, value } => inner
                    .tags
                    .get(field)
                    .is_some_and(|t| t.values.get(&value[..]).is_some()),
            };
            if !ok {
                return Err(Error::new(
                    ErrorKind::Concurrent,
                    "indexed key disappeared during query",
                ));
            }
        }
        Ok(())
    }

    /// Scheduled yield point. Most ticks are free; every Nth one checks the
    /// deadline and the index identity.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        self.ticks += 1;
        if self.ticks % TICK_CHECK_INTERVAL != 0 {
            return Ok(TickOutcome::Continue);
        }
        self.revalidate()?;
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return match self.policy {
                    TimeoutPolicy::ReturnPartial => Ok(TickOutcome::TruncateResults),
                    TimeoutPolicy::Fail => {
                        Err(Error::new(ErrorKind::Timeout, "query deadline exceeded"))
                    }
                };
            }
        }
        Ok(TickOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::schema::Schema;

    fn spec() -> Arc<IndexSpec> {
        IndexSpec::new("t", Schema::new().add_text_field("body", false), Config::default())
    }

    #[test]
    fn test_tick_passes_normally() {
        let mut conc = ConcurrentCtx::new(spec(), 0, TimeoutPolicy::Fail);
        for _ in 0..100 {
            assert_eq!(conc.tick().unwrap(), TickOutcome::Continue);
        }
    }

    #[test]
    fn test_dropped_index_fails_revalidation() {
        let spec = spec();
        let conc = ConcurrentCtx::new(spec.clone(), 0, TimeoutPolicy::Fail);
        assert!(conc.revalidate().is_ok());
        spec.drop_index();
        assert_eq!(conc.revalidate().unwrap_err().kind, ErrorKind::Concurrent);
    }

    #[test]
    fn test_zero_deadline_times_out() {
        let mut conc = ConcurrentCtx::new(spec(), 1, TimeoutPolicy::Fail);
        std::thread::sleep(Duration::from_millis(5));
        let mut saw_timeout = false;
        for _ in 0..TICK_CHECK_INTERVAL + 1 {
            if conc.tick().is_err() {
                saw_timeout = true;
                break;
            }
        }
        assert!(saw_timeout);
    }

    #[test]
    fn test_partial_policy_truncates() {
        let mut conc = ConcurrentCtx::new(spec(), 1, TimeoutPolicy::ReturnPartial);
        std::thread::sleep(Duration::from_millis(5));
        let mut saw_truncate = false;
        for _ in 0..TICK_CHECK_INTERVAL + 1 {
            if conc.tick().unwrap() == TickOutcome::TruncateResults {
                saw_truncate = true;
                break;
            }
        }
        assert!(saw_truncate);
    }
}
