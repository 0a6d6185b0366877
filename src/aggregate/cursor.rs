use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::aggregate::request::{Execution, QueryResponse};
use crate::core::error::{Error, ErrorKind, Result};

struct Cursor {
    exec: Execution,
    last_access: DateTime<Utc>,
    max_idle_ms: u64,
    chunk_size: usize,
}

/// Holds paused executions behind opaque ids. `read` resumes a chain for a
/// bounded chunk; idle cursors are reclaimed by `expire_idle`.
pub struct CursorRegistry {
    cursors: Mutex<HashMap<u64, Cursor>>,
    next_id: AtomicU64,
}

impl Default for CursorRegistry {
    fn default() -> Self {
        CursorRegistry {
            cursors: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl CursorRegistry {
    pub fn new() -> Self {
        CursorRegistry::default()
    }

    pub fn open(&self, exec: Execution, max_idle_ms: u64, chunk_size: usize) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        self.cursors.lock().insert(
            id,
            Cursor {
                exec,
                last_access: Utc::now(),
                max_idle_ms,
                chunk_size,
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.cursors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.lock().is_empty()
    }

    /// Resume the cursor for up to `count` rows (capped by the cursor's
    /// chunk size). Returns the chunk and the cursor id when more remains;
    /// an exhausted cursor is released automatically.
    pub fn read(&self, id: u64, count: usize) -> Result<(QueryResponse, Option<u64>)> {
        let mut cursors = self.cursors.lock();
        let cursor = cursors
            .get_mut(&id)
            .ok_or_else(|| Error::new(ErrorKind::NoSuchKey, format!("no cursor {id}")))?;

        let take = if count == 0 {
            cursor.chunk_size
        } else {
            count.min(cursor.chunk_size)
        };
        let outcome = cursor.exec.drain(take);
        cursor.last_access = Utc::now();
        match outcome {
            Ok((chunk, done)) => {
                if done {
                    cursors.remove(&id);
                    Ok((chunk, None))
                } else {
                    Ok((chunk, Some(id)))
                }
            }
            Err(e) => {
                cursors.remove(&id);
                Err(e)
            }
        }
    }

    pub fn del(&self, id: u64) -> Result<()> {
        self.cursors
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::new(ErrorKind::NoSuchKey, format!("no cursor {id}")))
    }

    /// Reclaim cursors idle past their deadline. Returns how many died.
    pub fn expire_idle(&self) -> usize {
        let now = Utc::now();
        let mut cursors = self.cursors.lock();
        let before = cursors.len();
        cursors.retain(|_, c| {
            let idle = now
                .signed_duration_since(c.last_access)
                .num_milliseconds()
                .max(0) as u64;
            idle < c.max_idle_ms
        });
        before - cursors.len()
    }
}
