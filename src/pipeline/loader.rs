use parking_lot::Mutex;
use std::sync::Arc;
use crate::core::error::Result;
use crate::pipeline::processor::{field_to_value, ResultProcessor, RpResult, SearchResult};
use crate::storage::doc_store::DocumentStore;
use crate::value::lookup::{key_flags, Lookup, LookupKey};

/// Fills the row's lookup slots from external document storage. With an
/// explicit key list only those are loaded; otherwise every stored field
/// gets a key. Values already present (sorting vector mirrors, apply
/// results) are not overwritten.
pub struct LoaderProcessor {
    upstream: Box<dyn ResultProcessor>,
    store: Arc<dyn DocumentStore>,
    lookup: Arc<Mutex<Lookup>>,
    keys: Option<Vec<Arc<LookupKey>>>,
}

impl LoaderProcessor {
    pub fn new(
        upstream: Box<dyn ResultProcessor>,
        store: Arc<dyn DocumentStore>,
        lookup: Arc<Mutex<Lookup>>,
        keys: Option<Vec<Arc<LookupKey>>>,
    ) -> Self {
        LoaderProcessor {
            upstream,
            store,
            lookup,
            keys,
        }
    }
}

impl ResultProcessor for LoaderProcessor {
    fn name(&self) -> &'static str {
        "Loader"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        match self.upstream.next(res)? {
            RpResult::Eof => return Ok(RpResult::Eof),
            RpResult::Ok => {}
        }
        let Some(dmd) = res.dmd.clone() else {
            return Ok(RpResult::Ok);
        };
        if dmd.is_deleted() {
            return Ok(RpResult::Ok);
        }

        // The sorting vector already carries sortable fields; prefer it over
        // a storage fetch.
        if let Some(sv) = dmd.sort_vector() {
            let lookup = self.lookup.lock();
            for key in lookup.keys() {
                if let Some(ordinal) = key.sort_ordinal {
                    if res.row.get(key).is_none() {
                        if let Some(v) = sv.get(ordinal).filter(|v| !v.is_null()) {
                            res.row.set(key, v.clone());
                        }
                    }
                }
            }
        }

        let Some(fields) = self.store.load(&dmd.key) else {
            return Ok(RpResult::Ok);
        };
        match &self.keys {
            Some(keys) => {
                for key in keys {
                    if res.row.get(key).is_none() {
                        if let Some(v) = fields.get(&key.name) {
                            res.row.set(key, field_to_value(v));
                        }
                    }
                }
            }
            None => {
                let mut lookup = self.lookup.lock();
                for (name, v) in &fields {
                    let key = lookup.get_or_create(name, key_flags::DOC_SRC);
                    if res.row.get(&key).is_none() {
                        res.row.set(&key, field_to_value(v));
                    }
                }
            }
        }
        Ok(RpResult::Ok)
    }
}
