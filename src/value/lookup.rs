use std::collections::HashMap;
use std::sync::Arc;
use crate::value::value::Value;

pub mod key_flags {
    /// Key is internal and excluded from "all fields" output.
    pub const HIDDEN: u32 = 1 << 0;
    /// A later registration may overwrite this key's values.
    pub const OVERRIDE: u32 = 1 << 1;
    /// Key mirrors a slot of the document sorting vector.
    pub const SORT_KEY: u32 = 1 << 2;
    /// Key is loaded from document storage.
    pub const DOC_SRC: u32 = 1 << 3;
}

#[derive(Debug, Clone)]
pub struct LookupKey {
    pub name: String,
    pub ordinal: usize,
    pub flags: u32,
    /// Sorting-vector slot when flags contain SORT_KEY.
    pub sort_ordinal: Option<usize>,
}

/// An ordered registry of named keys. The ordinal of a key indexes rows
/// flowing between result processors.
#[derive(Debug, Default)]
pub struct Lookup {
    keys: Vec<Arc<LookupKey>>,
    by_name: HashMap<String, usize>,
}

impl Lookup {
    pub fn new() -> Self {
        Lookup::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<LookupKey>> {
        self.by_name.get(name).map(|&i| self.keys[i].clone())
    }

    pub fn get_or_create(&mut self, name: &str, flags: u32) -> Arc<LookupKey> {
        if let Some(&i) = self.by_name.get(name) {
            return self.keys[i].clone();
        }
        self.create(name, flags, None)
    }

    pub fn create(&mut self, name: &str, flags: u32, sort_ordinal: Option<usize>) -> Arc<LookupKey> {
        let ordinal = self.keys.len();
        let key = Arc::new(LookupKey {
            name: name.to_string(),
            ordinal,
            flags,
            sort_ordinal,
        });
        self.by_name.insert(name.to_string(), ordinal);
        self.keys.push(key.clone());
        key
    }

    pub fn keys(&self) -> impl Iterator<Item = &Arc<LookupKey>> {
        self.keys.iter()
    }

    pub fn visible_keys(&self) -> impl Iterator<Item = &Arc<LookupKey>> {
        self.keys
            .iter()
            .filter(|k| k.flags & key_flags::HIDDEN == 0)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A sparse array of values indexed by lookup-key ordinal. The unit of value
/// flow between result processors.
#[derive(Debug, Clone, Default)]
pub struct LookupRow {
    values: Vec<Option<Value>>,
}

impl LookupRow {
    pub fn new() -> Self {
        LookupRow::default()
    }

    pub fn get(&self, key: &LookupKey) -> Option<&Value> {
        self.values.get(key.ordinal).and_then(|v| v.as_ref())
    }

    pub fn set(&mut self, key: &LookupKey, value: Value) {
        if self.values.len() <= key.ordinal {
            self.values.resize(key.ordinal + 1, None);
        }
        self.values[key.ordinal] = Some(value);
    }

    /// Clear values but keep the allocation, for row recycling.
    pub fn wipe(&mut self) {
        for v in &mut self.values {
            *v = None;
        }
    }

    pub fn take(&mut self) -> LookupRow {
        LookupRow {
            values: std::mem::take(&mut self.values),
        }
    }
}
