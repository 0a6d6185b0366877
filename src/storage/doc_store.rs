use parking_lot::RwLock;
use std::collections::HashMap;
use crate::core::types::FieldValue;

/// The host table holding raw document fields. The engine only needs get,
/// put and delete by external key; loading result fields goes through this.
pub trait DocumentStore: Send + Sync {
    fn save(&self, key: &str, fields: &[(String, FieldValue)]);
    fn load(&self, key: &str) -> Option<HashMap<String, FieldValue>>;
    fn delete(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<String, HashMap<String, FieldValue>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        MemoryDocumentStore::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn save(&self, key: &str, fields: &[(String, FieldValue)]) {
        let map = fields.iter().cloned().collect();
        self.docs.write().insert(key.to_string(), map);
    }

    fn load(&self, key: &str) -> Option<HashMap<String, FieldValue>> {
        self.docs.read().get(key).cloned()
    }

    fn delete(&self, key: &str) {
        self.docs.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_delete() {
        let store = MemoryDocumentStore::new();
        store.save("d1", &[("title".to_string(), FieldValue::Text("hi".into()))]);
        let loaded = store.load("d1").unwrap();
        assert_eq!(loaded.get("title"), Some(&FieldValue::Text("hi".into())));
        store.delete("d1");
        assert!(store.load("d1").is_none());
    }
}
