use std::collections::HashMap;
use std::sync::Arc;
use crate::core::error::Result;
use crate::pipeline::processor::{
    resolve_value, ResultProcessor, RpResult, SearchResult,
};
use crate::pipeline::reducer::{Reducer, ReducerAcc};
use crate::value::lookup::LookupKey;
use crate::value::Value;

const FNV_SEED: u64 = 0xcbf29ce484222325;

/// One group: the key values that define it plus one accumulator per
/// registered reducer.
struct Group {
    key_values: Vec<Value>,
    accs: Vec<Box<dyn ReducerAcc>>,
}

/// Groups upstream rows by a vector of source keys, feeding every reducer,
/// then yields one row per group in first-seen order. Array-valued keys are
/// expanded over their cartesian product.
pub struct GrouperProcessor {
    upstream: Box<dyn ResultProcessor>,
    src_keys: Vec<Arc<LookupKey>>,
    dst_keys: Vec<Arc<LookupKey>>,
    reducers: Vec<(Arc<dyn Reducer>, Arc<LookupKey>)>,
    groups: HashMap<u64, Group>,
    order: Vec<u64>,
    yield_pos: Option<usize>,
}

impl GrouperProcessor {
    pub fn new(
        upstream: Box<dyn ResultProcessor>,
        src_keys: Vec<Arc<LookupKey>>,
        dst_keys: Vec<Arc<LookupKey>>,
        reducers: Vec<(Arc<dyn Reducer>, Arc<LookupKey>)>,
    ) -> Self {
        GrouperProcessor {
            upstream,
            src_keys,
            dst_keys,
            reducers,
            groups: HashMap::new(),
            order: Vec::new(),
            yield_pos: None,
        }
    }

    fn upsert(&mut self, combo: Vec<Value>, res: &SearchResult) {
        let mut hash = FNV_SEED;
        for v in &combo {
            v.hash_into(&mut hash);
        }
        let order = &mut self.order;
        let reducers = &self.reducers;
        let group = self.groups.entry(hash).or_insert_with(|| {
            order.push(hash);
            Group {
                key_values: combo,
                accs: reducers.iter().map(|(r, _)| r.new_acc()).collect(),
            }
        });
        for acc in &mut group.accs {
            acc.add(res);
        }
    }

    /// Expand array-valued keys combinatorially and upsert each combination.
    fn feed(&mut self, res: &SearchResult) {
        let candidates: Vec<Vec<Value>> = self
            .src_keys
            .iter()
            .map(|k| match resolve_value(res, k) {
                Some(Value::Array(items)) if !items.is_empty() => items,
                Some(v) => vec![v],
                None => vec![Value::Null],
            })
            .collect();

        let mut combos: Vec<Vec<Value>> = vec![Vec::with_capacity(candidates.len())];
        for options in &candidates {
            let mut next = Vec::with_capacity(combos.len() * options.len());
            for combo in &combos {
                for option in options {
                    let mut c = combo.clone();
                    c.push(option.clone());
                    next.push(c);
                }
            }
            combos = next;
        }
        for combo in combos {
            self.upsert(combo, res);
        }
    }
}

impl ResultProcessor for GrouperProcessor {
    fn name(&self) -> &'static str {
        "Grouper"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        if self.yield_pos.is_none() {
            loop {
                res.clear();
                match self.upstream.next(res)? {
                    RpResult::Eof => break,
                    RpResult::Ok => self.feed(res),
                }
            }
            self.yield_pos = Some(0);
        }

        let pos = self.yield_pos.unwrap();
        let Some(hash) = self.order.get(pos) else {
            return Ok(RpResult::Eof);
        };
        self.yield_pos = Some(pos + 1);
        let group = &self.groups[hash];

        res.clear();
        for (key, value) in self.dst_keys.iter().zip(group.key_values.iter()) {
            res.row.set(key, value.clone());
        }
        for ((_, dst), acc) in self.reducers.iter().zip(group.accs.iter()) {
            res.row.set(dst, acc.finalize());
        }
        Ok(RpResult::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;
    use crate::pipeline::reducer::make_reducer;
    use crate::value::lookup::Lookup;

    struct Feed {
        rows: Vec<Vec<(Arc<LookupKey>, Value)>>,
        pos: usize,
    }

    impl ResultProcessor for Feed {
        fn name(&self) -> &'static str {
            "Feed"
        }
        fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
            let Some(row) = self.rows.get(self.pos) else {
                return Ok(RpResult::Eof);
            };
            self.pos += 1;
            res.clear();
            res.doc_id = DocId(self.pos as u64);
            for (k, v) in row {
                res.row.set(k, v.clone());
            }
            Ok(RpResult::Ok)
        }
    }

    #[test]
    fn test_group_count_by_color() {
        let mut lk = Lookup::new();
        let color = lk.get_or_create("color", 0);
        let dst_color = lk.get_or_create("out_color", 0);
        let n = lk.get_or_create("n", 0);

        let mut rows = Vec::new();
        for _ in 0..5 {
            rows.push(vec![(color.clone(), Value::String("red".into()))]);
        }
        for _ in 0..3 {
            rows.push(vec![(color.clone(), Value::String("blue".into()))]);
        }

        let reducer = make_reducer("COUNT", None).unwrap();
        let mut grouper = GrouperProcessor::new(
            Box::new(Feed { rows, pos: 0 }),
            vec![color],
            vec![dst_color.clone()],
            vec![(reducer, n.clone())],
        );

        let mut res = SearchResult::new();
        let mut out = Vec::new();
        while let Ok(RpResult::Ok) = grouper.next(&mut res) {
            out.push((
                res.row.get(&dst_color).cloned().unwrap(),
                res.row.get(&n).cloned().unwrap(),
            ));
        }
        // First-seen order of keys.
        assert_eq!(
            out,
            vec![
                (Value::String("red".into()), Value::Number(5.0)),
                (Value::String("blue".into()), Value::Number(3.0)),
            ]
        );
    }

    #[test]
    fn test_array_values_expand_cartesian() {
        let mut lk = Lookup::new();
        let tags = lk.get_or_create("tags", 0);
        let dst = lk.get_or_create("out_tags", 0);
        let n = lk.get_or_create("n", 0);

        let rows = vec![
            vec![(
                tags.clone(),
                Value::Array(vec![Value::String("a".into()), Value::String("b".into())]),
            )],
            vec![(tags.clone(), Value::String("a".into()))],
        ];
        let reducer = make_reducer("COUNT", None).unwrap();
        let mut grouper = GrouperProcessor::new(
            Box::new(Feed { rows, pos: 0 }),
            vec![tags],
            vec![dst.clone()],
            vec![(reducer, n.clone())],
        );

        let mut res = SearchResult::new();
        let mut out = Vec::new();
        while let Ok(RpResult::Ok) = grouper.next(&mut res) {
            out.push((
                res.row.get(&dst).cloned().unwrap(),
                res.row.get(&n).cloned().unwrap(),
            ));
        }
        assert_eq!(
            out,
            vec![
                (Value::String("a".into()), Value::Number(2.0)),
                (Value::String("b".into()), Value::Number(1.0)),
            ]
        );
    }
}
