use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::pipeline::processor::{resolve_value, SearchResult};
use crate::value::lookup::LookupKey;
use crate::value::Value;

/// Per-group accumulator. One is created for every group a reducer sees.
pub trait ReducerAcc: Send {
    fn add(&mut self, res: &SearchResult);
    fn finalize(&self) -> Value;
}

/// A reducer registered on a group step: knows how to spawn accumulators
/// reading its source property.
pub trait Reducer: Send + Sync {
    fn name(&self) -> &'static str;
    fn new_acc(&self) -> Box<dyn ReducerAcc>;
}

impl std::fmt::Debug for dyn Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reducer").field("name", &self.name()).finish()
    }
}

/// Build a reducer from its registry name. `COUNT` takes no property; all
/// others read one source key.
pub fn make_reducer(
    name: &str,
    src: Option<Arc<LookupKey>>,
) -> Result<Arc<dyn Reducer>> {
    let needs_src = || {
        src.clone().ok_or_else(|| {
            Error::new(
                ErrorKind::ParseArgs,
                format!("reducer {name} requires a property"),
            )
        })
    };
    let reducer: Arc<dyn Reducer> = match name.to_ascii_uppercase().as_str() {
        "COUNT" => Arc::new(CountReducer),
        "SUM" => Arc::new(SumReducer { src: needs_src()? }),
        "MIN" => Arc::new(MinReducer { src: needs_src()? }),
        "MAX" => Arc::new(MaxReducer { src: needs_src()? }),
        "AVG" => Arc::new(AvgReducer { src: needs_src()? }),
        "COUNT_DISTINCT" => Arc::new(CountDistinctReducer { src: needs_src()? }),
        "TOLIST" => Arc::new(ToListReducer { src: needs_src()? }),
        "FIRST_VALUE" => Arc::new(FirstValueReducer { src: needs_src()? }),
        _ => {
            return Err(Error::new(
                ErrorKind::NoOption,
                format!("unknown reducer {name}"),
            ));
        }
    };
    Ok(reducer)
}

pub struct CountReducer;

struct CountAcc(u64);

impl Reducer for CountReducer {
    fn name(&self) -> &'static str {
        "COUNT"
    }
    fn new_acc(&self) -> Box<dyn ReducerAcc> {
        Box::new(CountAcc(0))
    }
}

impl ReducerAcc for CountAcc {
    fn add(&mut self, _res: &SearchResult) {
        self.0 += 1;
    }
    fn finalize(&self) -> Value {
        Value::Number(self.0 as f64)
    }
}

pub struct SumReducer {
    src: Arc<LookupKey>,
}

struct SumAcc {
    src: Arc<LookupKey>,
    sum: f64,
}

impl Reducer for SumReducer {
    fn name(&self) -> &'static str {
        "SUM"
    }
    fn new_acc(&self) -> Box<dyn ReducerAcc> {
        Box::new(SumAcc {
            src: self.src.clone(),
            sum: 0.0,
        })
    }
}

impl ReducerAcc for SumAcc {
    fn add(&mut self, res: &SearchResult) {
        if let Some(n) = resolve_value(res, &self.src).and_then(|v| v.as_number()) {
            self.sum += n;
        }
    }
    fn finalize(&self) -> Value {
        Value::Number(self.sum)
    }
}

pub struct MinReducer {
    src: Arc<LookupKey>,
}

struct MinAcc {
    src: Arc<LookupKey>,
    min: Option<f64>,
}

impl Reducer for MinReducer {
    fn name(&self) -> &'static str {
        "MIN"
    }
    fn new_acc(&self) -> Box<dyn ReducerAcc> {
        Box::new(MinAcc {
            src: self.src.clone(),
            min: None,
        })
    }
}

impl ReducerAcc for MinAcc {
    fn add(&mut self, res: &SearchResult) {
        if let Some(n) = resolve_value(res, &self.src).and_then(|v| v.as_number()) {
            self.min = Some(self.min.map_or(n, |m| m.min(n)));
        }
    }
    fn finalize(&self) -> Value {
        self.min.map_or(Value::Null, Value::Number)
    }
}

pub struct MaxReducer {
    src: Arc<LookupKey>,
}

struct MaxAcc {
    src: Arc<LookupKey>,
    max: Option<f64>,
}

impl Reducer for MaxReducer {
    fn name(&self) -> &'static str {
        "MAX"
    }
    fn new_acc(&self) -> Box<dyn ReducerAcc> {
        Box::new(MaxAcc {
            src: self.src.clone(),
            max: None,
        })
    }
}

impl ReducerAcc for MaxAcc {
    fn add(&mut self, res: &SearchResult) {
        if let Some(n) = resolve_value(res, &self.src).and_then(|v| v.as_number()) {
            self.max = Some(self.max.map_or(n, |m| m.max(n)));
        }
    }
    fn finalize(&self) -> Value {
        self.max.map_or(Value::Null, Value::Number)
    }
}

pub struct AvgReducer {
    src: Arc<LookupKey>,
}

struct AvgAcc {
    src: Arc<LookupKey>,
    sum: f64,
    count: u64,
}

impl Reducer for AvgReducer {
    fn name(&self) -> &'static str {
        "AVG"
    }
    fn new_acc(&self) -> Box<dyn ReducerAcc> {
        Box::new(AvgAcc {
            src: self.src.clone(),
            sum: 0.0,
            count: 0,
        })
    }
}

impl ReducerAcc for AvgAcc {
    fn add(&mut self, res: &SearchResult) {
        if let Some(n) = resolve_value(res, &self.src).and_then(|v| v.as_number()) {
            self.sum += n;
            self.count += 1;
        }
    }
    fn finalize(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Number(self.sum / self.count as f64)
        }
    }
}

pub struct CountDistinctReducer {
    src: Arc<LookupKey>,
}

struct CountDistinctAcc {
    src: Arc<LookupKey>,
    seen: Vec<Value>,
}

impl Reducer for CountDistinctReducer {
    fn name(&self) -> &'static str {
        "COUNT_DISTINCT"
    }
    fn new_acc(&self) -> Box<dyn ReducerAcc> {
        Box::new(CountDistinctAcc {
            src: self.src.clone(),
            seen: Vec::new(),
        })
    }
}

impl ReducerAcc for CountDistinctAcc {
    fn add(&mut self, res: &SearchResult) {
        if let Some(v) = resolve_value(res, &self.src) {
            if !self.seen.contains(&v) {
                self.seen.push(v);
            }
        }
    }
    fn finalize(&self) -> Value {
        Value::Number(self.seen.len() as f64)
    }
}

pub struct ToListReducer {
    src: Arc<LookupKey>,
}

struct ToListAcc {
    src: Arc<LookupKey>,
    values: Vec<Value>,
}

impl Reducer for ToListReducer {
    fn name(&self) -> &'static str {
        "TOLIST"
    }
    fn new_acc(&self) -> Box<dyn ReducerAcc> {
        Box::new(ToListAcc {
            src: self.src.clone(),
            values: Vec::new(),
        })
    }
}

impl ReducerAcc for ToListAcc {
    fn add(&mut self, res: &SearchResult) {
        if let Some(v) = resolve_value(res, &self.src) {
            if !self.values.contains(&v) {
                self.values.push(v);
            }
        }
    }
    fn finalize(&self) -> Value {
        Value::Array(self.values.clone())
    }
}

pub struct FirstValueReducer {
    src: Arc<LookupKey>,
}

struct FirstValueAcc {
    src: Arc<LookupKey>,
    value: Option<Value>,
}

impl Reducer for FirstValueReducer {
    fn name(&self) -> &'static str {
        "FIRST_VALUE"
    }
    fn new_acc(&self) -> Box<dyn ReducerAcc> {
        Box::new(FirstValueAcc {
            src: self.src.clone(),
            value: None,
        })
    }
}

impl ReducerAcc for FirstValueAcc {
    fn add(&mut self, res: &SearchResult) {
        if self.value.is_none() {
            self.value = resolve_value(res, &self.src);
        }
    }
    fn finalize(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::lookup::Lookup;

    fn feed(acc: &mut Box<dyn ReducerAcc>, key: &Arc<LookupKey>, values: &[Value]) {
        for v in values {
            let mut res = SearchResult::new();
            res.row.set(key, v.clone());
            acc.add(&res);
        }
    }

    #[test]
    fn test_basic_reducers() {
        let mut lk = Lookup::new();
        let key = lk.get_or_create("n", 0);
        let values = [Value::Number(3.0), Value::Number(1.0), Value::Number(2.0)];

        let cases: Vec<(&str, Value)> = vec![
            ("COUNT", Value::Number(3.0)),
            ("SUM", Value::Number(6.0)),
            ("MIN", Value::Number(1.0)),
            ("MAX", Value::Number(3.0)),
            ("AVG", Value::Number(2.0)),
            ("FIRST_VALUE", Value::Number(3.0)),
        ];
        for (name, expected) in cases {
            let reducer = make_reducer(name, Some(key.clone())).unwrap();
            let mut acc = reducer.new_acc();
            feed(&mut acc, &key, &values);
            assert_eq!(acc.finalize(), expected, "{name}");
        }
    }

    #[test]
    fn test_count_distinct_and_tolist() {
        let mut lk = Lookup::new();
        let key = lk.get_or_create("s", 0);
        let values = [
            Value::String("a".into()),
            Value::String("b".into()),
            Value::String("a".into()),
        ];
        let reducer = make_reducer("COUNT_DISTINCT", Some(key.clone())).unwrap();
        let mut acc = reducer.new_acc();
        feed(&mut acc, &key, &values);
        assert_eq!(acc.finalize(), Value::Number(2.0));

        let reducer = make_reducer("TOLIST", Some(key.clone())).unwrap();
        let mut acc = reducer.new_acc();
        feed(&mut acc, &key, &values);
        assert_eq!(
            acc.finalize(),
            Value::Array(vec![Value::String("a".into()), Value::String("b".into())])
        );
    }

    #[test]
    fn test_unknown_reducer_and_missing_property() {
        assert_eq!(
            make_reducer("BOGUS", None).unwrap_err().kind,
            ErrorKind::NoOption
        );
        assert_eq!(
            make_reducer("SUM", None).unwrap_err().kind,
            ErrorKind::ParseArgs
        );
    }
}
