use crate::value::value::Value;

/// The algebraic reply type results are serialized into for the embedding
/// host. Mirrors the host wire protocol's value space.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    String(String),
    Integer(i64),
    Double(f64),
    Null,
    Status(String),
    Error(String),
    Array(Vec<Reply>),
    Map(Vec<(Reply, Reply)>),
    Set(Vec<Reply>),
    Bool(bool),
    BigNum(String),
    Verbatim(String),
    Push(Vec<Reply>),
    Attribute(Vec<(Reply, Reply)>),
}

impl Reply {
    /// Typed conversion, used when the request sets the Typed output flag.
    pub fn from_value(v: &Value) -> Reply {
        match v {
            Value::Null => Reply::Null,
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Reply::Integer(*n as i64)
                } else {
                    Reply::Double(*n)
                }
            }
            Value::String(s) => Reply::String(s.clone()),
            Value::Array(a) => Reply::Array(a.iter().map(Reply::from_value).collect()),
            Value::Map(m) => Reply::Map(
                m.iter()
                    .map(|(k, v)| (Reply::String(k.clone()), Reply::from_value(v)))
                    .collect(),
            ),
        }
    }

    /// Stringified conversion, the default output mode.
    pub fn from_value_stringified(v: &Value) -> Reply {
        match v {
            Value::Null => Reply::Null,
            other => Reply::String(other.to_string()),
        }
    }
}
