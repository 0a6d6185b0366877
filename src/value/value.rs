use std::cmp::Ordering;
use std::fmt;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};

/// A dynamically typed value flowing through lookup rows, reducers and
/// expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Ordering used by the sorter and by MIN/MAX reducers. Values of
    /// mismatched types cannot be ordered; the caller falls back to docId
    /// order and reports BadVal out-of-band.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Null, _) => Ok(Ordering::Less),
            (_, Value::Null) => Ok(Ordering::Greater),
            (Value::Number(a), Value::Number(b)) => {
                Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal))
            }
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (a, b) => Err(Error::new(
                ErrorKind::BadVal,
                format!("cannot compare {a} with {b}"),
            )),
        }
    }

    /// 64-bit hash used for group keys.
    pub fn hash_into(&self, state: &mut u64) {
        fn mix(state: &mut u64, bytes: &[u8]) {
            // FNV-1a
            for &b in bytes {
                *state ^= b as u64;
                *state = state.wrapping_mul(0x100000001b3);
            }
        }
        match self {
            Value::Null => mix(state, b"\0nil"),
            Value::Number(n) => mix(state, &n.to_bits().to_le_bytes()),
            Value::String(s) => mix(state, s.as_bytes()),
            Value::Array(a) => {
                for v in a {
                    v.hash_into(state);
                }
            }
            Value::Map(m) => {
                for (k, v) in m {
                    mix(state, k.as_bytes());
                    v.hash_into(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => write!(f, "{s}"),
            Value::Array(a) => {
                let parts: Vec<String> = a.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
            Value::Map(m) => {
                let parts: Vec<String> = m.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", parts.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare() {
        assert_eq!(
            Value::Number(1.0).compare(&Value::Number(2.0)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Null.compare(&Value::String("x".into())).unwrap(),
            Ordering::Less
        );
        assert!(Value::Number(1.0).compare(&Value::String("x".into())).is_err());
    }

    #[test]
    fn test_hash_distinguishes() {
        let mut h1 = 0xcbf29ce484222325u64;
        let mut h2 = 0xcbf29ce484222325u64;
        Value::String("red".into()).hash_into(&mut h1);
        Value::String("blue".into()).hash_into(&mut h2);
        assert_ne!(h1, h2);
    }
}
