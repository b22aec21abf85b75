//! Runtime values produced and consumed by the sandbox DSL.

use std::fmt;

/// A DSL runtime value. Maps are insertion-ordered `Vec<(String, Value)>` rather than
/// `HashMap`, matching the host's own preference for small-cardinality ordered data
/// (see `response.rs`'s header vector) and allowing duplicate keys (e.g. repeated
/// query-string parameters) to coexist.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Truthiness used by conditional-free evaluation contexts (e.g. `&&`/`||` short
    /// circuiting): `Nil`, `false`, `0`, and `""` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Renders the value the way `puts`/string concatenation expect: strings pass through
    /// unquoted, everything else uses its display form.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Looks up `key` in a `Map` value, returning the first matching entry.
    pub fn get_field(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Indexes a `List` by integer or a `Map` by string key.
    pub fn get_index(&self, index: &Value) -> Option<&Value> {
        match (self, index) {
            (Value::List(items), Value::Int(n)) => {
                usize::try_from(*n).ok().and_then(|i| items.get(i))
            }
            (Value::Map(_), Value::Str(key)) => self.get_field(key),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, ""),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
                write!(f, "{}", parts.join(""))
            }
            Value::Map(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v.to_display_string()))
                    .collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_rules() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(Value::Str("x".to_string()).is_truthy());
    }

    #[test]
    fn map_field_lookup() {
        let m = Value::Map(vec![("name".to_string(), Value::Str("alice".to_string()))]);
        assert_eq!(m.get_field("name"), Some(&Value::Str("alice".to_string())));
        assert_eq!(m.get_field("missing"), None);
    }

    #[test]
    fn list_index_lookup() {
        let l = Value::List(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(l.get_index(&Value::Int(1)), Some(&Value::Int(20)));
    }
}
