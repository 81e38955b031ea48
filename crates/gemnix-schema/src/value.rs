//! The closed set of value kinds shared by loaded and freshly resolved gemsets.

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("unrepresentable {kind} at '{path}'")]
    Unrepresentable { kind: &'static str, path: String },
}

/// Insertion-ordered mapping; emit order equals build order.
pub type Mapping = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Mapping(Mapping),
    Sequence(Vec<Value>),
    Text(String),
    Symbol(String),
    Bool(bool),
}

impl Value {
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Text and symbols both read as strings.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping()?.get(key)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Mapping(_) => "mapping",
            Value::Sequence(_) => "sequence",
            Value::Text(_) => "text",
            Value::Symbol(_) => "symbol",
            Value::Bool(_) => "boolean",
        }
    }

    /// Decode a JSON tree, rejecting `null` and numbers.
    pub fn from_json(json: serde_json::Value) -> Result<Self, ValueError> {
        convert_json(json, &mut String::from("$"))
    }
}

fn convert_json(json: serde_json::Value, path: &mut String) -> Result<Value, ValueError> {
    match json {
        serde_json::Value::Object(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, value) in map {
                let len = path.len();
                path.push('.');
                path.push_str(&key);
                let converted = convert_json(value, path)?;
                path.truncate(len);
                out.insert(key, converted);
            }
            Ok(Value::Mapping(out))
        }
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{i}]"));
                out.push(convert_json(item, path)?);
                path.truncate(len);
            }
            Ok(Value::Sequence(out))
        }
        serde_json::Value::String(s) => Ok(Value::Text(s)),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(_) => Err(ValueError::Unrepresentable {
            kind: "number",
            path: path.clone(),
        }),
        serde_json::Value::Null => Err(ValueError::Unrepresentable {
            kind: "null",
            path: path.clone(),
        }),
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = ValueError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        Value::from_json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Mapping> for Value {
    fn from(m: Mapping) -> Self {
        Value::Mapping(m)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::Sequence(items.into_iter().map(Value::Text).collect())
    }
}
