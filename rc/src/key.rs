//! Content-addressed cache keys
//!
//! A key is the SHA-256 of a canonical JSON rendering of whatever describes
//! the request. Object keys are sorted recursively before hashing, so two
//! descriptors that are equal by value always produce the same key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// 64-character lowercase hex SHA-256 key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    fn from_value(value: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(value, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the key for any serializable descriptor
///
/// Fails only when the descriptor cannot be represented as JSON
/// (for example a map with non-string keys).
pub fn compute_key<D: Serialize + ?Sized>(descriptor: &D) -> Result<CacheKey, CacheError> {
    let value = serde_json::to_value(descriptor)?;
    Ok(CacheKey::from_value(&value))
}

/// The attributes that define a cacheable upstream request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDescriptor {
    pub method: String,
    pub path: String,
    /// Values per name, in the order they were added
    pub query: BTreeMap<String, Vec<String>>,
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// Create a descriptor with no query and no body
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_uppercase(),
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    /// Add a query parameter
    ///
    /// Repeating a name appends another value; `?tag=a&tag=b` keeps both.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Attach a JSON body
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Compute this descriptor's cache key
    pub fn cache_key(&self) -> CacheKey {
        let query: Map<String, Value> = self
            .query
            .iter()
            .map(|(k, values)| (k.clone(), Value::Array(values.iter().cloned().map(Value::String).collect())))
            .collect();

        let mut fields = Map::new();
        fields.insert("method".to_string(), Value::String(self.method.clone()));
        fields.insert("path".to_string(), Value::String(self.path.clone()));
        fields.insert("query".to_string(), Value::Object(query));
        fields.insert("body".to_string(), self.body.clone().unwrap_or(Value::Null));

        CacheKey::from_value(&Value::Object(fields))
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on a string Value yields the escaped, quoted form
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
