//! Cache Key Derivation
//!
//! A read's cache key is the operation name followed by a canonical JSON
//! encoding of its arguments. Object keys are sorted recursively, so two
//! argument values that are equal field-for-field always share a key
//! regardless of field or map insertion order.
//!
//! Scalar arguments are joined to the name with `:`. Without it a name ending
//! in a digit runs into a numeric argument (`op1` + `2` against `op` + `12`).

use makerspace_error::{key_error, TransactionResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Deterministic identifier of an (operation, arguments) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Use a caller-supplied key verbatim. The caller is responsible for
    /// making it canonical.
    pub fn explicit(key: impl Into<String>) -> Self {
        Self(key.into())
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

/// Recursively sort object keys
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Compact canonical JSON encoding of `args`
pub fn stable_serialize<A: Serialize + ?Sized>(args: &A) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(args)?;
    serde_json::to_string(&canonicalize(value))
}

/// Derive the cache key for calling `operation` with `args`
pub fn derive_key<A: Serialize + ?Sized>(operation: &str, args: &A) -> TransactionResult<CacheKey> {
    let encoded = stable_serialize(args).map_err(|e| key_error(operation, e.to_string()))?;
    if matches!(encoded.as_bytes().first(), Some(b'{' | b'[')) {
        Ok(CacheKey(format!("{operation}{encoded}")))
    } else {
        Ok(CacheKey(format!("{operation}:{encoded}")))
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
