//! Cache seeds and deterministic cache keys.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Seed used when none is configured.
pub const DEFAULT_CACHE_SEED: u64 = 41;

/// Scopes every cache key. Changing the seed is the only way entries are
/// invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSeed {
    /// Caching is off: lookups always miss and stores are dropped.
    Disabled,
    /// Keys are derived with this seed.
    Seed(u64),
}

impl CacheSeed {
    /// The numeric seed, or `None` when disabled.
    pub fn value(&self) -> Option<u64> {
        match self {
            CacheSeed::Disabled => None,
            CacheSeed::Seed(seed) => Some(*seed),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, CacheSeed::Disabled)
    }
}

impl Default for CacheSeed {
    fn default() -> Self {
        CacheSeed::Seed(DEFAULT_CACHE_SEED)
    }
}

impl From<u64> for CacheSeed {
    fn from(seed: u64) -> Self {
        CacheSeed::Seed(seed)
    }
}

impl From<Option<u64>> for CacheSeed {
    fn from(seed: Option<u64>) -> Self {
        seed.map_or(CacheSeed::Disabled, CacheSeed::Seed)
    }
}

impl FromStr for CacheSeed {
    type Err = Error;

    /// Parses a decimal seed; `none`, `disabled` and `off` disable caching.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "none" | "disabled" | "off" => Ok(CacheSeed::Disabled),
            _ => s
                .parse::<u64>()
                .map(CacheSeed::Seed)
                .map_err(|_| Error::InvalidConfig(format!("invalid cache seed `{}`", s))),
        }
    }
}

impl fmt::Display for CacheSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSeed::Disabled => f.write_str("disabled"),
            CacheSeed::Seed(seed) => write!(f, "{}", seed),
        }
    }
}

/// Identifies one cached response.
///
/// A key is the lowercase hex SHA-256 of `"<seed>:<canonical request>"`, where
/// the canonical request is [`canonical_json`] of the request payload. Keys
/// only ever contain `[0-9a-f]`, so backends may use them as file names or
/// URL path segments as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `request` under `seed`.
    pub fn derive(seed: u64, request: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(canonical_json(request).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
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

/// Serialize `value` with object keys sorted at every level and no
/// insignificant whitespace. Array order is kept.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": [3, {"y": null, "x": "q"}], "c": true}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":true,"z":[3,{"x":"q","y":null}]},"b":1}"#
        );
    }

    #[test]
    fn test_key_ignores_field_order() {
        let a: Value = serde_json::from_str(r#"{"model": "gpt-4", "temperature": 0}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{ "temperature":0,   "model":"gpt-4" }"#).unwrap();
        assert_eq!(CacheKey::derive(41, &a), CacheKey::derive(41, &b));
    }

    #[test]
    fn test_key_depends_on_seed_and_array_order() {
        let request = json!({"messages": ["hi", "there"]});
        assert_ne!(CacheKey::derive(41, &request), CacheKey::derive(42, &request));
        assert_ne!(
            CacheKey::derive(41, &request),
            CacheKey::derive(41, &json!({"messages": ["there", "hi"]}))
        );
    }

    #[test]
    fn test_key_is_hex() {
        let key = CacheKey::derive(7, &json!({}));
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_seed_parsing() {
        assert_eq!("42".parse::<CacheSeed>().unwrap(), CacheSeed::Seed(42));
        assert_eq!("None".parse::<CacheSeed>().unwrap(), CacheSeed::Disabled);
        assert!("forty".parse::<CacheSeed>().is_err());
        assert_eq!(CacheSeed::default().value(), Some(DEFAULT_CACHE_SEED));
        assert_eq!(CacheSeed::from(None), CacheSeed::Disabled);
    }
}
