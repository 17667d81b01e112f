use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by the parameter store.
#[derive(Debug, Error, Diagnostic)]
pub enum ParameterError {
    #[error("parameter '{key}' is not a {requested}: stored value is {stored}")]
    #[diagnostic(code(pipewright::params::type_mismatch))]
    TypeMismatch {
        key: String,
        requested: &'static str,
        stored: String,
    },

    #[error("parameter value for '{key}' is not serializable: {message}")]
    #[diagnostic(code(pipewright::params::not_serializable))]
    NotSerializable { key: String, message: String },
}

/// Typed key/value parameters scoped to one execution.
///
/// Values are stored as JSON and deserialized on access, so callers get a
/// type error (naming key, requested and stored shapes) instead of a silent
/// `None` when shapes disagree.
#[derive(Default)]
pub struct ParameterStore {
    values: RwLock<FxHashMap<String, Value>>,
}

impl ParameterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<(), ParameterError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| ParameterError::NotSerializable {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.values.write().insert(key, value);
        Ok(())
    }

    /// Typed lookup; `Ok(None)` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ParameterError> {
        let Some(raw) = self.values.read().get(key).cloned() else {
            return Ok(None);
        };
        let stored = kind_of(&raw);
        serde_json::from_value(raw)
            .map(Some)
            .map_err(|_| ParameterError::TypeMismatch {
                key: key.to_string(),
                requested: std::any::type_name::<T>(),
                stored: stored.to_string(),
            })
    }

    /// Typed lookup with a fallback for absent or mismatched values.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).ok().flatten().unwrap_or(default)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    #[must_use]
    pub fn snapshot(&self) -> FxHashMap<String, Value> {
        self.values.read().clone()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Mutable environment variables scoped to one execution.
///
/// Mutations performed by steps are visible only within this store; nothing
/// leaks into the host process environment. Insertion order is irrelevant
/// to semantics.
#[derive(Default, Debug)]
pub struct EnvironmentStore {
    values: RwLock<FxHashMap<String, String>>,
}

impl EnvironmentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.values.read().get(name).cloned()
    }

    #[must_use]
    pub fn get_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(name.into(), value.into());
    }

    /// Remove an entry, returning the previous value if any.
    pub fn remove(&self, name: &str) -> Option<String> {
        self.values.write().remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.read().contains_key(name)
    }

    /// Apply a batch of entries (e.g. a pipeline's global environment).
    pub fn apply<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut values = self.values.write();
        for (k, v) in entries {
            values.insert(k.into(), v.into());
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> FxHashMap<String, String> {
        self.values.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_type_mismatch_names_both_shapes() {
        let params = ParameterStore::new();
        params.set("retries", 3).unwrap();
        let err = params.get::<Vec<String>>("retries").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("retries"));
        assert!(msg.contains("number"));
    }

    #[test]
    fn parameter_get_or_falls_back() {
        let params = ParameterStore::new();
        assert_eq!(params.get_or("missing", 7u32), 7);
        params.set("present", 9u32).unwrap();
        assert_eq!(params.get_or("present", 7u32), 9);
    }

    #[test]
    fn environment_snapshot_is_detached() {
        let env = EnvironmentStore::new();
        env.set("A", "1");
        let snapshot = env.snapshot();
        env.set("A", "2");
        assert_eq!(snapshot.get("A").map(String::as_str), Some("1"));
        assert_eq!(env.get("A").as_deref(), Some("2"));
    }
}
