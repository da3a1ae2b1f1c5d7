use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A single context entry: plain JSON, or an opaque shared handle such as an
/// environment reference that tools downcast on use.
#[derive(Clone)]
pub enum ContextValue {
    Json(Value),
    Handle(Arc<dyn Any + Send + Sync>),
}

impl ContextValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Handle(_) => None,
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Handle(_) => write!(f, "<handle>"),
        }
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Handle(a), Self::Handle(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for ContextValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Json(Value::String(value.to_string()))
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Json(Value::String(value))
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Json(Value::Bool(value))
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Json(Value::from(value))
    }
}

/// Key-value state shared by every agent and tool of one run.
///
/// The same type doubles as a patch: tools return a `ContextVariables` holding
/// only the keys they want to write, and the orchestrator merges it key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextVariables {
    values: BTreeMap<String, ContextValue>,
}

impl ContextVariables {
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Parses `key=value` bindings; entries without `=` are skipped.
    pub fn from_bindings<I, S>(bindings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut context = Self::new();
        for binding in bindings {
            if let Some((key, value)) = binding.as_ref().split_once('=') {
                context.insert(key.trim(), value);
            }
        }
        context
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn insert_handle<T: Any + Send + Sync>(&mut self, key: impl Into<String>, handle: T) {
        self.values
            .insert(key.into(), ContextValue::Handle(Arc::new(handle)));
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn get_json(&self, key: &str) -> Option<&Value> {
        self.values.get(key).and_then(ContextValue::as_json)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get_json(key).and_then(Value::as_str)
    }

    pub fn handle<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        match self.values.get(key)? {
            ContextValue::Handle(handle) => Arc::clone(handle).downcast::<T>().ok(),
            ContextValue::Json(_) => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Key-wise merge; keys in `patch` overwrite, all other keys are kept.
    pub fn merge(&mut self, patch: ContextVariables) {
        self.values.extend(patch.values);
    }

    /// JSON view of the plain entries. Handles are not serializable and are left out.
    pub fn to_json(&self) -> Value {
        let map = self
            .values
            .iter()
            .filter_map(|(key, value)| value.as_json().map(|v| (key.clone(), v.clone())))
            .collect();
        Value::Object(map)
    }
}

impl Serialize for ContextVariables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let plain: Vec<_> = self
            .values
            .iter()
            .filter_map(|(key, value)| value.as_json().map(|v| (key, v)))
            .collect();
        let mut map = serializer.serialize_map(Some(plain.len()))?;
        for (key, value) in plain {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
