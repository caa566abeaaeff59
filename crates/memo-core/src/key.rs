//! Call-key canonicalization
//!
//! Arguments are turned into a [`CallKey`], the canonical text of the whole
//! argument set. Any `Serialize` value works as the positional part; keyword
//! arguments are passed as a [`Kwargs`] value inside it, e.g.
//! `(5, kwargs! { "x" => 1 })`.
//!
//! Maps inside the arguments (`HashMap`s, structs) are always ordered by key
//! so equal values key identically. Keyword arguments are tagged in the
//! argument tree; whether their order matters is the `sort_kwargs` choice.

use crate::error::Result;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Canonical, hashable form of one call's arguments
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallKey(String);

impl CallKey {
    /// Wrap already-canonical key text
    pub fn from_raw(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag of the single-member object a [`Kwargs`] serializes to
pub const KWARGS_TAG: &str = "$kwargs";

/// Keyword arguments, serialized as `{"$kwargs": [[name, value], ...]}` in
/// insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct Kwargs<V = Value> {
    entries: Vec<(String, V)>,
}

impl<V> Kwargs<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace a keyword argument
    pub fn with(mut self, name: impl Into<String>, value: V) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for Kwargs<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize> Serialize for Kwargs<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(KWARGS_TAG, &self.entries)?;
        map.end()
    }
}

/// Build a [`Kwargs`] from `name => value` pairs.
///
/// ```
/// use memo_core::kwargs;
///
/// let kw = kwargs! { "x" => 1, "y" => 2 };
/// assert_eq!(kw.get("y"), Some(&2));
/// ```
#[macro_export]
macro_rules! kwargs {
    () => {
        $crate::key::Kwargs::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        $crate::key::Kwargs::new()$(.with($name, $value))+
    };
}

/// Encoder turning normalized arguments into key text
pub type KeyEncoder = Arc<dyn Fn(&Value) -> Result<String> + Send + Sync>;

/// How arguments are serialized into a key
#[derive(Clone, Default)]
pub enum KeyStrategy {
    /// Full-value JSON serialization
    #[default]
    Json,
    /// Caller-supplied encoding of the argument tree
    Custom(KeyEncoder),
}

impl KeyStrategy {
    pub fn custom<F>(encoder: F) -> Self
    where
        F: Fn(&Value) -> Result<String> + Send + Sync + 'static,
    {
        KeyStrategy::Custom(Arc::new(encoder))
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::Json => f.write_str("Json"),
            KeyStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Converts call arguments into [`CallKey`]s
#[derive(Debug, Clone)]
pub struct KeyCanonicalizer {
    strategy: KeyStrategy,
    sort_kwargs: bool,
}

impl Default for KeyCanonicalizer {
    fn default() -> Self {
        Self::new(KeyStrategy::Json, true)
    }
}

impl KeyCanonicalizer {
    /// With `sort_kwargs`, keyword arguments are ordered by name before
    /// encoding. Other maps are ordered either way.
    pub fn new(strategy: KeyStrategy, sort_kwargs: bool) -> Self {
        Self {
            strategy,
            sort_kwargs,
        }
    }

    pub fn sorts_kwargs(&self) -> bool {
        self.sort_kwargs
    }

    pub fn strategy(&self) -> &KeyStrategy {
        &self.strategy
    }

    pub fn canonicalize<A: Serialize + ?Sized>(&self, args: &A) -> Result<CallKey> {
        let tree = normalize(serde_json::to_value(args)?, self.sort_kwargs);
        match &self.strategy {
            KeyStrategy::Json => Ok(CallKey(serde_json::to_string(&tree)?)),
            KeyStrategy::Custom(encoder) => encoder(&tree).map(CallKey),
        }
    }
}

/// Recursively order object members by key. Keyword-argument pairs keep
/// their order unless `sort_kwargs` is set.
fn normalize(value: Value, sort_kwargs: bool) -> Value {
    match value {
        Value::Object(mut map) => {
            if map.len() == 1 && matches!(map.get(KWARGS_TAG), Some(Value::Array(_))) {
                if let Some(Value::Array(pairs)) = map.remove(KWARGS_TAG) {
                    return normalize_kwargs(pairs, sort_kwargs);
                }
            }
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (name, member) in entries {
                sorted.insert(name, normalize(member, sort_kwargs));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| normalize(item, sort_kwargs))
                .collect(),
        ),
        other => other,
    }
}

fn normalize_kwargs(pairs: Vec<Value>, sort_kwargs: bool) -> Value {
    let mut pairs: Vec<Value> = pairs
        .into_iter()
        .map(|pair| normalize(pair, sort_kwargs))
        .collect();
    if sort_kwargs {
        pairs.sort_by(|a, b| kwarg_name(a).cmp(&kwarg_name(b)));
    }
    let mut tagged = Map::new();
    tagged.insert(KWARGS_TAG.to_string(), Value::Array(pairs));
    Value::Object(tagged)
}

fn kwarg_name(pair: &Value) -> Option<&str> {
    pair.get(0).and_then(Value::as_str)
}

impl From<KeyStrategy> for KeyCanonicalizer {
    fn from(strategy: KeyStrategy) -> Self {
        Self::new(strategy, true)
    }
}
