//! Ordered, string-keyed store of resolved values.
//!
//! The cache is what travels from the server render to the client render. It
//! serializes as a JSON array of `[key, value]` pairs in insertion order:
//!
//! ```text
//! [[":r0:",{"name":"ada"}],[":r1:",42]]
//! ```

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Result, ServerPromiseError};

#[derive(Debug, Default)]
pub struct Cache {
    entries: RwLock<Map<String, Value>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from `(key, value)` pairs. A repeated key keeps the
    /// position of its first occurrence and the value of its last.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut map = Map::new();
        for (key, value) in entries {
            map.insert(key.into(), value);
        }
        Self { entries: RwLock::new(map) }
    }

    /// Inverse of [`Cache::stringify`].
    pub fn parse(snapshot: &str) -> Result<Self> {
        let entries: Vec<(String, Value)> =
            serde_json::from_str(snapshot).map_err(|e| ServerPromiseError::parse(e.to_string()))?;
        Ok(Self::from_entries(entries))
    }

    pub fn stringify(&self) -> String {
        let entries = self.entries.read();
        let pairs = entries
            .iter()
            .map(|(key, value)| Value::Array(vec![Value::String(key.clone()), value.clone()]))
            .collect();
        Value::Array(pairs).to_string()
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    /// Typed read. `Ok(None)` for a missing key; an error only when the stored
    /// value does not have the shape of `T`. JSON has no NaN or infinity, so a
    /// non-finite float stored through [`Cache::set_serialized`] reads back as
    /// `null`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| ServerPromiseError::deserialization(key, e.to_string()))
            })
            .transpose()
    }

    /// Insert or overwrite. Overwriting keeps the key's original position.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(key.into(), value);
    }

    pub fn set_serialized<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl Clone for Cache {
    fn clone(&self) -> Self {
        Self { entries: RwLock::new(self.entries.read().clone()) }
    }
}

// Order-sensitive: two caches are equal only if their entries line up.
impl PartialEq for Cache {
    fn eq(&self, other: &Self) -> bool {
        self.entries() == other.entries()
    }
}

impl From<Map<String, Value>> for Cache {
    fn from(map: Map<String, Value>) -> Self {
        Self { entries: RwLock::new(map) }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Cache {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl Serialize for Cache {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let entries = self.entries.read();
        let mut seq = serializer.serialize_seq(Some(entries.len()))?;
        for entry in entries.iter() {
            seq.serialize_element(&entry)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Cache {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Vec::<(String, Value)>::deserialize(deserializer).map(Self::from_entries)
    }
}
