//! Replicated data model.
//!
//! A [`ChangeKey`] names an entry that changed upstream. Its current value is
//! read as a [`SourceRecord`] (a flat field map), stored as JSON under the key
//! itself, next to an index entry holding the record's version token.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::EXPIRE_FIELD;
use crate::constants::INDEX_KEY_PREFIX;
use crate::constants::VERSION_FIELD;
use crate::Result;

/// Identifier of a mutated upstream entry
pub type ChangeKey = String;

/// `(key, value)` pairs applied as one atomic local write
pub type WriteBatch = Vec<(Vec<u8>, Vec<u8>)>;

/// Full value of a hash-shaped upstream entry
///
/// Fields are kept ordered so that an unchanged source state always
/// serializes to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRecord {
    fields: BTreeMap<String, String>,
}

impl SourceRecord {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    pub fn get(
        &self,
        field: &str,
    ) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Version token, empty when the record carries none
    pub fn version(&self) -> &str {
        self.get(VERSION_FIELD).unwrap_or("")
    }

    /// Seconds until upstream expiry, only when `expire` is a positive integer
    pub fn expire_seconds(&self) -> Option<u64> {
        let seconds: i64 = self.get(EXPIRE_FIELD)?.trim().parse().ok()?;
        if seconds > 0 {
            Some(seconds as u64)
        } else {
            None
        }
    }

    /// PersistedRecord bytes (JSON object)
    pub fn to_persisted(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_persisted(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Index entry and record for `key`, in the order they are written
    pub fn write_batch(
        &self,
        key: &str,
    ) -> Result<WriteBatch> {
        let chunk = self.to_persisted()?;
        Ok(vec![
            (index_key(key).into_bytes(), self.version().as_bytes().to_vec()),
            (key.as_bytes().to_vec(), chunk),
        ])
    }
}

impl<K, V> FromIterator<(K, V)> for SourceRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// IndexEntry key derived from a ChangeKey
pub fn index_key(key: &str) -> String {
    format!("{INDEX_KEY_PREFIX}{key}")
}
