//! Schemaless record model and the set of synced collections.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Prefix marking ids assigned locally before the record first reaches the
/// remote store.
const LOCAL_ID_PREFIX: &str = "local-";

/// The collections mirrored between the remote store and the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Dogs,
    Activities,
    HealthRecords,
    Vaccinations,
}

impl Collection {
    /// All synced collections, in pull order.
    pub const ALL: [Self; 4] = [
        Self::Dogs,
        Self::Activities,
        Self::HealthRecords,
        Self::Vaccinations,
    ];

    /// Wire name of the collection, as used in cache keys and the remote API.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dogs => "dogs",
            Self::Activities => "activities",
            Self::HealthRecords => "healthRecords",
            Self::Vaccinations => "vaccinations",
        }
    }

    /// Local store table backing the collection.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Dogs => "dogs",
            Self::Activities => "activities",
            Self::HealthRecords => "health_records",
            Self::Vaccinations => "vaccinations",
        }
    }

    /// Cache freshness window, reflecting how often the data realistically
    /// changes: dogs and vaccinations rarely, health records occasionally,
    /// activities frequently.
    pub const fn cache_ttl(self) -> Duration {
        match self {
            Self::Dogs | Self::Vaccinations => Duration::from_secs(10 * 60),
            Self::HealthRecords => Duration::from_secs(5 * 60),
            Self::Activities => Duration::from_secs(2 * 60),
        }
    }

    /// Map an indexable record field to its local store column.
    ///
    /// Returns `None` for fields the local store has no secondary index on.
    pub fn index_column(self, field: &str) -> Option<&'static str> {
        match field {
            "userId" => Some("user_id"),
            "dogId" if self != Self::Dogs => Some("dog_id"),
            "date" if matches!(self, Self::Activities | Self::Vaccinations) => Some("date"),
            "type" if self == Self::HealthRecords => Some("record_type"),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dogs" => Ok(Self::Dogs),
            "activities" => Ok(Self::Activities),
            "healthRecords" => Ok(Self::HealthRecords),
            "vaccinations" => Ok(Self::Vaccinations),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown collection: {other}"
            ))),
        }
    }
}

/// A schemaless document, stored locally and remotely as a JSON object.
///
/// Every record carries an `id` and a `userId` by convention; collection
/// specific fields (`dogId`, `date`, `type`, `weight`, ...) are passed
/// through uninterpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(crate::Error::InvalidInput(format!(
                "record must be a JSON object, got {other}"
            ))),
        }
    }

    /// Generate a placeholder id for a record created while offline.
    #[must_use]
    pub fn local_placeholder_id() -> String {
        format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7())
    }

    /// Whether an id is a locally assigned placeholder awaiting sync.
    #[must_use]
    pub fn is_placeholder_id(id: &str) -> bool {
        id.starts_with(LOCAL_ID_PREFIX)
    }

    /// The record's id, when present and a string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Replace the record's id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert("id".to_string(), Value::String(id.into()));
    }

    /// The owning user's id, when present and a string.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.0.get("userId").and_then(Value::as_str)
    }

    /// A named field as a string, when present.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// A named field as a raw JSON value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Field-merge a patch into this record: every top-level key in the
    /// patch replaces the corresponding key here, other keys are untouched.
    pub fn merge(&mut self, patch: &Self) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Add `by` to a numeric field, treating a missing field as zero.
    pub fn apply_increment(&mut self, field: &str, by: i64) {
        let current = self.0.get(field).and_then(Value::as_i64).unwrap_or(0);
        self.0
            .insert(field.to_string(), Value::from(current + by));
    }

    /// Union values into an array field, skipping values already present.
    /// A missing or non-array field becomes a fresh array.
    pub fn apply_array_union(&mut self, field: &str, values: &[Value]) {
        let mut array = match self.0.get(field) {
            Some(Value::Array(existing)) => existing.clone(),
            _ => Vec::new(),
        };
        for value in values {
            if !array.contains(value) {
                array.push(value.clone());
            }
        }
        self.0.insert(field.to_string(), Value::Array(array));
    }

    /// The underlying JSON map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the record, returning the underlying JSON map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn collection_round_trips_through_strings() {
        for collection in Collection::ALL {
            let parsed: Collection = collection.as_str().parse().unwrap();
            assert_eq!(parsed, collection);
        }
        assert!("kennels".parse::<Collection>().is_err());
    }

    #[test]
    fn cache_ttls_reflect_change_frequency() {
        assert_eq!(Collection::Dogs.cache_ttl(), Duration::from_secs(600));
        assert_eq!(
            Collection::Vaccinations.cache_ttl(),
            Duration::from_secs(600)
        );
        assert_eq!(
            Collection::HealthRecords.cache_ttl(),
            Duration::from_secs(300)
        );
        assert_eq!(Collection::Activities.cache_ttl(), Duration::from_secs(120));
    }

    #[test]
    fn index_columns_are_collection_specific() {
        assert_eq!(Collection::Dogs.index_column("userId"), Some("user_id"));
        assert_eq!(Collection::Dogs.index_column("dogId"), None);
        assert_eq!(
            Collection::Activities.index_column("dogId"),
            Some("dog_id")
        );
        assert_eq!(Collection::Activities.index_column("date"), Some("date"));
        assert_eq!(
            Collection::HealthRecords.index_column("type"),
            Some("record_type")
        );
        assert_eq!(Collection::Vaccinations.index_column("type"), None);
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(Record::from_value(json!([1, 2])).is_err());
        assert!(Record::from_value(json!("flat")).is_err());
    }

    #[test]
    fn placeholder_ids_are_detectable_and_unique() {
        let a = Record::local_placeholder_id();
        let b = Record::local_placeholder_id();
        assert_ne!(a, b);
        assert!(Record::is_placeholder_id(&a));
        assert!(!Record::is_placeholder_id("srv-42"));
    }

    #[test]
    fn merge_replaces_top_level_fields_only() {
        let mut base = record(json!({"id": "d1", "name": "Rex", "weight": 12}));
        let patch = record(json!({"weight": 14, "breed": "lab"}));

        base.merge(&patch);

        assert_eq!(base.get("weight"), Some(&json!(14)));
        assert_eq!(base.str_field("breed"), Some("lab"));
        assert_eq!(base.str_field("name"), Some("Rex"));
    }

    #[test]
    fn increment_treats_missing_field_as_zero() {
        let mut rec = record(json!({"id": "a1"}));
        rec.apply_increment("walkCount", 2);
        rec.apply_increment("walkCount", 3);
        assert_eq!(rec.get("walkCount"), Some(&json!(5)));
    }

    #[test]
    fn array_union_skips_duplicates() {
        let mut rec = record(json!({"id": "d1", "tags": ["good"]}));
        rec.apply_array_union("tags", &[json!("good"), json!("fluffy")]);
        assert_eq!(rec.get("tags"), Some(&json!(["good", "fluffy"])));
    }

    #[test]
    fn array_union_replaces_non_array_field() {
        let mut rec = record(json!({"tags": "oops"}));
        rec.apply_array_union("tags", &[json!("a")]);
        assert_eq!(rec.get("tags"), Some(&json!(["a"])));
    }
}
