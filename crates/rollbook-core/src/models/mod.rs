use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::schema::{self, Schema};

/// Field values of a stored document, keyed by wire name.
pub type Fields = Map<String, Value>;

/// Opaque document identifier assigned by the store at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Students,
    Teachers,
    Classes,
    Exams,
    Attendance,
    Results,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Students,
        Collection::Teachers,
        Collection::Classes,
        Collection::Exams,
        Collection::Attendance,
        Collection::Results,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Teachers => "teachers",
            Collection::Classes => "classes",
            Collection::Exams => "exams",
            Collection::Attendance => "attendance",
            Collection::Results => "results",
        }
    }

    pub fn schema(&self) -> &'static Schema {
        match self {
            Collection::Students => &schema::STUDENTS,
            Collection::Teachers => &schema::TEACHERS,
            Collection::Classes => &schema::CLASSES,
            Collection::Exams => &schema::EXAMS,
            Collection::Attendance => &schema::ATTENDANCE,
            Collection::Results => &schema::RESULTS,
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {}", s))
    }
}

/// The unit a record store persists: server-assigned identity and timestamps
/// around a conformed field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: RecordId,
    pub fields: Fields,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Document {
    pub fn new(id: RecordId, fields: Fields, now: OffsetDateTime) -> Self {
        Self {
            id,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// String value of a field, if present and textual.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Overlays `patch` onto the stored fields. Keys absent from the patch are
    /// left untouched.
    pub fn merged_fields(&self, patch: &Fields) -> Fields {
        let mut merged = self.fields.clone();
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}
