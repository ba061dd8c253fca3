//! Typed school records.
//!
//! Stores persist untyped [`Document`]s; these types are the shape the HTTP
//! layer accepts and returns. Reference fields (`class_id`, `teacher_id`, ...)
//! are plain ids and are never resolved.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Number, Value};
use time::{Date, OffsetDateTime};

use crate::models::{Collection, Document, Fields, RecordId};
use crate::storage::StoreError;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn to_fields(&self) -> Result<Fields, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(other) => Err(StoreError::Corrupt(format!(
                "{} did not serialize to an object: {}",
                Self::COLLECTION,
                other
            ))),
            Err(e) => Err(StoreError::Corrupt(e.to_string())),
        }
    }
}

/// An entity together with its store-assigned identity and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<E> {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(flatten)]
    pub data: E,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl<E: Entity> TryFrom<Document> for Record<E> {
    type Error = StoreError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        let data = serde_json::from_value(Value::Object(doc.fields)).map_err(|e| {
            StoreError::Corrupt(format!("{} {}: {}", E::COLLECTION, doc.id, e))
        })?;
        Ok(Record {
            id: doc.id,
            data,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, with = "iso_date::option", skip_serializing_if = "Option::is_none")]
    pub dob: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Entity for Student {
    const COLLECTION: Collection = Collection::Students;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Entity for Teacher {
    const COLLECTION: Collection = Collection::Teachers;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub class_name: String,
    #[serde(default)]
    pub teacher_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Entity for SchoolClass {
    const COLLECTION: Collection = Collection::Classes;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub class_id: RecordId,
    #[serde(with = "iso_date")]
    pub exam_date: Date,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Entity for Exam {
    const COLLECTION: Collection = Collection::Exams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub student_id: RecordId,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Entity for Attendance {
    const COLLECTION: Collection = Collection::Attendance;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub student_id: RecordId,
    pub exam_id: RecordId,
    /// Kept as submitted; `87` stays an integer.
    pub marks: Number,
    pub grade: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Entity for ExamResult {
    const COLLECTION: Collection = Collection::Results;
}
