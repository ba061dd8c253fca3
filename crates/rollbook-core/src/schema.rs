//! Per-collection field schemas.
//!
//! Every backend runs [`Schema::conform`] on the full field map of a document
//! before writing it, both on insert and on the merged result of an update.
//! Conforming drops unknown fields, enforces required fields and maximum
//! lengths, and normalizes dates to `YYYY-MM-DD`.

use serde_json::{Number, Value};
use thiserror::Error;
use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    Date, OffsetDateTime,
};

use crate::models::Fields;

pub const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required.")]
    Required(&'static str),
    #[error("{label} must be at most {max} characters.")]
    TooLong { label: &'static str, max: usize },
    #[error("{label} must be {expected}.")]
    WrongType {
        label: &'static str,
        expected: &'static str,
    },
    #[error("{0} must be a date (YYYY-MM-DD).")]
    BadDate(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Number,
    /// Identifier of a record in another collection. Stored as a plain
    /// string; the referenced record is never checked.
    Reference,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Kept as an explicit `null` when absent instead of being omitted.
    pub nullable: bool,
    pub max_len: Option<usize>,
    pub unique: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            nullable: false,
            max_len: None,
            unique: false,
        }
    }

    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub const fn date(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Date)
    }

    pub const fn number(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Number)
    }

    pub const fn reference(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Reference)
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn conform_value(&self, value: &Value) -> Result<Value, ValidationError> {
        match self.kind {
            FieldKind::Text | FieldKind::Reference => {
                let s = value.as_str().ok_or(ValidationError::WrongType {
                    label: self.label,
                    expected: "a string",
                })?;
                if self.required && s.trim().is_empty() {
                    return Err(ValidationError::Required(self.label));
                }
                if let Some(max) = self.max_len {
                    if s.chars().count() > max {
                        return Err(ValidationError::TooLong {
                            label: self.label,
                            max,
                        });
                    }
                }
                Ok(Value::String(s.to_string()))
            }
            FieldKind::Date => {
                let raw = value.as_str().ok_or(ValidationError::BadDate(self.label))?;
                normalize_date(raw)
                    .map(Value::String)
                    .ok_or(ValidationError::BadDate(self.label))
            }
            FieldKind::Number => match value {
                Value::Number(n) => Ok(Value::Number(n.clone())),
                // numeric strings are cast, as form posts send everything as text
                Value::String(s) => parse_number(s.trim())
                    .map(Value::Number)
                    .ok_or(ValidationError::WrongType {
                        label: self.label,
                        expected: "a number",
                    }),
                _ => Err(ValidationError::WrongType {
                    label: self.label,
                    expected: "a number",
                }),
            },
        }
    }
}

/// Integers keep integer form; anything else goes through `f64`.
fn parse_number(raw: &str) -> Option<Number> {
    match raw.parse::<i64>() {
        Ok(n) => Some(Number::from(n)),
        Err(_) => raw.parse::<f64>().ok().and_then(Number::from_f64),
    }
}

#[derive(Debug)]
pub struct Schema {
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.unique)
    }

    /// Validates `fields` and returns the stored form: unknown keys dropped,
    /// nulls on optional fields removed (or kept for nullable ones), dates
    /// normalized.
    pub fn conform(&self, fields: &Fields) -> Result<Fields, ValidationError> {
        let mut out = Fields::new();
        for spec in self.fields {
            match fields.get(spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(ValidationError::Required(spec.label));
                    }
                    if spec.nullable {
                        out.insert(spec.name.to_string(), Value::Null);
                    }
                }
                Some(value) => {
                    out.insert(spec.name.to_string(), spec.conform_value(value)?);
                }
            }
        }
        Ok(out)
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp and returns the calendar date
/// as `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let date = Date::parse(raw, DATE_FORMAT)
        .ok()
        .or_else(|| OffsetDateTime::parse(raw, &Rfc3339).ok().map(|dt| dt.date()))?;
    date.format(DATE_FORMAT).ok()
}

pub static STUDENTS: Schema = Schema {
    fields: &[
        FieldSpec::text("firstName", "First name").required(),
        FieldSpec::text("lastName", "Last name").required(),
        FieldSpec::date("dob", "Date of birth"),
        FieldSpec::text("email", "Email"),
        FieldSpec::text("phone", "Phone"),
        FieldSpec::text("address", "Address"),
        FieldSpec::reference("classId", "Class ID"),
        FieldSpec::text("medicalHistory", "Medical history"),
        FieldSpec::text("remarks", "Remarks"),
    ],
};

pub static TEACHERS: Schema = Schema {
    fields: &[
        FieldSpec::text("firstName", "First name").required(),
        FieldSpec::text("lastName", "Last name").required(),
        FieldSpec::text("email", "Email").required().unique(),
        FieldSpec::text("phone", "Phone").required(),
        FieldSpec::text("subject", "Subject").required(),
        FieldSpec::text("remarks", "Remarks"),
    ],
};

pub static CLASSES: Schema = Schema {
    fields: &[
        FieldSpec::text("className", "Class name").required().max_len(50),
        FieldSpec::reference("teacherId", "Teacher ID").nullable(),
        FieldSpec::text("remarks", "Remarks"),
    ],
};

pub static EXAMS: Schema = Schema {
    fields: &[
        FieldSpec::reference("classId", "Class ID").required(),
        FieldSpec::date("examDate", "Exam date").required(),
        FieldSpec::text("remarks", "Remarks"),
    ],
};

pub static ATTENDANCE: Schema = Schema {
    fields: &[
        FieldSpec::reference("studentId", "Student ID").required(),
        FieldSpec::date("date", "Date").required(),
        FieldSpec::text("status", "Status").required().max_len(20),
        FieldSpec::text("remarks", "Remarks"),
    ],
};

pub static RESULTS: Schema = Schema {
    fields: &[
        FieldSpec::reference("studentId", "Student ID").required(),
        FieldSpec::reference("examId", "Exam ID").required(),
        FieldSpec::number("marks", "Marks").required(),
        FieldSpec::text("grade", "Grade").required().max_len(5),
        FieldSpec::text("remarks", "Remarks"),
    ],
};
