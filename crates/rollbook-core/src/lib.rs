//! Core types and traits for Rollbook record store backends.
//!
//! This crate provides the `RecordStore` trait, the document and schema types
//! every backend persists, and the typed school entities the HTTP layer
//! validates requests against.

pub mod entities;
pub mod filter;
pub mod models;
pub mod schema;
pub mod storage;

// Re-export key types at crate root for convenience
pub use entities::{Attendance, Entity, Exam, ExamResult, Record, SchoolClass, Student, Teacher};
pub use filter::Filter;
pub use models::{Collection, Document, Fields, RecordId};
pub use schema::{FieldKind, FieldSpec, Schema, ValidationError};
pub use storage::{RecordStore, StoreError};
