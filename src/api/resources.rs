use std::collections::HashMap;

use rollbook_core::{
    schema::normalize_date, Attendance, Entity, Exam, ExamResult, Filter, SchoolClass, Student, Teacher,
};

use crate::error::ApiError;

/// Wire naming and search rules for one entity table.
pub trait Resource: Entity {
    /// Response key for a fetched record, e.g. `teacher`.
    const SINGULAR: &'static str;
    /// Response keys for the record returned by create, update and delete.
    const CREATED_KEY: &'static str = Self::SINGULAR;
    const UPDATED_KEY: &'static str = Self::SINGULAR;
    const REMOVED_KEY: &'static str = Self::SINGULAR;
    /// Response key for search hits, e.g. `teachers`.
    const PLURAL: &'static str;
    /// Capitalized name used in confirmation and not-found messages.
    const LABEL: &'static str;
    /// 404 message for a search with no hits.
    const NO_MATCHES: &'static str;
    /// List responses are `{ <plural>: [...] }` instead of a bare array.
    const WRAP_LIST: bool = false;
    /// Exposes `GET /:id`.
    const FETCH_BY_ID: bool = false;

    fn search_filter(params: &HashMap<String, String>) -> Result<Filter, ApiError>;
}

/// A query parameter counts as present only when it has non-blank content.
fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn name_filter(params: &HashMap<String, String>) -> Result<Filter, ApiError> {
    let name = param(params, "name").ok_or_else(|| ApiError::BadRequest("Name query parameter is required.".into()))?;
    Ok(Filter::Or(vec![
        Filter::contains("firstName", name),
        Filter::contains("lastName", name),
    ]))
}

impl Resource for Student {
    const SINGULAR: &'static str = "student";
    const CREATED_KEY: &'static str = "newStudent";
    const UPDATED_KEY: &'static str = "updatedStudent";
    const REMOVED_KEY: &'static str = "removedStudent";
    const PLURAL: &'static str = "students";
    const LABEL: &'static str = "Student";
    const NO_MATCHES: &'static str = "No students found.";

    fn search_filter(params: &HashMap<String, String>) -> Result<Filter, ApiError> {
        name_filter(params)
    }
}

impl Resource for Teacher {
    const SINGULAR: &'static str = "teacher";
    const PLURAL: &'static str = "teachers";
    const LABEL: &'static str = "Teacher";
    const NO_MATCHES: &'static str = "No teachers found with the given name.";
    const WRAP_LIST: bool = true;
    const FETCH_BY_ID: bool = true;

    fn search_filter(params: &HashMap<String, String>) -> Result<Filter, ApiError> {
        name_filter(params)
    }
}

impl Resource for SchoolClass {
    const SINGULAR: &'static str = "class";
    const CREATED_KEY: &'static str = "newClass";
    const UPDATED_KEY: &'static str = "updatedClass";
    const REMOVED_KEY: &'static str = "removedClass";
    const PLURAL: &'static str = "classes";
    const LABEL: &'static str = "Class";
    const NO_MATCHES: &'static str = "No classes found.";

    fn search_filter(params: &HashMap<String, String>) -> Result<Filter, ApiError> {
        let name = param(params, "name").ok_or_else(|| ApiError::BadRequest("Name query parameter is required.".into()))?;
        Ok(Filter::contains("className", name))
    }
}

impl Resource for Exam {
    const SINGULAR: &'static str = "exam";
    const CREATED_KEY: &'static str = "newExam";
    const UPDATED_KEY: &'static str = "updatedExam";
    const REMOVED_KEY: &'static str = "removedExam";
    const PLURAL: &'static str = "exams";
    const LABEL: &'static str = "Exam";
    const NO_MATCHES: &'static str = "No exams found.";

    fn search_filter(params: &HashMap<String, String>) -> Result<Filter, ApiError> {
        let mut clauses = Vec::new();
        if let Some(class_id) = param(params, "classId") {
            clauses.push(Filter::equals("classId", class_id));
        }
        if let Some(raw) = param(params, "examDate") {
            let date = normalize_date(raw)
                .ok_or_else(|| ApiError::BadRequest("Exam date must be a date (YYYY-MM-DD).".into()))?;
            clauses.push(Filter::equals("examDate", date));
        }
        // no parameters lists every exam
        if clauses.is_empty() {
            return Ok(Filter::Everything);
        }
        Ok(Filter::And(clauses))
    }
}

impl Resource for Attendance {
    const SINGULAR: &'static str = "attendance";
    const CREATED_KEY: &'static str = "newAttendance";
    const UPDATED_KEY: &'static str = "updatedAttendance";
    const REMOVED_KEY: &'static str = "removedAttendance";
    const PLURAL: &'static str = "attendances";
    const LABEL: &'static str = "Attendance";
    const NO_MATCHES: &'static str = "No attendance records found.";

    fn search_filter(params: &HashMap<String, String>) -> Result<Filter, ApiError> {
        let student_id = param(params, "studentId")
            .ok_or_else(|| ApiError::BadRequest("Student ID query parameter is required.".into()))?;
        Ok(Filter::equals("studentId", student_id))
    }
}

impl Resource for ExamResult {
    const SINGULAR: &'static str = "result";
    const CREATED_KEY: &'static str = "newResult";
    const UPDATED_KEY: &'static str = "updatedResult";
    const REMOVED_KEY: &'static str = "removedResult";
    const PLURAL: &'static str = "results";
    const LABEL: &'static str = "Result";
    const NO_MATCHES: &'static str = "No results found.";

    fn search_filter(params: &HashMap<String, String>) -> Result<Filter, ApiError> {
        let clauses: Vec<Filter> = ["studentId", "examId"]
            .into_iter()
            .filter_map(|key| param(params, key).map(|v| Filter::equals(key, v)))
            .collect();
        if clauses.is_empty() {
            return Err(ApiError::BadRequest(
                "Student ID or exam ID query parameter is required.".into(),
            ));
        }
        Ok(Filter::And(clauses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn blank_name_is_missing() {
        let err = Teacher::search_filter(&params(&[("name", "   ")])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(m) if m == "Name query parameter is required."));
    }

    #[test]
    fn name_search_spans_first_and_last_name() {
        let filter = Student::search_filter(&params(&[("name", "love")])).unwrap();
        assert_eq!(
            filter,
            Filter::Or(vec![
                Filter::contains("firstName", "love"),
                Filter::contains("lastName", "love"),
            ])
        );
    }

    #[test]
    fn exam_search_normalizes_date() {
        let filter = Exam::search_filter(&params(&[("examDate", "2024-06-01T09:00:00Z")])).unwrap();
        assert_eq!(filter, Filter::And(vec![Filter::equals("examDate", "2024-06-01")]));

        assert!(Exam::search_filter(&params(&[("examDate", "June 1st")])).is_err());
    }

    #[test]
    fn exam_search_without_parameters_matches_everything() {
        assert_eq!(Exam::search_filter(&params(&[])).unwrap(), Filter::Everything);
        assert_eq!(Exam::search_filter(&params(&[("classId", " ")])).unwrap(), Filter::Everything);
    }

    #[test]
    fn result_search_accepts_either_id() {
        let filter = ExamResult::search_filter(&params(&[("examId", "e1")])).unwrap();
        assert_eq!(filter, Filter::And(vec![Filter::equals("examId", "e1")]));
        assert!(ExamResult::search_filter(&params(&[("grade", "A")])).is_err());
    }
}
