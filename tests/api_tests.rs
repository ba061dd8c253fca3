use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use rollbook::{build_router, config::UnknownFieldPolicy, AppState};
use rollbook_core::RecordStore;
use rollbook_memory::InMemoryStore;
use rollbook_sqlite::SqliteStore;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> Router {
    build_router(AppState::new(Arc::new(InMemoryStore::new())))
}

fn setup_with(store: Arc<dyn RecordStore>, policy: UnknownFieldPolicy) -> Router {
    build_router(AppState::new(store).with_unknown_fields(policy))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

fn keys(body: &Value) -> Vec<&str> {
    body.as_object()
        .map(|fields| fields.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

fn ada() -> Value {
    json!({
        "firstName": "Ada",
        "lastName": "Lovelace",
        "email": "ada@x.com",
        "phone": "555",
        "subject": "Math"
    })
}

#[tokio::test]
async fn test_teacher_lifecycle() {
    let app = setup();

    let (status, body) = call(&app, Method::POST, "/api/teachers", Some(ada())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Teacher added successfully.");
    let teacher = &body["teacher"];
    let id = teacher["_id"].as_str().expect("id assigned").to_string();
    assert_eq!(teacher["email"], "ada@x.com");
    assert!(teacher["createdAt"].is_string());
    assert_eq!(teacher["createdAt"], teacher["updatedAt"]);

    let (status, body) = call(&app, Method::POST, "/api/teachers", Some(ada())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "Email already exists."}));

    let (status, body) = call(&app, Method::GET, "/api/teachers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teachers"].as_array().map(Vec::len), Some(1));

    let (status, body) = call(&app, Method::GET, "/api/teachers/search?name=LOVE", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teachers"][0]["_id"], id.as_str());

    let (status, body) = call(&app, Method::GET, &format!("/api/teachers/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teacher"]["firstName"], "Ada");

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/teachers/{}", id),
        Some(json!({"subject": "Analytical Engines"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Teacher updated successfully.");
    assert_eq!(body["teacher"]["subject"], "Analytical Engines");
    assert_eq!(body["teacher"]["lastName"], "Lovelace");

    let (status, body) = call(&app, Method::DELETE, &format!("/api/teachers/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Teacher removed successfully.");
    assert_eq!(body["teacher"]["_id"], id.as_str());

    let (status, body) = call(&app, Method::GET, &format!("/api/teachers/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Teacher not found.");
}

#[tokio::test]
async fn test_missing_ids_are_not_found() {
    let app = setup();

    let (status, body) = call(&app, Method::PUT, "/api/students/nope", Some(json!({"remarks": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Student not found.");

    let (status, body) = call(&app, Method::DELETE, "/api/exams/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Exam not found.");
}

#[tokio::test]
async fn test_search_parameter_rules() {
    let app = setup();

    let (status, body) = call(&app, Method::GET, "/api/students/search", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Name query parameter is required.");

    let (status, body) = call(&app, Method::GET, "/api/students/search?name=zed", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No students found.");

    let (status, body) = call(&app, Method::GET, "/api/attendance/search", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Student ID query parameter is required.");

    let (status, body) = call(&app, Method::GET, "/api/exams/search", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No exams found.");

    let (status, _) = call(&app, Method::GET, "/api/exams/search?examDate=soon", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, Method::GET, "/api/teachers/search?name=zed", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No teachers found with the given name.");
}

#[tokio::test]
async fn test_name_search_is_literal() {
    let app = setup();
    for (first, last) in [("Ana", "Lima"), ("Bo", "a.b"), ("Cy", "Lee")] {
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/students",
            Some(json!({"firstName": first, "lastName": last})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call(&app, Method::GET, "/api/students/search?name=a.b", None).await;
    assert_eq!(status, StatusCode::OK);
    let hits = body["students"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["firstName"], "Bo");

    let (_, body) = call(&app, Method::GET, "/api/students/search?name=li", None).await;
    assert_eq!(body["students"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_exam_and_attendance_search() {
    let app = setup();

    let (_, class) = call(&app, Method::POST, "/api/classes", Some(json!({"className": "7B"}))).await;
    let class_id = class["newClass"]["_id"].as_str().unwrap().to_string();
    assert_eq!(class["newClass"]["teacherId"], Value::Null);

    for date in ["2024-06-01", "2024-06-08"] {
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/exams",
            Some(json!({"classId": class_id, "examDate": date})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["newExam"]["examDate"], date);
        assert_eq!(keys(&body), ["message", "newExam"]);
    }

    let (status, body) = call(&app, Method::GET, "/api/exams/search", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exams"].as_array().map(Vec::len), Some(2));

    let uri = format!("/api/exams/search?classId={}&examDate=2024-06-08", class_id);
    let (status, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exams"].as_array().map(Vec::len), Some(1));

    let uri = format!("/api/exams/search?classId={}", class_id);
    let (_, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(body["exams"].as_array().map(Vec::len), Some(2));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/attendance",
        Some(json!({"studentId": "s1", "date": "2024-06-01T08:30:00Z", "status": "Present"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Attendance added successfully.");
    assert_eq!(body["newAttendance"]["date"], "2024-06-01");
    let attendance_id = body["newAttendance"]["_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::GET, "/api/attendance/search?studentId=s1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys(&body), ["attendances"]);
    assert_eq!(body["attendances"][0]["status"], "Present");

    let uri = format!("/api/attendance/{}", attendance_id);
    let (status, body) = call(&app, Method::PUT, &uri, Some(json!({"status": "Late"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys(&body), ["message", "updatedAttendance"]);
    assert_eq!(body["updatedAttendance"]["status"], "Late");

    let (status, body) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys(&body), ["message", "removedAttendance"]);

    let (status, body) = call(&app, Method::GET, "/api/attendance/search?studentId=s2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No attendance records found.");
}

#[tokio::test]
async fn test_validation_failures_are_client_errors() {
    let app = setup();

    let (status, body) = call(&app, Method::POST, "/api/classes", Some(json!({"remarks": "no name"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Class name is required.");

    let long_name = "x".repeat(51);
    let (status, _) = call(&app, Method::POST, "/api/classes", Some(json!({"className": long_name}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/exams",
        Some(json!({"classId": "c1", "examDate": "next tuesday"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/api/teachers", Some(json!(["not", "an", "object"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, Method::GET, "/api/classes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_results_endpoints() {
    let app = setup();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/results",
        Some(json!({"studentId": "s1", "examId": "e1", "marks": "87.5", "grade": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["newResult"]["marks"], 87.5);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/results",
        Some(json!({"studentId": "s2", "examId": "e1", "marks": 87, "grade": "B"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["newResult"]["marks"], json!(87));
    assert!(body["newResult"]["marks"].is_u64());

    let uri = format!("/api/results/{}", body["newResult"]["_id"].as_str().unwrap());
    let (_, body) = call(&app, Method::PUT, &uri, Some(json!({"grade": "B+"}))).await;
    assert_eq!(body["updatedResult"]["marks"], json!(87));
    let (status, body) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removedResult"]["grade"], "B+");

    let (status, body) = call(&app, Method::GET, "/api/results/search?examId=e1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["grade"], "A");

    let (status, body) = call(&app, Method::GET, "/api/results", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_unknown_field_policies() {
    let app = setup();
    let mut body = ada();
    body["favouriteColour"] = json!("blue");
    let (status, created) = call(&app, Method::POST, "/api/teachers", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["teacher"].get("favouriteColour").is_none());

    let strict = setup_with(Arc::new(InMemoryStore::new()), UnknownFieldPolicy::Reject);
    let (status, rejected) = call(&strict, Method::POST, "/api/teachers", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected["message"], "Unknown field: favouriteColour.");

    let (status, created) = call(&strict, Method::POST, "/api/teachers", Some(ada())).await;
    assert_eq!(status, StatusCode::CREATED);

    // A fetched record can be sent back as-is.
    let teacher = created["teacher"].clone();
    let uri = format!("/api/teachers/{}", teacher["_id"].as_str().unwrap());
    let (status, _) = call(&strict, Method::PUT, &uri, Some(teacher)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sqlite_backend_behaves_the_same() {
    let store = Arc::new(SqliteStore::new(":memory:").expect("open sqlite"));
    let app = setup_with(store, UnknownFieldPolicy::Ignore);

    let (status, _) = call(&app, Method::POST, "/api/teachers", Some(ada())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(&app, Method::POST, "/api/teachers", Some(ada())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already exists.");

    let (status, body) = call(&app, Method::GET, "/api/teachers/search?name=lovelace", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teachers"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_health_and_admin_page() {
    let app = setup();
    call(&app, Method::POST, "/api/teachers", Some(ada())).await;

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["records"]["teachers"], 1);
    assert_eq!(body["records"]["students"], 0);

    let (status, _) = call(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, page) = call(&app, Method::GET, "/admin/teachers", None).await;
    assert_eq!(status, StatusCode::OK);
    let page = page.as_str().expect("html body");
    assert!(page.contains("Manage Teachers"));
    assert!(page.contains(r#"const API = "/api/teachers";"#));
}
