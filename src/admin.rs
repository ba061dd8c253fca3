//! Browser page for managing teachers.
//!
//! The page is plain HTML and script compiled into the binary. It talks to
//! the JSON API only; the server fills in the API path it mounted teachers at.

use axum::response::Html;

use crate::api::TEACHERS_PATH;

const TEACHER_PAGE: &str = include_str!("../assets/teachers.html");
const API_BASE_PLACEHOLDER: &str = "__API_BASE__";

pub fn render_teacher_page(api_base: &str) -> String {
    TEACHER_PAGE.replace(API_BASE_PLACEHOLDER, api_base)
}

pub async fn teacher_page() -> Html<String> {
    Html(render_teacher_page(TEACHERS_PATH))
}
