//! Page handlers

use axum::response::Html;

use crate::views;

/// GET /
///
/// Upload form
pub async fn home() -> Html<String> {
    Html(views::home_page())
}
