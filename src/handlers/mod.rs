pub mod admin;
pub mod auth;
pub mod dashboards;
pub mod loans;
pub mod notifications;
pub mod reports;

use axum::{http::HeaderMap, response::Response, Json};
use serde::Serialize;

use crate::flash::{self, Flash};
use crate::ApiResponse;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Page payload that also hands over (and clears) the pending flash message.
#[derive(Serialize)]
pub struct WithFlash<T> {
    pub flash: Option<Flash>,
    #[serde(flatten)]
    pub page: T,
}

pub(crate) fn page_with_flash<T: Serialize>(
    headers: &HeaderMap,
    secure: bool,
    page: T,
) -> Response {
    use axum::response::IntoResponse;

    let pending = Flash::from_headers(headers);
    let mut response = Json(ApiResponse::success(WithFlash {
        flash: pending,
        page,
    }))
    .into_response();
    flash::consume(headers, &mut response, secure);
    response
}
