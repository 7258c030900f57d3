use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use super::AppState;
use crate::auth::{AuthRouterExt, SessionUser};
use crate::entities::Role;
use crate::errors::ServiceError;
use crate::export::{self, ExportFormat};
use crate::forms::ReportQuery;
use crate::services::reports::Report;
use crate::{ApiResponse, ApiResult};

async fn report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Report> {
    let filter = query.into_filter(Utc::now().date_naive())?;
    let report = state.services.reports.report(&filter).await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn export_movements(
    State(state): State<AppState>,
    session: SessionUser,
    Path(format): Path<String>,
) -> Result<Response, ServiceError> {
    let format = ExportFormat::parse(&format)
        .ok_or_else(|| ServiceError::NotFound(format!("Export format {} not supported", format)))?;

    let rows = state.services.reports.export_rows().await?;
    let count = rows.len();
    let bytes = tokio::task::spawn_blocking(move || export::render(format, &rows))
        .await
        .map_err(|e| ServiceError::InternalError(e.to_string()))??;

    info!(user_id = session.id, %format, rows = count, "movement history exported");

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename={}",
        format.filename()
    ))
    .map_err(|e| ServiceError::InternalError(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(format.content_type()),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub fn routes() -> Router<AppState> {
    let staff = Router::new()
        .route("/reportes", get(report))
        .with_roles(&[Role::Admin, Role::Teacher]);
    let exports = Router::new()
        .route("/reportes/exportar/:format", get(export_movements))
        .with_roles(&[Role::Admin]);

    staff.merge(exports)
}
