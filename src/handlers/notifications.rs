use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::AppState;
use crate::auth::{AuthRouterExt, SessionUser};
use crate::entities::notification;
use crate::{ApiResponse, ApiResult};

#[derive(Serialize)]
pub struct Inbox {
    pub unread: usize,
    pub notifications: Vec<notification::Model>,
}

async fn inbox(State(state): State<AppState>, session: SessionUser) -> ApiResult<Inbox> {
    let notifications = state.services.notifications.visible_to(&session).await?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    Ok(Json(ApiResponse::success(Inbox {
        unread,
        notifications,
    })))
}

async fn mark_read(
    State(state): State<AppState>,
    session: SessionUser,
    Path(id): Path<i32>,
) -> ApiResult<notification::Model> {
    let updated = state.services.notifications.mark_read(&session, id).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notificaciones", get(inbox))
        .route("/notificaciones/:id/leida", post(mark_read))
        .with_login()
}
