use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;
use crate::auth::{AuthRouterExt, SessionUser};
use crate::entities::{state as lifecycle, Role};
use crate::services::reports::DashboardStats;
use crate::services::views::ProductView;
use crate::{ApiResponse, ApiResult};

#[derive(Serialize)]
pub struct UserDashboard {
    pub user: SessionUser,
    pub unread_notifications: u64,
    pub assigned: Vec<ProductView>,
}

#[derive(Serialize)]
pub struct TeacherDashboard {
    pub user: SessionUser,
    pub unread_notifications: u64,
    pub available: Vec<ProductView>,
    pub assigned: Vec<ProductView>,
}

#[derive(Serialize)]
pub struct StudentDashboard {
    pub user: SessionUser,
    pub unread_notifications: u64,
    pub loaned: Vec<ProductView>,
}

async fn admin_dashboard(State(state): State<AppState>) -> ApiResult<DashboardStats> {
    let stats = state.services.reports.dashboard().await?;
    Ok(Json(ApiResponse::success(stats)))
}

async fn user_dashboard(
    State(state): State<AppState>,
    session: SessionUser,
) -> ApiResult<UserDashboard> {
    let assigned = state.services.products.assigned_to(session.id).await?;
    let unread_notifications = state.services.notifications.unread_count(&session).await?;
    Ok(Json(ApiResponse::success(UserDashboard {
        user: session,
        unread_notifications,
        assigned,
    })))
}

async fn teacher_dashboard(
    State(state): State<AppState>,
    session: SessionUser,
) -> ApiResult<TeacherDashboard> {
    let available = state.services.products.in_state(lifecycle::AVAILABLE).await?;
    let assigned = state.services.products.assigned_to(session.id).await?;
    let unread_notifications = state.services.notifications.unread_count(&session).await?;
    Ok(Json(ApiResponse::success(TeacherDashboard {
        user: session,
        unread_notifications,
        available,
        assigned,
    })))
}

async fn student_dashboard(
    State(state): State<AppState>,
    session: SessionUser,
) -> ApiResult<StudentDashboard> {
    let loaned = state.services.products.loaned_to(session.id).await?;
    let unread_notifications = state.services.notifications.unread_count(&session).await?;
    Ok(Json(ApiResponse::success(StudentDashboard {
        user: session,
        unread_notifications,
        loaned,
    })))
}

pub fn routes() -> Router<AppState> {
    let staff = Router::new()
        .route("/admin/dashboard", get(admin_dashboard))
        .with_roles(&[Role::Admin, Role::Teacher]);
    let users = Router::new()
        .route("/usuario/dashboard", get(user_dashboard))
        .with_roles(&[Role::User]);
    let teachers = Router::new()
        .route("/profesor/dashboard", get(teacher_dashboard))
        .with_roles(&[Role::Teacher]);
    let students = Router::new()
        .route("/alumno/dashboard", get(student_dashboard))
        .with_roles(&[Role::Student]);

    staff.merge(users).merge(teachers).merge(students)
}
