use axum::{
    extract::State,
    handler::Handler,
    http::HeaderMap,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use super::{page_with_flash, AppState};
use crate::auth::{extract_token, AuthRouterExt, SessionUser};
use crate::errors::ServiceError;
use crate::flash::{Flash, Redirect};
use crate::forms::{LoginForm, RegistrationForm};
use crate::rate_limiter::{rate_limit_middleware, RateLimiter};
use crate::services::recorder::RequestContext;

#[derive(Serialize)]
struct FormPage {
    fields: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    roles: Option<Vec<&'static str>>,
}

async fn landing(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.auth.resolve_session(&headers).await.is_ok() {
        return Redirect::to("/dashboard").into_response();
    }
    page_with_flash(
        &headers,
        state.config.secure_cookies,
        serde_json::json!({ "name": env!("CARGO_PKG_NAME"), "login": "/login", "register": "/registro" }),
    )
}

async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.auth.resolve_session(&headers).await.is_ok() {
        return Redirect::to("/dashboard").into_response();
    }
    page_with_flash(
        &headers,
        state.config.secure_cookies,
        FormPage {
            fields: &["username", "password"],
            roles: None,
        },
    )
}

async fn login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> Result<Response, ServiceError> {
    let credentials = form.into_credentials()?;
    let account = state
        .auth
        .authenticate(&credentials)
        .await
        .inspect_err(|_| warn!(username = %credentials.username, "failed login attempt"))?;
    let token = state
        .auth
        .issue_token(&account)
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;

    info!(user_id = account.id, role = %account.role, "user signed in");
    Ok(Redirect::to("/dashboard")
        .with_flash(Flash::success(format!("Welcome, {}!", account.username)))
        .with_cookie(state.auth.session_cookie(&token))
        .secure(state.config.secure_cookies)
        .into_response())
}

async fn registration_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut roles = vec!["user", "teacher", "student"];
    if state.config.allow_admin_registration {
        roles.insert(0, "admin");
    }
    page_with_flash(
        &headers,
        state.config.secure_cookies,
        FormPage {
            fields: &["username", "password", "confirm_password", "role"],
            roles: Some(roles),
        },
    )
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<RegistrationForm>,
) -> Result<Response, ServiceError> {
    let registration = form.into_registration(state.config.allow_admin_registration)?;
    state
        .services
        .users
        .register(registration, &RequestContext::from_headers(&headers))
        .await?;

    Ok(Redirect::to("/login")
        .with_flash(Flash::success("Registration successful. You can now log in."))
        .secure(state.config.secure_cookies)
        .into_response())
}

async fn logout(
    State(state): State<AppState>,
    session: SessionUser,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = extract_token(&headers) {
        if let Err(e) = state.auth.revoke_token(&token).await {
            warn!(user_id = session.id, error = %e, "could not revoke session token");
        }
    }
    info!(user_id = session.id, "user signed out");
    Redirect::to("/login")
        .with_flash(Flash::info("You have been logged out."))
        .with_cookie(state.auth.clear_session_cookie())
        .secure(state.config.secure_cookies)
        .into_response()
}

/// Sends each role to its own dashboard.
async fn dashboard(session: SessionUser) -> Redirect {
    Redirect::to(session.role.dashboard_path())
}

pub fn routes(registration_limiter: RateLimiter) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(landing))
        .route("/login", get(login_page).post(login))
        .route(
            "/registro",
            get(registration_page).post(register.layer(from_fn_with_state(
                registration_limiter,
                rate_limit_middleware,
            ))),
        );

    let signed_in = Router::new()
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard))
        .with_login();

    public.merge(signed_in)
}
