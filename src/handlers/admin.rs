use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::AppState;
use crate::auth::{AuthRouterExt, SessionUser};
use crate::entities::{user, Role};
use crate::flash::{Flash, Redirect};
use crate::forms::{ProductForm, StateChangeForm};
use crate::services::recorder::RequestContext;
use crate::services::views::{AuditView, ProductView, StateView};
use crate::{ApiResponse, ApiResult};

#[derive(Serialize)]
pub struct StateChoice {
    pub product: ProductView,
    pub states: Vec<StateView>,
}

async fn list_products(State(state): State<AppState>) -> ApiResult<Vec<ProductView>> {
    let products = state.services.products.list().await?;
    Ok(Json(ApiResponse::success(products)))
}

async fn new_product_page(State(state): State<AppState>) -> ApiResult<Vec<StateView>> {
    let states = state.services.states.list().await?;
    Ok(Json(ApiResponse::success(
        states.iter().map(StateView::from).collect(),
    )))
}

async fn create_product(
    State(state): State<AppState>,
    session: SessionUser,
    headers: HeaderMap,
    Json(form): Json<ProductForm>,
) -> Result<Response, crate::errors::ServiceError> {
    let input = form.into_new_product()?;
    let created = state
        .services
        .products
        .create(&session, input, &RequestContext::from_headers(&headers))
        .await?;

    Ok(Redirect::to("/admin/productos")
        .with_flash(Flash::success(format!("Product {} created.", created.name)))
        .secure(state.config.secure_cookies)
        .into_response())
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<user::Model>> {
    let users = state.services.users.list().await?;
    Ok(Json(ApiResponse::success(users)))
}

async fn audit_log(State(state): State<AppState>) -> ApiResult<Vec<AuditView>> {
    let entries = state.services.audit.list(None).await?;
    Ok(Json(ApiResponse::success(entries)))
}

async fn state_change_page(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
) -> ApiResult<StateChoice> {
    let product = state.services.products.get(product_id).await?;
    let states = state.services.states.list().await?;
    Ok(Json(ApiResponse::success(StateChoice {
        product,
        states: states.iter().map(StateView::from).collect(),
    })))
}

async fn change_state(
    State(state): State<AppState>,
    session: SessionUser,
    Path(product_id): Path<i32>,
    headers: HeaderMap,
    Json(form): Json<StateChangeForm>,
) -> Result<Response, crate::errors::ServiceError> {
    let target = form.into_state_id()?;
    let record = state
        .services
        .recorder
        .change_state(
            &session,
            product_id,
            target,
            &RequestContext::from_headers(&headers),
        )
        .await?;

    Ok(Redirect::to("/admin/productos")
        .with_flash(Flash::success(format!(
            "Product {} is now {}.",
            record.product.name, record.movement.new_state
        )))
        .secure(state.config.secure_cookies)
        .into_response())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/productos", get(list_products))
        .route(
            "/admin/productos/nuevo",
            get(new_product_page).post(create_product),
        )
        .route("/admin/usuarios", get(list_users))
        .route("/admin/auditoria", get(audit_log))
        .route(
            "/admin/producto/:id/cambiar_estado",
            get(state_change_page).post(change_state),
        )
        .with_roles(&[Role::Admin])
}
