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
use crate::errors::ServiceError;
use crate::flash::{Flash, Redirect};
use crate::forms::{LoanDuration, LoanRequestForm};
use crate::services::recorder::RequestContext;
use crate::services::views::{MovementView, ProductView};
use crate::{ApiResponse, ApiResult};

#[derive(Serialize)]
pub struct LoanPage {
    pub product: ProductView,
    pub durations: Vec<i32>,
}

#[derive(Serialize)]
pub struct ProductHistory {
    pub product: ProductView,
    pub movements: Vec<MovementView>,
}

async fn loan_page(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
) -> ApiResult<LoanPage> {
    let product = state.services.products.get(product_id).await?;
    let durations = [
        LoanDuration::OneWeek,
        LoanDuration::TwoWeeks,
        LoanDuration::OneMonth,
    ]
    .iter()
    .map(|d| d.days())
    .collect();
    Ok(Json(ApiResponse::success(LoanPage { product, durations })))
}

async fn request_loan(
    State(state): State<AppState>,
    session: SessionUser,
    Path(product_id): Path<i32>,
    headers: HeaderMap,
    Json(form): Json<LoanRequestForm>,
) -> Result<Response, ServiceError> {
    let request = form.into_loan_request()?;
    let record = state
        .services
        .recorder
        .request_loan(
            &session,
            product_id,
            &request,
            &RequestContext::from_headers(&headers),
        )
        .await?;

    Ok(Redirect::to(session.role.dashboard_path())
        .with_flash(Flash::success(format!(
            "Loan of {} registered for {} days.",
            record.product.name,
            request.duration.days()
        )))
        .secure(state.config.secure_cookies)
        .into_response())
}

async fn return_page(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
) -> ApiResult<ProductView> {
    let product = state.services.products.get(product_id).await?;
    Ok(Json(ApiResponse::success(product)))
}

async fn return_product(
    State(state): State<AppState>,
    session: SessionUser,
    Path(product_id): Path<i32>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let record = state
        .services
        .recorder
        .return_product(&session, product_id, &RequestContext::from_headers(&headers))
        .await?;

    Ok(Redirect::to(session.role.dashboard_path())
        .with_flash(Flash::success(format!(
            "Product {} returned.",
            record.product.name
        )))
        .secure(state.config.secure_cookies)
        .into_response())
}

async fn history(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
) -> ApiResult<ProductHistory> {
    let movements = state.services.products.history(product_id).await?;
    let product = state.services.products.get(product_id).await?;
    Ok(Json(ApiResponse::success(ProductHistory { product, movements })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/solicitar-producto/:id",
            get(loan_page).post(request_loan),
        )
        .route(
            "/devolver-producto/:id",
            get(return_page).post(return_product),
        )
        .route("/producto/:id/historial", get(history))
        .with_login()
}
