#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::{self, Body},
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use inventory_tracker::{
    auth::{hash_password, SESSION_COOKIE},
    config::AppConfig,
    db,
    entities::{product, state, user, Role},
    flash::Flash,
    AppState,
};

pub const PASSWORD: &str = "secret1";

/// Application backed by a throwaway SQLite file, driven through `oneshot`.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("inventory_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        state
            .services
            .states
            .ensure_defaults()
            .await
            .expect("seed lifecycle states");

        let router = inventory_tracker::app_router(state.clone());
        Self {
            router,
            state,
            _dir: dir,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> Response {
        self.request_with_headers(method, uri, body, cookie, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
        extra: &[(&str, &str)],
    ) -> Response {
        self.send(build_request(method, uri, body, cookie, extra)).await
    }

    /// Same as [`TestApp::request_with_headers`], arriving from the TCP peer `peer`.
    pub async fn request_from(
        &self,
        peer: SocketAddr,
        method: Method,
        uri: &str,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> Response {
        let mut request = build_request(method, uri, body, None, extra);
        request.extensions_mut().insert(ConnectInfo(peer));
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> Response {
        self.request(Method::GET, uri, None, Some(cookie)).await
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: &str) -> Response {
        self.request(Method::POST, uri, Some(body), Some(cookie)).await
    }

    /// Inserts an active account with [`PASSWORD`].
    pub async fn create_user(&self, username: &str, role: Role) -> user::Model {
        user::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(hash_password(PASSWORD).expect("hash")),
            role: Set(role),
            active: Set(true),
            registered_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("insert user")
    }

    /// Logs in through `/login` and returns the `Cookie` header value for the session.
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/login",
                Some(serde_json::json!({ "username": username, "password": PASSWORD })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "login should redirect");
        let token = set_cookie(&response, SESSION_COOKIE).expect("session cookie");
        format!("{}={}", SESSION_COOKIE, token)
    }

    /// Creates an account with `role` and returns its session cookie.
    pub async fn signed_in(&self, username: &str, role: Role) -> (user::Model, String) {
        let account = self.create_user(username, role).await;
        let cookie = self.login(username).await;
        (account, cookie)
    }

    pub async fn state_id(&self, name: &str) -> i32 {
        state::Entity::find()
            .filter(state::Column::Name.eq(name))
            .one(&*self.state.db)
            .await
            .expect("query state")
            .expect("state seeded")
            .id
    }

    pub async fn create_product(&self, name: &str, state_name: &str) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            name: Set(name.to_string()),
            description: Set(None),
            code: Set(None),
            state_id: Set(self.state_id(state_name).await),
            assigned_user_id: Set(None),
            assigned_at: Set(None),
            due_at: Set(None),
            returned_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("insert product")
    }

    pub async fn product(&self, id: i32) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
    }
}

fn build_request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    cookie: Option<&str>,
    extra: &[(&str, &str)],
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    for (name, value) in extra {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

/// Value of the cookie `name` set by `response`, if any.
pub fn set_cookie(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find_map(|pair| pair.strip_prefix(&prefix).map(str::to_string))
}

/// Flash carried by a redirect.
pub fn flash_of(response: &Response) -> Option<Flash> {
    let raw = set_cookie(response, inventory_tracker::flash::FLASH_COOKIE)?;
    let mut headers = HeaderMap::new();
    let cookie = HeaderValue::from_str(&format!("{}={}", inventory_tracker::flash::FLASH_COOKIE, raw)).ok()?;
    headers.insert(header::COOKIE, cookie);
    Flash::from_headers(&headers)
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes")
        .to_vec()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("json response")
}
