/*!
 * # Authentication and Authorization Module
 *
 * Sessions are signed HS256 tokens carried in the `session` cookie (or an
 * `Authorization: Bearer` header). Every guarded request reloads the account
 * so deactivation and role changes apply immediately.
 *
 * Route groups are gated with [`AuthRouterExt`]: a missing session redirects
 * to `/login`, a disallowed role redirects to `/`, both with a flash message.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::cookies::{build_cookie, expire_cookie, read_cookie, CookieOptions};
use crate::entities::{user, Role};
use crate::errors::ServiceError;
use crate::flash::{Flash, Redirect};
use crate::forms::Credentials;

pub mod password;

pub use password::{hash_password, verify_password};

pub const SESSION_COOKIE: &str = "session";
pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to access this page.";
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to access this page.";

/// Claim structure for session tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// The signed-in account, as reloaded for the current request
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: i32,
    pub username: String,
    pub role: Role,
    #[serde(skip)]
    pub token_id: String,
}

impl SessionUser {
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub session_ttl: Duration,
    pub secure_cookies: bool,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            secret: cfg.session_secret.clone(),
            issuer: cfg.session_issuer.clone(),
            audience: format!("{}-session", cfg.session_issuer),
            session_ttl: Duration::from_secs(cfg.session_ttl_secs),
            secure_cookies: cfg.secure_cookies,
        }
    }
}

#[derive(Clone, Debug)]
struct BlacklistedToken {
    jti: String,
    expiry: DateTime<Utc>,
}

/// Issues, validates and revokes session tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    db: Arc<DatabaseConnection>,
    blacklisted_tokens: Arc<RwLock<Vec<BlacklistedToken>>>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self {
            config,
            db,
            blacklisted_tokens: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.config.secure_cookies,
        }
    }

    /// Checks `credentials` against the stored hash.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<user::Model, ServiceError> {
        let account = user::Entity::find()
            .filter(user::Column::Username.eq(credentials.username.as_str()))
            .one(&*self.db)
            .await?;

        match account {
            Some(account) if account.active && verify_password(&credentials.password, &account.password_hash) => {
                Ok(account)
            }
            Some(account) if !account.active => {
                debug!(user_id = account.id, "login attempt for inactive account");
                Err(ServiceError::InvalidCredentials)
            }
            _ => Err(ServiceError::InvalidCredentials),
        }
    }

    pub fn issue_token(&self, account: &user::Model) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.session_ttl)
                .map_err(|_| AuthError::InternalError("Invalid session duration".to_string()))?;

        let claims = Claims {
            sub: account.id.to_string(),
            username: account.username.clone(),
            role: account.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if self.is_token_blacklisted(&claims.jti).await {
            return Err(AuthError::RevokedToken);
        }

        Ok(claims)
    }

    /// Adds the token to the revocation list until it would have expired anyway.
    pub async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.validate_token(token).await?;
        let expiry = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);

        let mut blacklist = self.blacklisted_tokens.write().await;
        blacklist.push(BlacklistedToken {
            jti: claims.jti,
            expiry,
        });
        let now = Utc::now();
        blacklist.retain(|t| t.expiry > now);
        Ok(())
    }

    async fn is_token_blacklisted(&self, token_id: &str) -> bool {
        let blacklist = self.blacklisted_tokens.read().await;
        blacklist.iter().any(|t| t.jti == token_id)
    }

    /// Resolves the session carried by `headers` against the current account row.
    pub async fn resolve_session(&self, headers: &HeaderMap) -> Result<SessionUser, AuthError> {
        let token = extract_token(headers).ok_or(AuthError::MissingAuth)?;
        let claims = self.validate_token(&token).await?;
        let user_id: i32 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;

        let account = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)?;

        if !account.active {
            return Err(AuthError::UserInactive);
        }

        Ok(SessionUser {
            id: account.id,
            username: account.username,
            role: account.role,
            token_id: claims.jti,
        })
    }

    pub fn session_cookie(&self, token: &str) -> Option<HeaderValue> {
        build_cookie(
            SESSION_COOKIE,
            token,
            Some(self.config.session_ttl.as_secs()),
            self.cookie_options(),
        )
    }

    pub fn clear_session_cookie(&self) -> Option<HeaderValue> {
        expire_cookie(SESSION_COOKIE, self.cookie_options())
    }

    fn login_redirect(&self, clear_cookie: bool) -> Response {
        let mut redirect = Redirect::to("/login")
            .with_flash(Flash::info(LOGIN_REQUIRED_MESSAGE))
            .secure(self.config.secure_cookies);
        if clear_cookie {
            redirect = redirect.with_cookie(self.clear_session_cookie());
        }
        redirect.into_response()
    }
}

/// Session token from the cookie, falling back to a bearer header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = read_cookie(headers, SESSION_COOKIE).filter(|t| !t.is_empty()) {
        return Some(token);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("User is inactive")]
    UserInactive,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_)
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Session has expired".to_string(),
            ),
            Self::RevokedToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REVOKED_TOKEN",
                "Session has been closed".to_string(),
            ),
            Self::UserNotFound | Self::UserInactive => (
                StatusCode::UNAUTHORIZED,
                "AUTH_ACCOUNT_UNAVAILABLE",
                "Account is no longer available".to_string(),
            ),
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => {
                warn!(error = %self, "authentication failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AUTH_INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<SessionUser>().cloned().ok_or_else(|| {
            Redirect::to("/login")
                .with_flash(Flash::info(LOGIN_REQUIRED_MESSAGE))
                .into_response()
        })
    }
}

/// Allow-list checked by [`session_guard`]; `None` admits any signed-in role.
#[derive(Clone, Debug)]
pub struct RoleGuard {
    allowed: Option<Arc<[Role]>>,
}

impl RoleGuard {
    pub fn any() -> Self {
        Self { allowed: None }
    }

    pub fn roles(roles: &[Role]) -> Self {
        Self {
            allowed: Some(Arc::from(roles)),
        }
    }

    pub fn admits(&self, role: Role) -> bool {
        self.allowed
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&role))
    }
}

/// Resolves the session and checks the role before the handler runs.
pub async fn session_guard(
    State(guard): State<RoleGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("Authentication service not available".to_string())
                .into_response();
        }
    };

    let session = match request.extensions().get::<SessionUser>() {
        Some(user) => user.clone(),
        None => match auth.resolve_session(request.headers()).await {
            Ok(user) => user,
            Err(e) if e.is_internal() => return e.into_response(),
            Err(e) => {
                debug!(reason = %e, path = %request.uri().path(), "no usable session");
                return auth.login_redirect(!matches!(e, AuthError::MissingAuth));
            }
        },
    };

    if !guard.admits(session.role) {
        debug!(
            user_id = session.id,
            role = %session.role,
            path = %request.uri().path(),
            "role not allowed for route"
        );
        return Redirect::to("/")
            .with_flash(Flash::danger(FORBIDDEN_MESSAGE))
            .secure(auth.config.secure_cookies)
            .into_response();
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Extension methods for Router to gate route groups
pub trait AuthRouterExt {
    fn with_login(self) -> Self;
    fn with_roles(self, roles: &[Role]) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_login(self) -> Self {
        self.route_layer(axum::middleware::from_fn_with_state(
            RoleGuard::any(),
            session_guard,
        ))
    }

    fn with_roles(self, roles: &[Role]) -> Self {
        self.route_layer(axum::middleware::from_fn_with_state(
            RoleGuard::roles(roles),
            session_guard,
        ))
    }
}
