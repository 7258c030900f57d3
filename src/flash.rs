//! One-shot user-visible messages carried across a redirect in a `flash` cookie.

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::cookies::{build_cookie, expire_cookie, read_cookie, CookieOptions};

pub const FLASH_COOKIE: &str = "flash";
const FLASH_MAX_AGE_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Warning, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Danger, message)
    }

    fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("level", &self.level.to_string())
            .append_pair("message", &self.message)
            .finish()
    }

    fn decode(raw: &str) -> Option<Self> {
        let mut level = None;
        let mut message = None;
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "level" => level = value.parse::<FlashLevel>().ok(),
                "message" => message = Some(value.into_owned()),
                _ => {}
            }
        }
        Some(Self::new(level?, message?))
    }

    /// Reads the pending flash, if any.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        read_cookie(headers, FLASH_COOKIE).and_then(|raw| Self::decode(&raw))
    }
}

/// `303 See Other` to `location`, optionally carrying a flash and extra cookies.
#[derive(Debug)]
pub struct Redirect {
    location: String,
    flash: Option<Flash>,
    cookies: Vec<axum::http::HeaderValue>,
    options: CookieOptions,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            flash: None,
            cookies: Vec::new(),
            options: CookieOptions { secure: false },
        }
    }

    pub fn with_flash(mut self, flash: Flash) -> Self {
        self.flash = Some(flash);
        self
    }

    pub fn with_cookie(mut self, cookie: Option<axum::http::HeaderValue>) -> Self {
        self.cookies.extend(cookie);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.options.secure = secure;
        self
    }
}

impl IntoResponse for Redirect {
    fn into_response(self) -> Response {
        let mut response = StatusCode::SEE_OTHER.into_response();
        let headers = response.headers_mut();
        if let Ok(location) = axum::http::HeaderValue::from_str(&self.location) {
            headers.insert(header::LOCATION, location);
        }
        if let Some(flash) = self.flash {
            if let Some(cookie) = build_cookie(
                FLASH_COOKIE,
                &flash.encode(),
                Some(FLASH_MAX_AGE_SECS),
                self.options,
            ) {
                headers.append(header::SET_COOKIE, cookie);
            }
        }
        for cookie in self.cookies {
            headers.append(header::SET_COOKIE, cookie);
        }
        response
    }
}

/// Attaches `flash` to a JSON response body and clears the cookie.
pub fn consume(headers: &HeaderMap, response: &mut Response, secure: bool) -> Option<Flash> {
    let flash = Flash::from_headers(headers)?;
    if let Some(cookie) = expire_cookie(FLASH_COOKIE, CookieOptions { secure }) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Some(flash)
}
