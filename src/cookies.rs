use axum::http::{header, HeaderMap, HeaderValue};

/// Attributes shared by every cookie the service sets.
#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub secure: bool,
}

/// Value of the first cookie called `name` in the `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

/// `Set-Cookie` value for an HttpOnly, path-wide cookie.
pub fn build_cookie(
    name: &str,
    value: &str,
    max_age_secs: Option<u64>,
    options: CookieOptions,
) -> Option<HeaderValue> {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, value);
    if let Some(max_age) = max_age_secs {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// `Set-Cookie` value that expires `name` immediately.
pub fn expire_cookie(name: &str, options: CookieOptions) -> Option<HeaderValue> {
    build_cookie(name, "", Some(0), options)
}
