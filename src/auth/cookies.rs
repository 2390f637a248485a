use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};

pub const AUTH_COOKIE: &str = "auth-token";
pub const CONFIG_ACCESS_COOKIE: &str = "config-access";
/// Cookie set by the external OAuth session library
pub const OAUTH_SESSION_COOKIE: &str = "next-auth.session-token";
pub const SECURE_OAUTH_SESSION_COOKIE: &str = "__Secure-next-auth.session-token";

/// Find a cookie value across every `Cookie` header of the request
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for an HTTP-only cookie scoped to `path`
pub fn build_cookie(name: &str, value: &str, path: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite=Lax",
        name,
        value,
        path,
        max_age_secs.max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Expire a cookie immediately
pub fn clear_cookie(name: &str, path: &str, secure: bool) -> String {
    build_cookie(name, "", path, 0, secure)
}

/// Append a `Set-Cookie` header; values with invalid header bytes are skipped
pub fn append_set_cookie(headers: &mut HeaderMap, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!("Refusing to set malformed cookie: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; auth-token=abc.def.ghi; other=1"));
        headers.append(COOKIE, HeaderValue::from_static("config-access=\"xyz\""));

        assert_eq!(read_cookie(&headers, AUTH_COOKIE), Some("abc.def.ghi"));
        assert_eq!(read_cookie(&headers, CONFIG_ACCESS_COOKIE), Some("xyz"));
        assert_eq!(read_cookie(&headers, "missing"), None);
        // prefix of another name must not match
        assert_eq!(read_cookie(&headers, "auth"), None);
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("auth-token="));
        assert_eq!(read_cookie(&headers, AUTH_COOKIE), None);
    }

    #[test]
    fn test_build_and_clear_cookie() {
        assert_eq!(
            build_cookie(AUTH_COOKIE, "tok", "/", 3600, true),
            "auth-token=tok; Path=/; Max-Age=3600; HttpOnly; SameSite=Lax; Secure"
        );
        assert_eq!(
            clear_cookie(CONFIG_ACCESS_COOKIE, "/api/admin", false),
            "config-access=; Path=/api/admin; Max-Age=0; HttpOnly; SameSite=Lax"
        );
    }
}
