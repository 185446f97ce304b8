use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, info, warn};

use super::auth::session_cookie;
use super::jwt::{Claims, SESSION_COOKIE};
use super::server::ApiState;

pub const LOGIN_PATH: &str = "/login";
/// Raw cartridge bytes are served to emulators on other origins without a session.
pub const CARTRIDGE_BYTES_PREFIX: &str = "/cartridges/";

/// Verifies the session cookie, exposes its claims to handlers and re-issues
/// it with an extended expiry.
pub async fn refresh_session(
    State(state): State<ApiState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = jar.get(SESSION_COOKIE).and_then(|cookie| {
        match state.sessions.verify(cookie.value()) {
            Ok(claims) => Some(claims),
            Err(err) => {
                debug!("Ignoring session cookie: {}", err);
                None
            }
        }
    });
    if let Some(claims) = &claims {
        request.extensions_mut().insert(claims.clone());
    }

    let mut response = next.run(request).await;

    // Handlers that set or clear the cookie themselves win.
    let Some(claims) = claims else {
        return response;
    };
    if sets_session_cookie(&response) {
        return response;
    }
    let cookie = match state.sessions.refresh(&claims) {
        Ok((_, token)) => session_cookie(token),
        Err(err) => {
            warn!("Failed to refresh session: {:?}", err);
            return response;
        }
    };
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(err) => warn!("Refreshed session cookie is not a valid header: {}", err),
    }
    response
}

fn sets_session_cookie(response: &Response) -> bool {
    let prefix = format!("{}=", SESSION_COOKIE);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&prefix))
}

/// Redirects requests to protected paths to the login page unless the
/// session middleware found a valid session. CORS preflights pass through.
pub async fn require_session(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if request.method() != Method::OPTIONS
        && is_protected(&state.protected_paths, path)
        && request.extensions().get::<Claims>().is_none()
    {
        info!("No session for {}, redirecting to {}", path, LOGIN_PATH);
        return Redirect::temporary(LOGIN_PATH).into_response();
    }
    next.run(request).await
}

/// Prefix match on whole path segments. The login page, the auth API and
/// `/cartridges/:id` are always reachable.
pub fn is_protected(prefixes: &[String], path: &str) -> bool {
    if path == LOGIN_PATH || path.starts_with("/login/") || path.starts_with("/api/auth/") {
        return false;
    }
    if is_cartridge_bytes(path) {
        return false;
    }
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn is_cartridge_bytes(path: &str) -> bool {
    path.strip_prefix(CARTRIDGE_BYTES_PREFIX)
        .is_some_and(|id| !id.is_empty() && !id.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        vec!["/play".to_string(), "/cartridges/".to_string(), "/tapes".to_string()]
    }

    #[test]
    fn protects_whole_segments() {
        assert!(is_protected(&prefixes(), "/play"));
        assert!(is_protected(&prefixes(), "/play/abc"));
        assert!(is_protected(&prefixes(), "/tapes/abcd"));
        assert!(is_protected(&prefixes(), "/cartridges"));
        assert!(!is_protected(&prefixes(), "/playground"));
        assert!(!is_protected(&prefixes(), "/"));
    }

    #[test]
    fn cartridge_bytes_are_public() {
        assert!(!is_protected(&prefixes(), "/cartridges/abcd"));
        assert!(is_protected(&prefixes(), "/cartridges/abcd/rules"));
        assert!(is_protected(&prefixes(), "/cartridges/"));
        let everything = vec!["/".to_string()];
        assert!(!is_protected(&everything, "/cartridges/0xabcd"));
    }

    #[test]
    fn login_and_auth_are_public() {
        let everything = vec!["/".to_string()];
        assert!(is_protected(&everything, "/contests"));
        assert!(!is_protected(&everything, "/login"));
        assert!(!is_protected(&everything, "/api/auth/code"));
    }
}
