use axum::{
    extract::{Extension, Json, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{error, info, warn};

use client::backend::BackendError;
use common::{parse_address, DomainError};

use super::invites::InviteError;
use super::jwt::{Claims, SessionError, SESSION_COOKIE};
use super::server::ApiState;

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub code: String,
    pub user_address: String,
}

#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> (StatusCode, String) {
        if let Some(err) = self.0.downcast_ref::<InviteError>() {
            return (StatusCode::UNAUTHORIZED, err.to_string());
        }
        if let Some(err) = self.0.downcast_ref::<SessionError>() {
            return (StatusCode::UNAUTHORIZED, err.to_string());
        }
        if let Some(err) = self.0.downcast_ref::<DomainError>() {
            return (StatusCode::BAD_REQUEST, err.to_string());
        }
        match self.0.downcast_ref::<BackendError>() {
            Some(err @ BackendError::NotFound(_)) => (StatusCode::NOT_FOUND, err.to_string()),
            Some(BackendError::Domain(err)) => (StatusCode::BAD_REQUEST, err.to_string()),
            Some(_) => (StatusCode::BAD_GATEWAY, "Backend unavailable".to_string()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status();
        if status.is_server_error() {
            error!("API error: {:?}", self.0);
        } else {
            warn!("API error: {}", self.0);
        }

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .build()
}

fn no_store(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate, private"),
    );
    response.headers_mut().insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Checks an invite code and opens an anonymous session for it.
pub async fn validate_code(
    State(state): State<ApiState>,
    jar: CookieJar,
    Json(req): Json<CodeRequest>,
) -> Result<Response, AppError> {
    let code = normalize_code(&req.code);
    state.invites.validate(&code, None).await?;

    let claims = state.sessions.claims_for(&code, None);
    let token = state.sessions.issue(&claims)?;
    info!("Invite code validated: {}", code);

    Ok(no_store((jar.add(session_cookie(token)), Json(claims)).into_response()))
}

/// Consumes the invite code for a wallet address and redirects home.
pub async fn login(
    State(state): State<ApiState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let code = normalize_code(&req.code);
    parse_address(&req.user_address)?;
    state.invites.consume(&code, &req.user_address).await?;

    let claims = state.sessions.claims_for(&code, Some(&req.user_address));
    let token = state.sessions.issue(&claims)?;
    info!("User logged in: {}", req.user_address);

    Ok(no_store((jar.add(session_cookie(token)), Redirect::to("/")).into_response()))
}

pub async fn current_session(claims: Option<Extension<Claims>>) -> Result<Response, AppError> {
    let Extension(claims) = claims.ok_or(SessionError::Missing)?;
    let mut response = no_store(Json(claims).into_response());
    response.headers_mut().insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(response)
}

pub async fn logout(jar: CookieJar) -> Response {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT).into_response()
}
