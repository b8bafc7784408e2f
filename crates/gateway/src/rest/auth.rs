//! Session login and logout

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{Caller, SESSION_COOKIE};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
}

/// Create authentication routes
pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/rest-api/auth/login/", post(login))
        .route("/rest-api/auth/logout/", post(logout))
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

#[utoipa::path(
    post,
    path = "/rest-api/auth/login/",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened; the token is also set as the sessionid cookie", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    let Json(payload) = payload?;

    let session = state
        .authenticator
        .login_with_password(&payload.username, &payload.password)
        .await?;
    let user = state
        .users
        .find_by_id(session.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

    let jar = jar.add(session_cookie(session.token.clone()));
    let response = SessionResponse {
        token: session.token,
        expires_at: session.expires_at,
        user: SessionUser {
            id: user.id,
            username: user.username,
            is_superuser: user.is_superuser,
        },
    };

    Ok((jar, Json(response)))
}

#[utoipa::path(
    post,
    path = "/rest-api/auth/logout/",
    tag = "Auth",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "No session presented", body = ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    caller: Caller,
    jar: CookieJar,
) -> ApiResult<(CookieJar, StatusCode)> {
    let token = caller
        .session_token()
        .ok_or_else(|| ApiError::unauthorized("no session to log out of"))?;

    state.authenticator.revoke_session(token).await?;
    if let Some(user) = caller.user() {
        info!(user_id = user.id, "user logged out");
    }

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    Ok((jar, StatusCode::NO_CONTENT))
}
