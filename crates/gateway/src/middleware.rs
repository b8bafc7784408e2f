//! Caller authentication and request logging

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Method},
    middleware::Next,
    response::Response,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use dialer_database::{User, Visibility};
use tower::ServiceExt;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, Level};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "sessionid";

/// Who is making the request.
///
/// Requests without credentials are anonymous; credentials that are present
/// but invalid reject the request with 401.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    User {
        user: User,
        /// Set when the caller authenticated with a session token
        session_token: Option<String>,
    },
}

impl Caller {
    pub fn user(&self) -> Option<&User> {
        match self {
            Caller::Anonymous => None,
            Caller::User { user, .. } => Some(user),
        }
    }

    /// The authenticated user, or 401 for anonymous callers
    pub fn require_user(&self) -> ApiResult<&User> {
        self.user().ok_or_else(ApiError::authentication_required)
    }

    pub fn visibility(&self) -> Visibility {
        match self.user() {
            None => Visibility::Nobody,
            Some(user) if user.is_superuser => Visibility::All,
            Some(user) => Visibility::User(user.id),
        }
    }

    pub fn session_token(&self) -> Option<&str> {
        match self {
            Caller::User { session_token, .. } => session_token.as_deref(),
            Caller::Anonymous => None,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
            let value = value
                .to_str()
                .map_err(|_| ApiError::unauthorized("malformed authorization header"))?;
            let (scheme, credentials) = value.split_once(' ').unwrap_or((value, ""));

            return if scheme.eq_ignore_ascii_case("basic") {
                let user = state.authenticator.authenticate_basic(credentials).await?;
                debug!(user_id = user.id, "authenticated with basic credentials");
                Ok(Caller::User {
                    user,
                    session_token: None,
                })
            } else if scheme.eq_ignore_ascii_case("bearer") {
                let token = credentials.trim();
                let (user, _) = state.authenticator.authenticate_token(token).await?;
                Ok(Caller::User {
                    user,
                    session_token: Some(token.to_string()),
                })
            } else {
                Err(ApiError::unauthorized("unsupported authorization scheme"))
            };
        }

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            let token = cookie.value().to_string();
            let (user, _) = state.authenticator.authenticate_token(&token).await?;
            return Ok(Caller::User {
                user,
                session_token: Some(token),
            });
        }

        Ok(Caller::Anonymous)
    }
}

/// HTTP tracing layer with spans at info level
pub fn create_trace_layer() -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
}

/// Logs one line per completed request
/// Send `OPTIONS` requests that are not CORS preflights straight to the
/// routes, which answer them with the writable field choices.
pub async fn route_plain_options(
    State(routes): State<Router>,
    request: Request,
    next: Next,
) -> Response {
    let is_preflight = request
        .headers()
        .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
    if request.method() != Method::OPTIONS || is_preflight {
        return next.run(request).await;
    }

    match routes.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
