//! # Dialer Gateway Crate
//!
//! HTTP surface of the appointment module: calendar settings with
//! hyperlinked references, and the event controller with its status and
//! child-listing actions.
//!
//! - **REST**: axum handlers with OpenAPI documentation
//! - **State**: repositories, authenticator and API options shared by handlers
//! - **Middleware**: caller extraction, CORS, request logging
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dialer_gateway::{create_router, AppState};
//!
//! # async fn run(config: dialer_config::AppConfig) -> anyhow::Result<()> {
//! let state = AppState::from_config(&config).await?;
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod hyperlink;
pub mod middleware;
pub mod pagination;
pub mod references;
pub mod rest;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use middleware::Caller;
pub use state::AppState;

use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        rest::health::health_check,
        rest::auth::login,
        rest::auth::logout,
        rest::calendar_setting::list_calendar_settings,
        rest::calendar_setting::create_calendar_setting,
        rest::calendar_setting::calendar_setting_choices,
        rest::calendar_setting::get_calendar_setting,
        rest::calendar_setting::update_calendar_setting,
        rest::calendar_setting::partial_update_calendar_setting,
        rest::calendar_setting::delete_calendar_setting,
        rest::event::list_events,
        rest::event::get_event,
        rest::event::update_event,
        rest::event::partial_update_event,
        rest::event::delete_event,
        rest::event::update_event_status,
        rest::event::get_list_child,
    ),
    components(
        schemas(
            error::ErrorResponse,
            rest::health::HealthResponse,
            rest::auth::LoginRequest,
            rest::auth::SessionResponse,
            rest::auth::SessionUser,
            rest::calendar_setting::CalendarSettingResponse,
            rest::calendar_setting::CalendarSettingPayload,
            rest::calendar_setting::CalendarSettingChoices,
            references::Choice,
            rest::event::EventResponse,
            rest::event::EventPayload,
            rest::event::ChildEvent,
            rest::event::StatusUpdateRequest,
            rest::event::StatusMessage,
            pagination::CalendarSettingPage,
            pagination::EventPage,
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Session login and logout"),
        (name = "Calendar settings", description = "Outbound call settings of calendar users"),
        (name = "Events", description = "Appointments of administered calendar users"),
    )
)]
pub struct ApiDoc;

/// Create the main application router with all routes
pub fn create_router(state: AppState) -> Router {
    let routes = Router::new()
        .merge(rest::create_rest_routes())
        .with_state(state);

    let mut router = routes
        .clone()
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true),
        )
        .layer(axum_middleware::from_fn_with_state(
            routes,
            middleware::route_plain_options,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(middleware::create_trace_layer());

    // Interactive docs in debug builds only
    #[cfg(debug_assertions)]
    {
        use utoipa_swagger_ui::SwaggerUi;

        router = router
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
}
