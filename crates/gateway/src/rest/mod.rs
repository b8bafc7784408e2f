//! REST API endpoints for the gateway

pub mod auth;
pub mod calendar_setting;
pub mod event;
pub mod health;

use axum::{routing::get, Router};
use serde::{Deserialize, Deserializer};

use crate::state::AppState;

/// Create all REST API routes
pub fn create_rest_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(auth::create_auth_routes())
        .merge(calendar_setting::create_calendar_setting_routes())
        .merge(event::create_event_routes())
}

/// How a write treats fields missing from the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Create,
    /// PUT
    Replace,
    /// PATCH: absent fields are left untouched
    Partial,
}

impl WriteMode {
    pub(crate) fn requires_all(self) -> bool {
        !matches!(self, WriteMode::Partial)
    }
}

/// Keeps an explicit `null` apart from an absent field: absent is `None`,
/// `null` is `Some(None)`. Use together with `#[serde(default)]`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
