//! Shared application state for the gateway

use std::sync::Arc;

use dialer_auth::Authenticator;
use dialer_config::{ApiConfig, AppConfig, FeatureConfig};
use dialer_database::{
    CalendarSettingRepository, DatabaseResult, EventRepository, ReferenceRepository,
    UserRepository,
};
use sqlx::SqlitePool;

/// Handles shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub authenticator: Authenticator,
    pub calendar_settings: CalendarSettingRepository,
    pub events: EventRepository,
    pub references: ReferenceRepository,
    pub users: UserRepository,
    pub api: Arc<ApiConfig>,
    pub features: Arc<FeatureConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        Self {
            authenticator: Authenticator::new(pool.clone(), config.auth.clone()),
            calendar_settings: CalendarSettingRepository::new(pool.clone()),
            events: EventRepository::new(pool.clone()),
            references: ReferenceRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            api: Arc::new(config.api.clone()),
            features: Arc::new(config.features.clone()),
            pool,
        }
    }

    /// Connect, migrate and build the state in one go
    pub async fn from_config(config: &AppConfig) -> DatabaseResult<Self> {
        let pool = dialer_database::initialize_database(&config.database).await?;
        Ok(Self::new(pool, config))
    }

    /// Page size used by list endpoints
    pub fn page_size(&self) -> u32 {
        self.api.page_size.max(1)
    }
}
