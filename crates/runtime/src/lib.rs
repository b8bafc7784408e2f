use anyhow::{Context, Result};
use dialer_auth::Authenticator;
use dialer_config::AppConfig;
use dialer_database::initialize_database;
use dialer_gateway::AppState;
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything the server and the CLI commands need, built from one config
#[derive(Clone)]
pub struct DialerServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub state: AppState,
}

impl DialerServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database).await?;

        let state = AppState::new(db_pool.clone(), config);
        let authenticator = state.authenticator.clone();

        let purged = authenticator
            .purge_expired_sessions()
            .await
            .context("failed to purge expired sessions")?;
        if purged > 0 {
            info!(purged, "expired sessions removed");
        }

        info!(
            amd = config.features.amd,
            strict_references = config.api.strict_references,
            "dialer services ready"
        );

        Ok(Self {
            db_pool,
            authenticator,
            state,
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
