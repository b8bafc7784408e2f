use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "dialer.toml",
    "config/dialer.toml",
    "crates/config/dialer.toml",
    "../dialer.toml",
    "../config/dialer.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub features: FeatureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://dialer.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
        }
    }
}

impl AuthConfig {
    const fn default_session_ttl() -> u64 {
        86_400
    }
}

/// Options for the REST surface.
///
/// ```
/// use dialer_config::ApiConfig;
///
/// let api = ApiConfig::default();
/// assert_eq!(api.public_base_url, "http://127.0.0.1:8000");
/// assert_eq!(api.page_size, 10);
/// assert!(!api.strict_references);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Used to build hyperlinks when a request carries no `Host` header.
    #[serde(default = "ApiConfig::default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "ApiConfig::default_page_size")]
    pub page_size: u32,
    /// Reject unresolvable bare reference ids instead of clearing them.
    #[serde(default)]
    pub strict_references: bool,
}

impl ApiConfig {
    fn default_public_base_url() -> String {
        "http://127.0.0.1:8000".to_string()
    }

    const fn default_page_size() -> u32 {
        10
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            public_base_url: Self::default_public_base_url(),
            page_size: Self::default_page_size(),
            strict_references: false,
        }
    }
}

/// Global feature switches.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeatureConfig {
    /// Answering machine detection; enables voicemail audio file references.
    #[serde(default)]
    pub amd: bool,
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use dialer_config::load;
///
/// std::env::remove_var("DIALER_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let session_ttl = i64::try_from(defaults.auth.session_ttl_seconds).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.session_ttl_seconds", session_ttl)?
        .set_default("api.public_base_url", defaults.api.public_base_url.clone())?
        .set_default("api.page_size", i64::from(defaults.api.page_size))?
        .set_default("api.strict_references", defaults.api.strict_references)?
        .set_default("features.amd", defaults.features.amd)?;

    let environment_overrides = config::Environment::with_prefix("DIALER").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("DIALER_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via DIALER_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    if config.api.page_size == 0 {
        anyhow::bail!("invalid configuration: api.page_size must be positive");
    }

    debug!(?config, "loaded dialer configuration");
    Ok(config)
}
