//! Engine configuration, loaded from the environment or built in code
use super::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// How strictly seller-directed status changes are checked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicy {
    /// pending -> processing -> shipped -> delivered, cancellation before shipping.
    #[default]
    Strict,
    /// Any status may be set from any status.
    Permissive,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    pub lock_timeout: Duration,
    pub status_policy: StatusPolicy,
    pub flush_on_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("craftly.db"),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            status_policy: StatusPolicy::default(),
            flush_on_commit: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `CRAFTLY_*` variables, loading a `.env` file first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        tracing::debug!(?config, "engine configuration loaded");
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("CRAFTLY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("CRAFTLY_LOCK_TIMEOUT_MS") {
            let millis = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "CRAFTLY_LOCK_TIMEOUT_MS",
                    value: value.clone(),
                })?;
            config.lock_timeout = Duration::from_millis(millis);
        }
        if let Some(value) = lookup("CRAFTLY_STATUS_POLICY") {
            config.status_policy = match value.trim().to_ascii_lowercase().as_str() {
                "strict" => StatusPolicy::Strict,
                "permissive" => StatusPolicy::Permissive,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "CRAFTLY_STATUS_POLICY",
                        value,
                    });
                }
            };
        }
        if let Some(value) = lookup("CRAFTLY_FLUSH_ON_COMMIT") {
            config.flush_on_commit =
                value
                    .trim()
                    .parse::<bool>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "CRAFTLY_FLUSH_ON_COMMIT",
                        value: value.clone(),
                    })?;
        }

        Ok(config)
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }
    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }
}
