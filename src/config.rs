use std::env;
use std::time::Duration;

/// AppConfig
///
/// The application's configuration, immutable once loaded and shared through
/// the application state via FromRef.
#[derive(Clone)]
pub struct AppConfig {
    /// Base URL of the hosted data/auth backend.
    pub backend_url: String,
    /// The anon (publishable) key that initializes the backend client. This
    /// is the one required secret; see `is_degraded`.
    pub anon_key: String,
    /// Runtime environment marker. Controls log formatting.
    pub env: Env,
    /// Safety timeout for session settling and role resolution, in seconds.
    /// On expiry the gate fails closed to a denial.
    pub resolve_timeout_secs: u64,
}

/// Env
///
/// Runtime context, switching between development conveniences (pretty logs)
/// and production output (JSON logs for aggregation).
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking values for test state scaffolding.
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:54321".to_string(),
            anon_key: "test-anon-key".to_string(),
            env: Env::Local,
            resolve_timeout_secs: 5,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads configuration from environment variables at startup.
    ///
    /// Unlike most secrets, a missing `BACKEND_ANON_KEY` does **not** prevent
    /// boot: the application starts degraded (every backend call will fail,
    /// all of which fail closed to unauthenticated/empty states). The caller
    /// logs the condition via `is_degraded` once logging is up.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let backend_url =
            env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:54321".to_string());
        let anon_key = env::var("BACKEND_ANON_KEY").unwrap_or_default();

        let resolve_timeout_secs = env::var("RESOLVE_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(5);

        Self {
            backend_url,
            anon_key,
            env,
            resolve_timeout_secs,
        }
    }

    /// True when the backend anon key is absent and every backend call is
    /// expected to fail.
    pub fn is_degraded(&self) -> bool {
        self.anon_key.is_empty()
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable_and_not_degraded() {
        let config = AppConfig::default();
        assert_eq!(config.env, Env::Local);
        assert!(!config.is_degraded());
        assert_eq!(config.resolve_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn empty_anon_key_marks_the_config_degraded() {
        let config = AppConfig {
            anon_key: String::new(),
            ..AppConfig::default()
        };
        assert!(config.is_degraded());
    }
}
