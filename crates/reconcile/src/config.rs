//! Reconciliation configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Store
//! - `CARBRIDGE_STORE` - `postgres` (default) or `memory`
//! - `CARBRIDGE_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`); required for the `postgres` store
//! - `CARBRIDGE_MEMORY_SEED` - Path to a JSON snapshot loaded by the `memory` store
//! - `STORE_TIMEOUT_MS` - Per-call timeout (default: 5000)
//! - `STORE_MAX_ATTEMPTS` - Attempts per call, including the first (default: 3)
//! - `STORE_RETRY_BACKOFF_MS` - Backoff before the first retry (default: 100)
//! - `RESOLVER_CONCURRENT_PROBES` - Probe candidate collections concurrently (default: false)
//!
//! ## Token verification
//! - `JWT_SECRET` - Current signing secret
//! - `JWT_PREVIOUS_SECRETS` - Comma-separated secrets still accepted after rotation
//! - `JWT_ACCEPT_LEGACY_SECRET` - Accept the inherited default secret (default: true)
//! - `JWT_LEEWAY_SECONDS` - Clock skew tolerance for `exp` (default: 60)

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::auth::SecretRing;
use crate::store::RetryPolicy;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_LEEWAY_SECONDS: u64 = 60;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Which document store backend to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store, optionally seeded from a JSON snapshot file.
    Memory { seed: Option<PathBuf> },
    /// JSONB documents table.
    Postgres,
}

/// Reconciliation layer configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Selected store backend
    pub backend: StoreBackend,
    /// `PostgreSQL` connection URL (contains password); required for `Postgres`
    pub database_url: Option<SecretString>,
    /// Timeout and retry settings for store calls
    pub retry: RetryPolicy,
    /// Whether the resolver probes collections concurrently
    pub concurrent_probes: bool,
    /// Token verification settings
    pub auth: AuthConfig,
}

/// Token verification configuration.
///
/// Implements `Debug` manually to redact the secrets.
#[derive(Clone)]
pub struct AuthConfig {
    /// Current signing secret
    pub current_secret: Option<SecretString>,
    /// Secrets retired by rotation but still accepted
    pub previous_secrets: Vec<SecretString>,
    /// Whether the inherited legacy secret is accepted last
    pub accept_legacy_secret: bool,
    /// Clock skew tolerance for expiry checks
    pub leeway: Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "current_secret",
                &self.current_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("previous_secrets", &self.previous_secrets.len())
            .field("accept_legacy_secret", &self.accept_legacy_secret)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl AuthConfig {
    /// Build the ordered secret ring: current, previous, then legacy.
    #[must_use]
    pub fn secret_ring(&self) -> SecretRing {
        SecretRing::new(
            self.current_secret.clone(),
            self.previous_secrets.clone(),
            self.accept_legacy_secret,
        )
    }
}

impl ReconcileConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is malformed, if the `postgres` store
    /// has no database URL, or if no signing secret at all would be accepted.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ReconcileConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("CARBRIDGE_STORE").as_deref().map(str::trim) {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory {
                seed: get("CARBRIDGE_MEMORY_SEED").map(PathBuf::from),
            },
            Some(other) => {
                return Err(ConfigError::InvalidEnvVar(
                    "CARBRIDGE_STORE".to_string(),
                    format!("expected 'memory' or 'postgres', got '{other}'"),
                ));
            }
        };

        let database_url = get("CARBRIDGE_DATABASE_URL")
            .or_else(|| get("DATABASE_URL"))
            .map(SecretString::from);
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "CARBRIDGE_DATABASE_URL".to_string(),
            ));
        }

        let retry = RetryPolicy {
            timeout: Duration::from_millis(parse_or(&get, "STORE_TIMEOUT_MS", 5000)?),
            max_attempts: parse_or(&get, "STORE_MAX_ATTEMPTS", 3)?,
            base_backoff: Duration::from_millis(parse_or(&get, "STORE_RETRY_BACKOFF_MS", 100)?),
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STORE_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let concurrent_probes = parse_bool_or(&get, "RESOLVER_CONCURRENT_PROBES", false)?;

        let auth = AuthConfig::from_lookup(&get)?;

        Ok(Self {
            backend,
            database_url,
            retry,
            concurrent_probes,
            auth,
        })
    }
}

impl AuthConfig {
    fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let current_secret = get("JWT_SECRET").map(|secret| {
            warn_if_weak(&secret, "JWT_SECRET");
            SecretString::from(secret)
        });

        let previous_secrets: Vec<SecretString> = get("JWT_PREVIOUS_SECRETS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        warn_if_weak(s, "JWT_PREVIOUS_SECRETS");
                        SecretString::from(s.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();

        let accept_legacy_secret = parse_bool_or(get, "JWT_ACCEPT_LEGACY_SECRET", true)?;
        let leeway = Duration::from_secs(parse_or(get, "JWT_LEEWAY_SECONDS", DEFAULT_LEEWAY_SECONDS)?);

        if current_secret.is_none() {
            if previous_secrets.is_empty() && !accept_legacy_secret {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
            }
            tracing::warn!("JWT_SECRET is not set; only fallback secrets will verify tokens");
        }

        Ok(Self {
            current_secret,
            previous_secrets,
            accept_legacy_secret,
            leeway,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

fn parse_bool_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

/// Signing secrets predate this service, so weak ones are reported rather
/// than refused.
fn warn_if_weak(secret: &str, var_name: &str) {
    if let Err(e) = validate_secret_strength(secret, var_name) {
        tracing::warn!("{var_name} validation warning: {e}");
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_memory_store() {
        let config = ReconcileConfig::from_lookup(lookup(&[("CARBRIDGE_STORE", "memory")])).unwrap();
        assert_eq!(config.backend, StoreBackend::Memory { seed: None });
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(!config.concurrent_probes);
        assert!(config.auth.accept_legacy_secret);
        assert_eq!(config.auth.leeway, Duration::from_secs(60));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = ReconcileConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "CARBRIDGE_DATABASE_URL"));

        let config =
            ReconcileConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/cb")]))
                .unwrap();
        assert_eq!(config.backend, StoreBackend::Postgres);
        assert!(config.database_url.is_some());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = ReconcileConfig::from_lookup(lookup(&[("CARBRIDGE_STORE", "mongo")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_retry_settings_parsed() {
        let config = ReconcileConfig::from_lookup(lookup(&[
            ("CARBRIDGE_STORE", "memory"),
            ("STORE_TIMEOUT_MS", "250"),
            ("STORE_MAX_ATTEMPTS", "5"),
            ("STORE_RETRY_BACKOFF_MS", "10"),
            ("RESOLVER_CONCURRENT_PROBES", "true"),
        ]))
        .unwrap();
        assert_eq!(config.retry.timeout, Duration::from_millis(250));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_backoff, Duration::from_millis(10));
        assert!(config.concurrent_probes);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = ReconcileConfig::from_lookup(lookup(&[
            ("CARBRIDGE_STORE", "memory"),
            ("STORE_MAX_ATTEMPTS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_previous_secrets_split_and_trimmed() {
        let config = ReconcileConfig::from_lookup(lookup(&[
            ("CARBRIDGE_STORE", "memory"),
            ("JWT_SECRET", "k9!Qz2@Lm4#Rt7$Vw1^Xy"),
            ("JWT_PREVIOUS_SECRETS", " first-old , ,second-old "),
        ]))
        .unwrap();
        assert_eq!(config.auth.previous_secrets.len(), 2);
    }

    #[test]
    fn test_no_secret_at_all_is_an_error() {
        let err = ReconcileConfig::from_lookup(lookup(&[
            ("CARBRIDGE_STORE", "memory"),
            ("JWT_ACCEPT_LEGACY_SECRET", "false"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "JWT_SECRET"));
    }

    #[test]
    fn test_bad_boolean_rejected() {
        let err = ReconcileConfig::from_lookup(lookup(&[
            ("CARBRIDGE_STORE", "memory"),
            ("JWT_ACCEPT_LEGACY_SECRET", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_auth_config_debug_redacts_secrets() {
        let config = AuthConfig {
            current_secret: Some(SecretString::from("super_secret_signing_key")),
            previous_secrets: vec![SecretString::from("older_signing_key")],
            accept_legacy_secret: true,
            leeway: Duration::from_secs(60),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_signing_key"));
        assert!(!debug_output.contains("older_signing_key"));
    }

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_validate_secret_strength() {
        assert!(validate_secret_strength("your-jwt-key-here", "JWT_SECRET").is_err());
        assert!(validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "JWT_SECRET").is_err());
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "JWT_SECRET").is_ok());
    }
}
