use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "soc2-extract";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_MODEL_ID: &str = "global.anthropic.claude-haiku-4-5-20251001-v1:0";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Upper bound between sweeps of expired cache entries.
pub const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} is not a valid value: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{name} out of range: {detail}")]
    OutOfRange { name: &'static str, detail: String },

    #[error("AWS_ACCESS_KEY and AWS_SECRET must be set together")]
    IncompleteCredentials,
}

/// Explicit credential pair for the model endpoint. When absent the
/// default provider chain (profile, instance role, ...) is used.
#[derive(Clone, PartialEq)]
pub struct CredentialPair {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub region: String,
    pub model_id: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub batch_size: u32,
    pub max_passes: u32,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub pass_delay: Duration,
    pub report_dir: PathBuf,
    pub cache_max_entries: usize,
    pub cache_ttl: Duration,
    pub log_level: String,
    pub log_model_full: bool,
    pub log_model_max_chars: usize,
    pub credentials: Option<CredentialPair>,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.into(),
            model_id: DEFAULT_MODEL_ID.into(),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(120),
            max_output_tokens: 10_000,
            temperature: 0.0,
            batch_size: 20,
            max_passes: 50,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1_000),
            pass_delay: Duration::from_millis(200),
            report_dir: default_report_dir(),
            cache_max_entries: 64,
            cache_ttl: Duration::from_secs(2 * 60 * 60),
            log_level: "info".into(),
            log_model_full: true,
            log_model_max_chars: 0,
            credentials: None,
            bind_addr: DEFAULT_BIND_ADDR.into(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment (after seeding it from `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case in deployment.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let credentials = match (get("AWS_ACCESS_KEY"), get("AWS_SECRET")) {
            (Some(access_key_id), Some(secret_access_key)) => Some(CredentialPair {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteCredentials),
        };

        let config = Self {
            region: get("BEDROCK_REGION").unwrap_or(defaults.region),
            model_id: get("BEDROCK_MODEL_ID").unwrap_or(defaults.model_id),
            connect_timeout: Duration::from_secs(parse_or(
                get("CONNECT_TIMEOUT"),
                "CONNECT_TIMEOUT",
                defaults.connect_timeout.as_secs(),
            )?),
            read_timeout: Duration::from_secs(parse_or(
                get("READ_TIMEOUT"),
                "READ_TIMEOUT",
                defaults.read_timeout.as_secs(),
            )?),
            max_output_tokens: parse_or(
                get("MAX_TOTAL_TOKENS"),
                "MAX_TOTAL_TOKENS",
                defaults.max_output_tokens,
            )?,
            temperature: parse_or(get("TEMPERATURE"), "TEMPERATURE", defaults.temperature)?,
            batch_size: parse_or(get("BATCH_SIZE"), "BATCH_SIZE", defaults.batch_size)?,
            max_passes: parse_or(get("MAX_PASSES"), "MAX_PASSES", defaults.max_passes)?,
            max_retries: parse_or(get("MAX_RETRIES"), "MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(parse_or(
                get("RETRY_BASE_DELAY_MS"),
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            pass_delay: Duration::from_millis(parse_or(
                get("PASS_DELAY_MS"),
                "PASS_DELAY_MS",
                defaults.pass_delay.as_millis() as u64,
            )?),
            report_dir: get("REPORT_DIR").map(PathBuf::from).unwrap_or(defaults.report_dir),
            cache_max_entries: parse_or(
                get("CACHE_MAX_ENTRIES"),
                "CACHE_MAX_ENTRIES",
                defaults.cache_max_entries,
            )?,
            cache_ttl: Duration::from_secs(parse_or(
                get("CACHE_TTL_SECS"),
                "CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_model_full: match get("LOG_MODEL_FULL") {
                Some(v) => parse_flag(&v),
                None => defaults.log_model_full,
            },
            log_model_max_chars: parse_or(
                get("LOG_MODEL_MAX_CHARS"),
                "LOG_MODEL_MAX_CHARS",
                defaults.log_model_max_chars,
            )?,
            credentials,
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
        };

        config.validate()?;
        Ok(config)
    }

    /// Range sanity checks. Nothing beyond what would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, u64); 5] = [
            ("BATCH_SIZE", self.batch_size as u64),
            ("MAX_PASSES", self.max_passes as u64),
            ("MAX_RETRIES", self.max_retries as u64),
            ("MAX_TOTAL_TOKENS", self.max_output_tokens as u64),
            ("CACHE_MAX_ENTRIES", self.cache_max_entries as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::OutOfRange {
                    name,
                    detail: "must be greater than 0".into(),
                });
            }
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::OutOfRange {
                name: "TEMPERATURE",
                detail: format!("{} not within 0.0..=1.0", self.temperature),
            });
        }

        if self.read_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                name: "READ_TIMEOUT/CONNECT_TIMEOUT",
                detail: "timeouts must be at least 1 second".into(),
            });
        }

        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

/// Default report directory: `<local data dir>/soc2-extract/reports`,
/// or the temp dir when the platform has no data dir.
pub fn default_report_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
        .join("reports")
}

/// Fallback used when the configured report directory cannot be created.
pub fn fallback_report_dir() -> PathBuf {
    std::env::temp_dir().join("soc2_reports")
}

/// Default tracing filter: our crate at the configured level, dependencies at warn.
pub fn default_log_filter(level: &str) -> String {
    format!("warn,soc2_extract_lib={level},soc2_extract={level}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.read_timeout, Duration::from_secs(120));
        assert!(config.credentials.is_none());
        assert!(config.log_model_full);
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BEDROCK_REGION", "eu-west-1"),
            ("BATCH_SIZE", "5"),
            ("TEMPERATURE", "0.3"),
            ("LOG_MODEL_FULL", "false"),
            ("REPORT_DIR", "/tmp/reports"),
        ]))
        .unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.batch_size, 5);
        assert!((config.temperature - 0.3).abs() < f32::EPSILON);
        assert!(!config.log_model_full);
        assert_eq!(config.report_dir, PathBuf::from("/tmp/reports"));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("BATCH_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "BATCH_SIZE", .. }));
    }

    #[test]
    fn unparseable_value_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("MAX_RETRIES", "three")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "MAX_RETRIES",
                value: "three".into()
            }
        );
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("TEMPERATURE", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "TEMPERATURE", .. }));
    }

    #[test]
    fn half_credential_pair_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("AWS_ACCESS_KEY", "AKIA123")])).unwrap_err();
        assert_eq!(err, ConfigError::IncompleteCredentials);
    }

    #[test]
    fn credential_pair_debug_redacts_secret() {
        let config = AppConfig::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY", "AKIA123"),
            ("AWS_SECRET", "hunter2"),
        ]))
        .unwrap();
        let printed = format!("{:?}", config.credentials);
        assert!(printed.contains("AKIA123"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn log_filter_scopes_crate() {
        let filter = default_log_filter("debug");
        assert!(filter.contains("soc2_extract_lib=debug"));
        assert!(filter.starts_with("warn"));
    }

    #[test]
    fn app_name_is_stable() {
        assert_eq!(APP_NAME, "soc2-extract");
        assert!(default_report_dir().ends_with("reports"));
    }
}
