use omnicall_core::relay::{AudioStrategy, DEFAULT_AUDIO_BATCH_SIZE};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_API_BASE: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub api_key: String,
    pub api_base: String,
    pub chat_model: String,
    pub voice: String,
    pub audio_output_format: String,
    pub audio_strategy: AudioStrategy,
    pub session_timeout: Duration,
    pub reaper_interval: Duration,
    pub upstream_idle_timeout: Duration,
    pub log_level: Level,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn string_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn audio_strategy_from_env() -> Result<AudioStrategy, ConfigError> {
    let mode = string_var("AUDIO_STREAM_MODE", "batched");
    match mode.to_lowercase().as_str() {
        "immediate" => Ok(AudioStrategy::Immediate),
        "batched" => {
            let batch_size = parse_var("AUDIO_BATCH_SIZE", DEFAULT_AUDIO_BATCH_SIZE)?;
            if batch_size == 0 {
                return Err(ConfigError::InvalidValue(
                    "AUDIO_BATCH_SIZE".to_string(),
                    "must be at least 1".to_string(),
                ));
            }
            Ok(AudioStrategy::Batched { batch_size })
        }
        other => Err(ConfigError::InvalidValue(
            "AUDIO_STREAM_MODE".to_string(),
            format!("'{}' is not one of 'immediate', 'batched'", other),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = string_var("BIND_ADDRESS", "0.0.0.0:5000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let api_key = std::env::var("DASHSCOPE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("DASHSCOPE_API_KEY".to_string()))?;

        let api_base = string_var("API_BASE", DEFAULT_API_BASE);
        let chat_model = string_var("CHAT_MODEL", "qwen-omni-turbo-0119");
        let voice = string_var("VOICE", "Cherry");
        let audio_output_format = string_var("AUDIO_OUTPUT_FORMAT", "wav");
        let audio_strategy = audio_strategy_from_env()?;

        let session_timeout = Duration::from_secs(parse_var("SESSION_TIMEOUT_SECS", 600u64)?);
        let reaper_interval = Duration::from_secs(parse_var("REAPER_INTERVAL_SECS", 60u64)?);
        if reaper_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "REAPER_INTERVAL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let upstream_idle_timeout =
            Duration::from_secs(parse_var("UPSTREAM_IDLE_TIMEOUT_SECS", 60u64)?);
        if upstream_idle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_IDLE_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_level_str = string_var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            api_key,
            api_base,
            chat_model,
            voice,
            audio_output_format,
            audio_strategy,
            session_timeout,
            reaper_interval,
            upstream_idle_timeout,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "DASHSCOPE_API_KEY",
        "API_BASE",
        "CHAT_MODEL",
        "VOICE",
        "AUDIO_OUTPUT_FORMAT",
        "AUDIO_STREAM_MODE",
        "AUDIO_BATCH_SIZE",
        "SESSION_TIMEOUT_SECS",
        "REAPER_INTERVAL_SECS",
        "UPSTREAM_IDLE_TIMEOUT_SECS",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    fn set_minimal_env() {
        unsafe { env::set_var("DASHSCOPE_API_KEY", "test-key") };
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:5000");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.chat_model, "qwen-omni-turbo-0119");
        assert_eq!(config.voice, "Cherry");
        assert_eq!(config.audio_output_format, "wav");
        assert_eq!(config.audio_strategy, AudioStrategy::Batched { batch_size: 10 });
        assert_eq!(config.session_timeout, Duration::from_secs(600));
        assert_eq!(config.reaper_interval, Duration::from_secs(60));
        assert_eq!(config.upstream_idle_timeout, Duration::from_secs(60));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8443");
            env::set_var("API_BASE", "http://localhost:9000/v1");
            env::set_var("CHAT_MODEL", "qwen-omni-turbo");
            env::set_var("VOICE", "Ethan");
            env::set_var("AUDIO_STREAM_MODE", "immediate");
            env::set_var("SESSION_TIMEOUT_SECS", "30");
            env::set_var("REAPER_INTERVAL_SECS", "5");
            env::set_var("UPSTREAM_IDLE_TIMEOUT_SECS", "15");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8443");
        assert_eq!(config.api_base, "http://localhost:9000/v1");
        assert_eq!(config.chat_model, "qwen-omni-turbo");
        assert_eq!(config.voice, "Ethan");
        assert_eq!(config.audio_strategy, AudioStrategy::Immediate);
        assert_eq!(config.session_timeout, Duration::from_secs(30));
        assert_eq!(config.reaper_interval, Duration::from_secs(5));
        assert_eq!(config.upstream_idle_timeout, Duration::from_secs(15));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_custom_batch_size() {
        clear_env_vars();
        set_minimal_env();
        unsafe { env::set_var("AUDIO_BATCH_SIZE", "4") };

        let config = Config::from_env().unwrap();
        assert_eq!(config.audio_strategy, AudioStrategy::Batched { batch_size: 4 });
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "DASHSCOPE_API_KEY"),
            _ => panic!("Expected MissingVar for DASHSCOPE_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_values() {
        for (var, value) in [
            ("BIND_ADDRESS", "not-a-valid-address"),
            ("AUDIO_STREAM_MODE", "sometimes"),
            ("AUDIO_BATCH_SIZE", "0"),
            ("AUDIO_BATCH_SIZE", "ten"),
            ("SESSION_TIMEOUT_SECS", "-1"),
            ("REAPER_INTERVAL_SECS", "0"),
            ("UPSTREAM_IDLE_TIMEOUT_SECS", "0"),
            ("RUST_LOG", "not-a-level"),
        ] {
            clear_env_vars();
            set_minimal_env();
            unsafe { env::set_var(var, value) };

            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                other => panic!("Expected InvalidValue for {var}, got {other:?}"),
            }
        }
    }
}
