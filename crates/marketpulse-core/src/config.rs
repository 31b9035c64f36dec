use chrono::Utc;
use thiserror::Error;

use crate::app_config::AppConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if an env var is present but fails to parse.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the
/// process, without touching `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if an env var is present but fails to parse.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build configuration using the provided env-var lookup function.
///
/// The parsing/validation logic is decoupled from the actual environment so
/// it can be tested with a pure `HashMap` lookup with no `set_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<f64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let job_name = lookup("MP_JOB_NAME")
        .unwrap_or_else(|_| format!("run_{}", Utc::now().format("%Y%m%d_%H%M%S")));
    let log_level = or_default("MP_LOG_LEVEL", "info");

    let crawler_max_posts_per_tab = parse_usize("MP_CRAWLER_MAX_POSTS_PER_TAB", "100")?;
    let crawler_max_concurrent_tabs = parse_usize("MP_CRAWLER_MAX_CONCURRENT_TABS", "4")?;
    let browser_base_url = or_default("MP_BROWSER_BASE_URL", "http://localhost:3000");
    let browser_token = lookup("MP_BROWSER_TOKEN").ok().filter(|t| !t.is_empty());
    let browser_feed_url = or_default("MP_BROWSER_FEED_URL", "https://xueqiu.com/");

    let llm_api_key = lookup("MP_LLM_API_KEY").ok().filter(|k| !k.is_empty());
    let llm_api_base_url = or_default("MP_LLM_API_BASE_URL", "https://api.fireworks.ai/inference/v1");
    let llm_model_name = or_default(
        "MP_LLM_MODEL_NAME",
        "accounts/fireworks/models/llama-v3p1-8b-instruct",
    );
    let llm_max_tokens = parse_u32("MP_LLM_MAX_TOKENS", "1024")?;
    let llm_temperature = parse_f64("MP_LLM_TEMPERATURE", "0.3")?;
    let llm_requests_per_minute = parse_u32("MP_LLM_REQUESTS_PER_MINUTE", "5")?;
    let llm_max_concurrent_requests = parse_usize("MP_LLM_MAX_CONCURRENT_REQUESTS", "1")?;
    let llm_retry_attempts = parse_u32("MP_LLM_RETRY_ATTEMPTS", "5")?;
    let llm_retry_backoff_base_ms = parse_u64("MP_LLM_RETRY_BACKOFF_BASE_MS", "2000")?;
    let llm_request_timeout_secs = parse_u64("MP_LLM_REQUEST_TIMEOUT_SECS", "60")?;

    let storage_base_dir = PathBuf::from(or_default("MP_STORAGE_BASE_DIR", "storage"));
    let storage_save_interval_secs = parse_u64("MP_STORAGE_SAVE_INTERVAL_SECS", "30")?;

    Ok(AppConfig {
        job_name,
        log_level,
        crawler_max_posts_per_tab,
        crawler_max_concurrent_tabs,
        browser_base_url,
        browser_token,
        browser_feed_url,
        llm_api_key,
        llm_api_base_url,
        llm_model_name,
        llm_max_tokens,
        llm_temperature,
        llm_requests_per_minute,
        llm_max_concurrent_requests,
        llm_retry_attempts,
        llm_retry_backoff_base_ms,
        llm_request_timeout_secs,
        storage_base_dir,
        storage_save_interval_secs,
    })
}
