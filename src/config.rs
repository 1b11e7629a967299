//! Configuration loader: merges .env, config.toml and environment overrides.

use common::config::PlannerConfig;
use common::Error;
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    match raw.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

fn parse_positive_u32(raw: &str, env_name: &str) -> Result<u32, Error> {
    match raw.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

fn validate_config(config: &PlannerConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    let base = config.api_base_url.trim();
    if base.is_empty() {
        issues.push("api_base_url must not be empty".into());
    } else if !base.starts_with("http://") && !base.starts_with("https://") {
        issues.push("api_base_url must start with http:// or https://".into());
    }
    if config.request_timeout_secs == 0 {
        issues.push("request_timeout_secs must be > 0".into());
    }

    if config.cache.list_retention_secs == 0 {
        issues.push("cache.list_retention_secs must be > 0".into());
    }
    if config.cache.item_retention_secs == 0 {
        issues.push("cache.item_retention_secs must be > 0".into());
    }
    if config.cache.search_retention_secs == 0 {
        issues.push("cache.search_retention_secs must be > 0".into());
    }
    if config.cache.sweep_interval_secs == 0 {
        issues.push("cache.sweep_interval_secs must be > 0".into());
    }

    if config.search.default_limit == 0 {
        issues.push("search.default_limit must be > 0".into());
    }
    if config.snapshot.stale_after_secs == 0 {
        issues.push("snapshot.stale_after_secs must be > 0".into());
    }

    if config.rate_limit.reads_per_sec == 0 {
        issues.push("rate_limit.reads_per_sec must be > 0".into());
    }
    if config.rate_limit.writes_per_sec == 0 {
        issues.push("rate_limit.writes_per_sec must be > 0".into());
    }
    if config.rate_limit.provider_per_sec == 0 {
        issues.push("rate_limit.provider_per_sec must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

fn apply_env_overrides(config: &mut PlannerConfig) -> Result<(), Error> {
    if let Ok(url) = std::env::var("PEAK_API_BASE_URL") {
        config.api_base_url = url.trim().to_string();
    }
    if let Ok(raw) = std::env::var("PEAK_REQUEST_TIMEOUT_SECS") {
        config.request_timeout_secs = parse_positive_u64(&raw, "PEAK_REQUEST_TIMEOUT_SECS")?;
    }
    if let Ok(raw) = std::env::var("PEAK_SEARCH_LIMIT") {
        config.search.default_limit = parse_positive_u32(&raw, "PEAK_SEARCH_LIMIT")?;
    }
    Ok(())
}

/// Load planner configuration from an optional config file and the
/// environment.
pub fn load_config(config_path: &Path) -> Result<PlannerConfig, Error> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let mut config = PlannerConfig::default();

    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
    }

    // Environment wins over the file.
    apply_env_overrides(&mut config)?;

    validate_config(&config)?;

    Ok(config)
}
