use crate::config::types::{Config, FetcherConfig, RunConfig, SourceProfile, UserAgentConfig};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
///
/// Runs before any network I/O; every error here aborts the run.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_run_config(&config.run)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_sources(&config.sources)?;
    Ok(())
}

fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.state_path.is_empty() {
        return Err(ConfigError::Validation(
            "state_path cannot be empty".to_string(),
        ));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.export_dir.is_empty() {
        return Err(ConfigError::Validation(
            "export_dir cannot be empty".to_string(),
        ));
    }

    if config.flush_every < 1 {
        return Err(ConfigError::Validation(
            "flush_every must be >= 1".to_string(),
        ));
    }

    validate_seconds("inter_source_delay_seconds", config.inter_source_delay_seconds)?;

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1".to_string(),
        ));
    }

    if config.timeout_seconds < 1 {
        return Err(ConfigError::Validation(
            "timeout_seconds must be >= 1".to_string(),
        ));
    }

    validate_seconds("rate_limit_base_seconds", config.rate_limit_base_seconds)?;
    validate_seconds("backoff_unit_seconds", config.backoff_unit_seconds)?;

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_sources(sources: &[SourceProfile]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[source]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for source in sources {
        if !seen.insert(source.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source id '{}'",
                source.id
            )));
        }
        validate_source(source)?;
    }

    Ok(())
}

/// Validates a single source profile
pub(crate) fn validate_source(source: &SourceProfile) -> Result<(), ConfigError> {
    if source.id.is_empty()
        || !source
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "source id must be non-empty and contain only [A-Za-z0-9_-], got '{}'",
            source.id
        )));
    }

    if source.id == "all" {
        return Err(ConfigError::Validation(
            "'all' is reserved and cannot be used as a source id".to_string(),
        ));
    }

    let base = Url::parse(&source.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid base_url '{}' for source '{}': {}",
            source.base_url, source.id, e
        ))
    })?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            source.base_url
        )));
    }

    if base.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' has no host",
            source.base_url
        )));
    }

    validate_seconds("delay_seconds", source.delay_seconds)?;

    if source.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1 for source '{}'",
            source.id
        )));
    }

    if source.max_workers < 1 || source.max_workers > 64 {
        return Err(ConfigError::Validation(format!(
            "max_workers must be between 1 and 64 for source '{}', got {}",
            source.id, source.max_workers
        )));
    }

    if source.archive_path_format.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "archive_path_format cannot be empty for source '{}'",
            source.id
        )));
    }

    for pattern in source
        .include_patterns
        .iter()
        .chain(&source.exclude_patterns)
        .chain(&source.pagination_patterns)
        .chain(&source.category_patterns)
    {
        Regex::new(pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("'{}' in source '{}': {}", pattern, source.id, e))
        })?;
    }

    for (field, selector) in source.field_selectors.iter_all() {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidSelector(format!(
                "{} selector '{}' in source '{}': {:?}",
                field, selector, source.id, e
            ))
        })?;
    }

    Ok(())
}

fn validate_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }
    Ok(())
}
