use crate::config::types::{Config, CrawlerConfig, InputConfig, OutputConfig, UserAgentConfig};
use crate::crawler::Section;
use crate::extract::CommentsMode;
use crate::harvest::Cutoff;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_input_config(&config.input)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    if config.idle_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "idle_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.navigation_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "navigation_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.persist_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "persist_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.mobile.trim().is_empty() || config.desktop.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user agent strings cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the harvesting input
fn validate_input_config(config: &InputConfig) -> Result<(), ConfigError> {
    if config.start_urls.is_empty() {
        return Err(ConfigError::Validation(
            "You must provide at least one start URL".to_string(),
        ));
    }

    for start_url in &config.start_urls {
        let url = Url::parse(start_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", start_url, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidUrl(format!(
                "Start URL '{}' must use http or https",
                start_url
            )));
        }
    }

    for section in &config.sections {
        match section.parse::<Section>() {
            Ok(Section::Home) => {
                return Err(ConfigError::Validation(
                    "'home' is always visited and cannot be listed in sections".to_string(),
                ))
            }
            Ok(_) => {}
            Err(e) => return Err(ConfigError::Validation(e)),
        }
    }

    config
        .comments_mode
        .parse::<CommentsMode>()
        .map_err(ConfigError::Validation)?;

    for date in [
        &config.max_post_date,
        &config.max_comment_date,
        &config.max_review_date,
    ]
    .into_iter()
    .flatten()
    {
        Cutoff::parse(Some(date.as_str()))
            .map_err(|_| ConfigError::InvalidDate(format!("'{}' is not a valid date", date)))?;
    }

    validate_language(&config.language)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    if config.dataset_path.is_empty() {
        return Err(ConfigError::Validation(
            "dataset_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Accepts `ll` or `ll-CC` locale tags
fn validate_language(language: &str) -> Result<(), ConfigError> {
    let mut parts = language.split('-');
    let lang = parts.next().unwrap_or_default();
    let country = parts.next();

    let lang_ok = lang.len() == 2 && lang.chars().all(|c| c.is_ascii_lowercase());
    let country_ok = country
        .map(|c| c.len() == 2 && c.chars().all(|c| c.is_ascii_uppercase()))
        .unwrap_or(true);

    if !lang_ok || !country_ok || parts.next().is_some() {
        return Err(ConfigError::Validation(format!(
            "Selected language \"{}\" isn't supported",
            language
        )));
    }

    Ok(())
}
