use crate::config::types::{Config, ManagerSection, VisitSection};
use crate::ConfigError;
use url::Url;

/// Upper bound on the number of browser workers
pub const MAX_BROWSERS: u32 = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_manager_config(&config.manager)?;
    validate_visit_config(&config.visit)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates task manager configuration
fn validate_manager_config(config: &ManagerSection) -> Result<(), ConfigError> {
    if config.num_browsers < 1 || config.num_browsers > MAX_BROWSERS {
        return Err(ConfigError::Validation(format!(
            "num_browsers must be between 1 and {}, got {}",
            MAX_BROWSERS, config.num_browsers
        )));
    }

    if config.data_directory.is_empty() {
        return Err(ConfigError::Validation(
            "data_directory cannot be empty".to_string(),
        ));
    }

    if config.log_path.is_empty() {
        return Err(ConfigError::Validation("log_path cannot be empty".to_string()));
    }

    if config.database_name.is_empty() {
        return Err(ConfigError::Validation(
            "database_name cannot be empty".to_string(),
        ));
    }

    if config.database_name.contains('/') || config.database_name.contains('\\') {
        return Err(ConfigError::Validation(format!(
            "database_name must be a bare file name, got '{}'",
            config.database_name
        )));
    }

    Ok(())
}

/// Validates the fetch action settings
fn validate_visit_config(config: &VisitSection) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site list
fn validate_sites(sites: &[String]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "at least one site must be listed".to_string(),
        ));
    }

    for site in sites {
        validate_site_url(site)?;
    }

    Ok(())
}

/// Validates a single site URL: parseable, http(s), with a host
pub(crate) fn validate_site_url(site: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(site)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid site URL '{}': {}", site, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Site URL '{}' must use http or https, got '{}'",
            site,
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl(format!(
            "Site URL '{}' has no host",
            site
        )));
    }

    Ok(url)
}
