use url::Url;

use super::{Config, ConfigError};

/// Validate configuration beyond what deserialization enforces
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.admin.login.is_empty() || config.admin.password.is_empty() {
        return Err(ConfigError::ValidationError(
            "admin.login and admin.password must be set".to_string(),
        ));
    }

    if config.workers.discovery == 0 || config.workers.parsing == 0 {
        return Err(ConfigError::ValidationError(
            "workers.discovery and workers.parsing must be positive".to_string(),
        ));
    }

    if config.batch.rooms == 0 {
        return Err(ConfigError::ValidationError(
            "batch.rooms must be positive".to_string(),
        ));
    }

    for (name, value) in [
        ("public.ui", &config.public.ui),
        ("public.api", &config.public.api),
        ("matrix.proxy_url", &config.matrix.proxy_url),
        ("webhooks.stats", &config.webhooks.stats),
        ("cache.bunny.url", &config.cache.bunny.url),
    ] {
        if !value.is_empty() && Url::parse(value).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "{} is not a valid URL: {}",
                name, value
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
servers = ["matrix.org"]

[admin]
login = "admin"
password = "secret"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config() {
        let config = base_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_admin_credentials() {
        let mut config = base_config();
        config.admin.password = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_workers() {
        let mut config = base_config();
        config.workers.parsing = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_batch() {
        let mut config = base_config();
        config.batch.rooms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_public_url() {
        let mut config = base_config();
        config.public.api = "not a url".to_string();
        assert!(validate_config(&config).is_err());
    }
}
