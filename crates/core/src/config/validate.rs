use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Generation base URL is set and well-formed enough to use
/// - Orchestrator intervals, ceilings and multipliers are sane
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Generation validation
    if config.generation.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "generation.base_url cannot be empty".to_string(),
        ));
    }
    if !config.generation.base_url.starts_with("http://")
        && !config.generation.base_url.starts_with("https://")
    {
        return Err(ConfigError::ValidationError(format!(
            "generation.base_url must be an http(s) URL, got {}",
            config.generation.base_url
        )));
    }
    if config.generation.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "generation.request_timeout_secs cannot be 0".to_string(),
        ));
    }

    // Orchestrator validation
    let orch = &config.orchestrator;
    if orch.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if orch.admission_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.admission_poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if orch.max_poll_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_poll_attempts cannot be 0".to_string(),
        ));
    }
    if orch.transient_multiplier < 1 || orch.quota_multiplier < 1 {
        return Err(ConfigError::ValidationError(
            "orchestrator backoff multipliers must be at least 1".to_string(),
        ));
    }
    if orch.max_scenes == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_scenes cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationConfig, ServerConfig};
    use crate::orchestrator::OrchestratorConfig;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig::default(),
            generation: GenerationConfig {
                base_url: "https://genapi.example.com".to_string(),
                api_key: String::new(),
                video_model: "vidgen-2".to_string(),
                voice_model: "voxgen-1".to_string(),
                request_timeout_secs: 30,
            },
            orchestrator: OrchestratorConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_empty_base_url_fails() {
        let mut config = valid_config();
        config.generation.base_url = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_non_http_base_url_fails() {
        let mut config = valid_config();
        config.generation.base_url = "ftp://genapi.example.com".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_poll_interval_fails() {
        let mut config = valid_config();
        config.orchestrator.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_multiplier_fails() {
        let mut config = valid_config();
        config.orchestrator.quota_multiplier = 0;
        assert!(validate_config(&config).is_err());
    }
}
