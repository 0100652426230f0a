use super::{types::Config, ConfigError, VadMethod};

/// Validate configuration
/// Currently validates:
/// - Provider credentials when remote lookup is enabled
/// - HuggingFace token when pyannote VAD is selected
/// - Threshold sanity for the alignment guard and duration windows
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.stage.remote_enabled && !config.stage.force_ai && config.provider.api_key.is_empty()
    {
        return Err(ConfigError::ValidationError(
            "provider.api_key is required when stage.remote_enabled is set".to_string(),
        ));
    }

    if config.transcribe.vad_method == VadMethod::Pyannote && config.transcribe.hf_token.is_empty()
    {
        return Err(ConfigError::ValidationError(
            "transcribe.hf_token is required for the pyannote VAD method".to_string(),
        ));
    }

    if config.alignment.max_shift_stddev_secs <= 0.0 {
        return Err(ConfigError::ValidationError(
            "alignment.max_shift_stddev_secs must be positive".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.alignment.max_new_overlap_ratio) {
        return Err(ConfigError::ValidationError(
            "alignment.max_new_overlap_ratio must be between 0 and 1".to_string(),
        ));
    }

    if config.duration.max_credits_gap_secs <= 0.0 || config.duration.max_overrun_secs < 0.0 {
        return Err(ConfigError::ValidationError(
            "duration windows must be positive".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&config.duration.suspect_rel_delta) {
        return Err(ConfigError::ValidationError(
            "duration.suspect_rel_delta must be a fraction below 1".to_string(),
        ));
    }

    if config.forced.min_pairs < 2 {
        return Err(ConfigError::ValidationError(
            "forced.min_pairs must be at least 2".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.provider.api_key = "key".to_string();
        config
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_missing_api_key_fails() {
        let config = Config::default();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_force_ai_without_api_key_passes() {
        let mut config = Config::default();
        config.stage.force_ai = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_remote_disabled_without_api_key_passes() {
        let mut config = Config::default();
        config.stage.remote_enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_pyannote_needs_token() {
        let mut config = valid_config();
        config.transcribe.vad_method = VadMethod::Pyannote;
        assert!(validate_config(&config).is_err());

        config.transcribe.hf_token = "hf_token".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_threshold_sanity() {
        let mut config = valid_config();
        config.alignment.max_shift_stddev_secs = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.duration.suspect_rel_delta = 1.5;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.forced.min_pairs = 1;
        assert!(validate_config(&config).is_err());
    }
}
