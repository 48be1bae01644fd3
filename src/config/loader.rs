//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{EngineError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, e.g. `APP__ENGINE__MAX_RISK_MULTIPLE`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let app: AppConfig = config.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

/// Reject configurations the engine cannot run with
pub fn validate(config: &AppConfig) -> Result<()> {
    let engine = &config.engine;
    if engine.rungs_below_threshold == 0 || engine.rungs_at_or_above_threshold == 0 {
        return Err(EngineError::bad_param("config.rung_count_zero"));
    }
    if engine.max_risk_multiple <= rust_decimal::Decimal::ZERO {
        return Err(EngineError::bad_param("config.max_risk_multiple_not_positive"));
    }
    if config.parser.market_band_percent.is_sign_negative() {
        return Err(EngineError::bad_param("config.market_band_negative"));
    }
    if config.parser.default_chain.is_empty() {
        return Err(EngineError::bad_param("config.empty_parser_chain"));
    }
    if let Some((channel, _)) = config.parser.channels.iter().find(|(_, chain)| chain.is_empty()) {
        return Err(EngineError::bad_param("config.empty_parser_chain").with("channel", channel));
    }
    if config.window.poll_interval_seconds == 0 || config.window.heartbeat_interval_seconds == 0 {
        return Err(EngineError::bad_param("config.zero_interval"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.engine.max_risk_multiple, dec!(10.5));
        assert_eq!(config.engine.min_venue_margin, dec!(100));
        assert_eq!(config.parser.market_band_percent, dec!(3));
        assert_eq!(config.window.poll_interval_seconds, 10);
        assert_eq!(config.window.heartbeat_interval_seconds, 300);
    }

    #[test]
    fn test_zero_rungs_rejected() {
        let mut config = AppConfig::default();
        config.engine.rungs_below_threshold = 0;
        assert_eq!(validate(&config).unwrap_err().reason(), "config.rung_count_zero");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Some("does-not-exist.toml")).unwrap();
        assert_eq!(config.engine.rungs_at_or_above_threshold, 7);
        assert!(config.database.is_none());
    }
}
