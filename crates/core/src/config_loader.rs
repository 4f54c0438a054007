use crate::config::AppConfig;
use anyhow::{Context, Result};
use tracing::info;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/zdte.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from `config/zdte.toml` and `ZDTE_` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be parsed or the result fails validation.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration layering defaults, the TOML file at `path` (if present)
    /// and `ZDTE_` environment variables (`__` separates sections).
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be parsed or the result fails validation.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ZDTE_").split("__"));

        let config = Self::extract(&figment).with_context(|| format!("Failed to load config from {path}"))?;
        info!(
            path,
            max_daily_loss = %config.risk.max_daily_loss,
            delta_cap = %config.risk.delta_cap,
            confirmation_timeout_secs = config.gate.confirmation_timeout_secs,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Extracts and validates an already assembled figment.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction or validation fails.
    pub fn extract(figment: &Figment) -> Result<AppConfig> {
        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn toml_overrides_defaults_section_by_section() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(
            r#"
            [risk]
            max_daily_loss = 750
            delta_cap = 2.5

            [cache]
            auto_expire_at = "16:00"
            "#,
        ));

        let config = ConfigLoader::extract(&figment).unwrap();
        assert_eq!(config.risk.max_daily_loss, dec!(750));
        assert_eq!(config.risk.delta_cap, dec!(2.5));
        assert_eq!(config.cache.auto_expire_at, "16:00");
        // untouched keys keep their defaults
        assert_eq!(config.cache.max_staleness_secs, 60);
        assert_eq!(config.gate.confirmation_timeout_secs, 30);
    }

    #[test]
    fn invalid_values_fail_extraction() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(
            r#"
            [gate]
            confirmation_timeout_secs = 0
            "#,
        ));

        assert!(ConfigLoader::extract(&figment).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.strategy.contract_multiplier, dec!(100));
    }
}
