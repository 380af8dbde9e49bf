//! # Configuration DTOs
//!
//! Plain data mapped from a TOML document. Reading the file is the
//! infrastructure layer's job (`dl-infra::config`); this module only maps
//! an already-parsed `toml::Value` onto typed structs.

mod pairing;
mod remote;

pub use pairing::*;
pub use remote::*;

/// Application configuration DTO
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub pairing: PairingConfig,
    pub remote: RemoteConfig,
}

impl AppConfig {
    /// Create AppConfig from TOML value. Missing tables fall back to defaults.
    pub fn from_toml(toml_value: &toml::Value) -> anyhow::Result<Self> {
        Ok(Self {
            pairing: PairingConfig::from_toml(toml_value)?,
            remote: RemoteConfig::from_toml(toml_value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toml::Value;

    #[test]
    fn test_from_toml_reads_both_tables() {
        let toml_str = r#"
            [pairing]
            max_attempts = 4

            [remote]
            base_url = "http://localhost:8080"
        "#;
        let toml_value: Value = toml::from_str(toml_str).unwrap();

        let config = AppConfig::from_toml(&toml_value).unwrap();

        assert_eq!(config.pairing.max_attempts, 4);
        assert_eq!(config.pairing.poll_interval, Duration::from_secs(3));
        assert_eq!(config.remote.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_from_toml_empty_document_is_default() {
        let toml_value: Value = toml::from_str("").unwrap();

        let config = AppConfig::from_toml(&toml_value).unwrap();

        assert_eq!(config, AppConfig::default());
    }
}
