use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the pairing service lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL; `pairing/begin` and `pairing/status` are resolved against it.
    /// May be empty (fact, not error); the HTTP adapter rejects it on construction.
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RemoteConfig {
    pub fn from_toml(toml_value: &toml::Value) -> anyhow::Result<Self> {
        let remote = toml_value.get("remote");
        let request_timeout = match remote.and_then(|r| r.get("request_timeout_ms")) {
            None => DEFAULT_REQUEST_TIMEOUT,
            Some(value) => {
                let ms = value
                    .as_integer()
                    .and_then(|ms| u64::try_from(ms).ok())
                    .ok_or_else(|| {
                        anyhow::anyhow!("remote.request_timeout_ms must be a non-negative integer")
                    })?;
                Duration::from_millis(ms)
            }
        };

        Ok(Self {
            base_url: remote
                .and_then(|r| r.get("base_url"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            token: remote
                .and_then(|r| r.get("token"))
                .and_then(|v| v.as_str())
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            request_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toml::Value;

    #[test]
    fn test_from_toml_returns_empty_base_url_when_missing() {
        let toml_value: Value = toml::from_str("[remote]").unwrap();

        let config = RemoteConfig::from_toml(&toml_value).unwrap();

        assert_eq!(config.base_url, "");
        assert_eq!(config.token, None);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_from_toml_parses_remote_table() {
        let toml_str = r#"
            [remote]
            base_url = "https://api.example.com/v1/"
            token = "secret"
            request_timeout_ms = 2500
        "#;
        let toml_value: Value = toml::from_str(toml_str).unwrap();

        let config = RemoteConfig::from_toml(&toml_value).unwrap();

        assert_eq!(config.base_url, "https://api.example.com/v1/");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_empty_token_is_treated_as_absent() {
        let toml_value: Value = toml::from_str("[remote]\ntoken = \"\"").unwrap();

        let config = RemoteConfig::from_toml(&toml_value).unwrap();

        assert_eq!(config.token, None);
    }
}
