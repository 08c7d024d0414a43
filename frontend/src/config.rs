use thiserror::Error;

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TASKS_API_URL must be an http(s) URL, got '{0}'")]
    InvalidApiUrl(String),
}

/// Where the task backend lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL without a trailing slash.
    pub api_base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_base_url: &str) -> Result<Self, ConfigError> {
        let trimmed = api_base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(api_base_url.to_string()));
        }
        Ok(Self {
            api_base_url: trimmed.to_string(),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("TASKS_API_URL") {
            Ok(url) => Self::new(&url),
            Err(_) => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slashes() {
        let config = ClientConfig::new("https://tasks.example.com/").unwrap();
        assert_eq!(config.api_base_url, "https://tasks.example.com");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert_eq!(
            ClientConfig::new("tasks.example.com"),
            Err(ConfigError::InvalidApiUrl("tasks.example.com".to_string()))
        );
    }

    #[test]
    fn defaults_to_local_backend() {
        assert_eq!(ClientConfig::default().api_base_url, "http://127.0.0.1:3000");
    }
}
