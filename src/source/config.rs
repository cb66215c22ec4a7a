//! Event source configuration

use crate::http::DefaultHeaders;
use crate::protocol::constants::DEFAULT_MAX_QUEUED_MESSAGES;

/// HTTP Basic credentials required to subscribe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Configuration for one streaming endpoint
#[derive(Debug, Clone)]
pub struct EventSourceConfig {
    /// Exact request path served by this source
    pub path: String,

    /// Credentials clients must present, if any
    pub credentials: Option<Credentials>,

    /// Realm announced in the authentication challenge
    pub realm: String,

    /// Per-session queue depth before new messages are shed
    pub max_queued_messages: usize,

    /// Extra headers sent with the stream preamble
    pub default_headers: DefaultHeaders,
}

impl EventSourceConfig {
    /// Create a config serving `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            credentials: None,
            realm: "Login Required".to_string(),
            max_queued_messages: DEFAULT_MAX_QUEUED_MESSAGES,
            default_headers: DefaultHeaders::new(),
        }
    }

    /// Require Basic credentials
    ///
    /// An empty username or password disables authentication.
    pub fn authentication(mut self, username: &str, password: &str) -> Self {
        self.credentials = if username.is_empty() || password.is_empty() {
            None
        } else {
            Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
        };
        self
    }

    /// Set the challenge realm
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Set the per-session queue cap (at least 1)
    pub fn max_queued_messages(mut self, max: usize) -> Self {
        self.max_queued_messages = max.max(1);
        self
    }

    /// Add a header to the stream preamble
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.add(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EventSourceConfig::new("/events");

        assert_eq!(config.path, "/events");
        assert!(config.credentials.is_none());
        assert_eq!(config.max_queued_messages, DEFAULT_MAX_QUEUED_MESSAGES);
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn test_authentication_needs_both_parts() {
        let config = EventSourceConfig::new("/events").authentication("admin", "");
        assert!(config.credentials.is_none());

        let config = EventSourceConfig::new("/events").authentication("admin", "secret");
        assert_eq!(
            config.credentials,
            Some(Credentials {
                username: "admin".into(),
                password: "secret".into(),
            })
        );
    }

    #[test]
    fn test_builder_chaining() {
        let config = EventSourceConfig::new("/stream")
            .realm("metrics")
            .max_queued_messages(0)
            .default_header("Access-Control-Allow-Origin", "*");

        assert_eq!(config.realm, "metrics");
        assert_eq!(config.max_queued_messages, 1);
        assert_eq!(config.default_headers.len(), 1);
    }
}
