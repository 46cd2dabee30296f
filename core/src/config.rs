//! Client-level configuration: base URL and default headers.
//!
//! # Design
//! `ClientConfig` is plain serde data so a host can load it from whatever
//! configuration format it already uses. Headers are `(name, value)` pairs
//! compared case-insensitively; setting a header that already exists replaces
//! it rather than adding a duplicate.

use serde::{Deserialize, Serialize};

use crate::http::find_header;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default)]
    pub default_headers: Vec<(String, String)>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove_header(&name);
        self.default_headers.push((name, value.into()));
    }

    /// Returns `true` if a header was removed.
    pub fn remove_header(&mut self, name: &str) -> bool {
        let before = self.default_headers.len();
        self.default_headers
            .retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.default_headers.len() != before
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.default_headers, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_replaces_existing_name() {
        let config = ClientConfig::new("http://h")
            .with_header("Accept", "text/plain")
            .with_header("accept", "application/json");
        assert_eq!(config.default_headers.len(), 1);
        assert_eq!(config.header("ACCEPT"), Some("application/json"));
    }

    #[test]
    fn remove_header_reports_removal() {
        let mut config = ClientConfig::new("http://h").with_header("x-token", "abc");
        assert!(config.remove_header("X-Token"));
        assert!(!config.remove_header("X-Token"));
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn deserializes_with_default_headers_optional() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"http://localhost:3000"}"#).unwrap();
        assert_eq!(config, ClientConfig::new("http://localhost:3000"));

        let config: ClientConfig = serde_json::from_str(
            r#"{"base_url":"http://h","default_headers":[["accept","application/json"]]}"#,
        )
        .unwrap();
        assert_eq!(config.header("accept"), Some("application/json"));
    }
}
