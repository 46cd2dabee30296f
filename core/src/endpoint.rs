//! Joining a base URL and a relative path.

/// A base URL plus a path relative to it.
///
/// The join is plain concatenation with exactly one `/` between the two
/// halves; no other normalization is done, so query strings and interior
/// double slashes pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
    path: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
        }
    }

    /// The absolute URL. An empty path yields the base URL without a trailing slash.
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}
