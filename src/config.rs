// ⚙️ Configuration
// Read once at process start, then passed into the client explicitly.

use crate::error::{BidError, Result};
use std::fmt;

pub const TOKEN_ENV: &str = "SPECKLE_API";
pub const STREAM_ID_ENV: &str = "SPECKLE_STREAM_ID";
pub const HOST_ENV: &str = "SPECKLE_HOST";

pub const DEFAULT_HOST: &str = "https://app.speckle.systems";

/// Connection settings for the Speckle server
#[derive(Clone, PartialEq, Eq)]
pub struct SpeckleConfig {
    /// Server base URL without trailing slash
    pub host: String,

    /// Personal access token (bearer)
    pub token: String,

    /// Stream (project) holding the bid categories
    pub stream_id: String,
}

impl SpeckleConfig {
    pub fn new(host: impl Into<String>, token: impl Into<String>, stream_id: impl Into<String>) -> Self {
        let host: String = host.into();
        SpeckleConfig {
            host: host.trim_end_matches('/').to_string(),
            token: token.into(),
            stream_id: stream_id.into(),
        }
    }

    /// Load from `SPECKLE_API`, `SPECKLE_STREAM_ID` and optional `SPECKLE_HOST`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup (tests inject a map here)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| BidError::ConfigMissing(key.to_string()))
        };

        let token = required(TOKEN_ENV)?;
        let stream_id = required(STREAM_ID_ENV)?;
        let host = lookup(HOST_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        Ok(SpeckleConfig::new(host, token, stream_id))
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.host)
    }

    pub fn objects_url(&self) -> String {
        format!("{}/objects/{}", self.host, self.stream_id)
    }
}

// Keep the token out of logs
impl fmt::Debug for SpeckleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeckleConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("stream_id", &self.stream_id)
            .finish()
    }
}
