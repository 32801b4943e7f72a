// ⚠️ Error taxonomy
// Every failure unwinds to the caller. Nothing in the library retries.

/// Main error type for the bidding integration layer
#[derive(Debug, thiserror::Error)]
pub enum BidError {
    /// A required environment variable is absent
    #[error("missing required configuration: {0}")]
    ConfigMissing(String),

    /// Network, auth or protocol failure talking to the model store
    #[error("model store unavailable: {0}")]
    RemoteUnavailable(String),

    /// Branch, commit or object id does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Expected key missing or of the wrong shape in a remote record
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Bad caller input (unknown category, malformed bid file)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl BidError {
    pub fn schema(message: impl Into<String>) -> Self {
        BidError::SchemaMismatch(message.into())
    }

    pub fn remote(message: impl Into<String>) -> Self {
        BidError::RemoteUnavailable(message.into())
    }
}

impl From<serde_json::Error> for BidError {
    fn from(err: serde_json::Error) -> Self {
        BidError::SchemaMismatch(format!("malformed object: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, BidError>;
