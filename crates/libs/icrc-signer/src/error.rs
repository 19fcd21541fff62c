use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures on the way to a consent message. They never reach the relying
/// party directly; the signer maps them to RPC errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignerError {
    #[error("consent message source failed: {0}")]
    ConsentSource(String),
    #[error("token metadata unavailable: {0}")]
    Metadata(String),
    #[error("cannot build a consent message: {0}")]
    Builder(String),
}

impl SignerError {
    pub fn consent_source(err: impl std::fmt::Display) -> Self {
        Self::ConsentSource(err.to_string())
    }

    pub fn metadata(err: impl std::fmt::Display) -> Self {
        Self::Metadata(err.to_string())
    }

    pub fn builder(reason: impl Into<String>) -> Self {
        Self::Builder(reason.into())
    }

    /// The underlying failure text, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::ConsentSource(message) | Self::Metadata(message) | Self::Builder(message) => {
                message
            }
        }
    }
}
