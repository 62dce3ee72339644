use thiserror::Error;

/// Errors returned by [`crate::ObjectStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a status the operation does not expect.
    #[error("{operation} {key} failed with HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        key: String,
        status: u16,
        body: String,
    },

    #[error("malformed listing XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid store response: {0}")]
    InvalidResponse(String),

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("listing {prefix} exceeded {pages} pages")]
    TooManyPages { prefix: String, pages: usize },

    #[error("in-memory store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// `true` for HTTP 5xx and 429 answers.
    #[must_use]
    pub fn is_transient_status(&self) -> bool {
        matches!(self, StoreError::Status { status, .. } if *status >= 500 || *status == 429)
    }
}
