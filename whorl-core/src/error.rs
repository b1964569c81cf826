use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhorlError {
    #[error("No server specified for query: {0}")]
    NoServerSpecified(String),

    #[error("Connect failed to {server} after {attempts} attempt(s): {last_error}")]
    Connect {
        server: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Timeout reading from {0}")]
    ReadTimeout(String),

    #[error("Can't find {0} handler")]
    UnknownHandler(String),

    #[error("Malformed server specification: {0}")]
    MalformedServerSpec(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid field path in handler table: {0}")]
    InvalidFieldPath(String),

    #[error("Response from {0} exceeds the size limit")]
    ResponseTooLarge(String),

    #[error("WHOIS I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WhorlError {
    /// Connect and HTTP failures already left their diagnostics on the
    /// descriptor, so the resolver must not log them a second time.
    pub fn is_recorded_by_transport(&self) -> bool {
        matches!(self, WhorlError::Connect { .. } | WhorlError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, WhorlError>;
