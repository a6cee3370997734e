/// Errors raised while initializing an adapter. Fatal: an adapter whose
/// `init` failed must not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config key: {0}")]
    MissingKey(String),
    #[error("unsupported config key: {0}")]
    UnknownKey(String),
    #[error("invalid value for config key {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("environment variable {0} is not set or empty")]
    MissingSecret(String),
    #[error("invalid storage account key: {0}")]
    InvalidAccountKey(String),
    #[error("invalid service endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("object store is already initialized")]
    AlreadyInitialized,
}

/// Errors raised by the data operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object store used before init")]
    NotInitialized,
    #[error(
        "storage service returned HTTP {status}{}: {message}",
        .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
    )]
    Service {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to read upload body: {0}")]
    Body(#[source] std::io::Error),
    #[error("malformed service response: {0}")]
    MalformedResponse(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    /// HTTP status reported by the remote service, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Service { status, .. } => Some(*status),
            StoreError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True only when the service answered 404. Errors without a status are
    /// never classified as not-found.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
