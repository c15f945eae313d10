//! Fetch error types

use thiserror::Error;

/// Errors surfaced by the fetch collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Service unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failure attributed to a named service, which becomes its retry key
    #[error("{service}: {source}")]
    Service {
        service: String,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Attribute this error to `service`
    pub fn for_service(self, service: impl Into<String>) -> Self {
        FetchError::Service {
            service: service.into(),
            source: Box::new(self),
        }
    }

    /// Key used to deduplicate retries, if the error names its cause
    pub fn retry_key(&self) -> Option<&str> {
        match self {
            FetchError::Service { service, .. } => Some(service.as_str()),
            _ => None,
        }
    }

    /// Innermost error, skipping service attribution
    pub fn root(&self) -> &FetchError {
        match self {
            FetchError::Service { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;
