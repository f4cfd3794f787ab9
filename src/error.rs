//! Typed error taxonomy shared across the pipeline.
//!
//! Every fallible pipeline operation returns one of four variants, so
//! callers branch on the error's type rather than inspecting message text.
//! The HTTP layer maps each variant to a status code; the CLI surfaces them
//! through `anyhow`.

use thiserror::Error;

/// Which external service a call was made against. Tags
/// [`Error::ExternalService`] so operators can tell a failed embedding call
/// from a failed generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embedding,
    Classification,
    Generation,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Embedding => f.write_str("embedding"),
            Service::Classification => f.write_str("classification"),
            Service::Generation => f.write_str("generation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A call to an external service failed after retries were exhausted.
    #[error("{service} service call failed: {message}")]
    ExternalService { service: Service, message: String },

    /// A referenced entity does not exist (or has expired).
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller's input was rejected before any side effect.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A snapshot or other stored artifact could not be read or written.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl Error {
    pub fn external(service: Service, message: impl Into<String>) -> Self {
        Error::ExternalService {
            service,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_message_names_the_service() {
        let err = Error::external(Service::Embedding, "HTTP 503");
        assert_eq!(err.to_string(), "embedding service call failed: HTTP 503");
    }

    #[test]
    fn test_variant_messages() {
        assert_eq!(
            Error::NotFound("session abc".into()).to_string(),
            "not found: session abc"
        );
        assert_eq!(
            Error::Validation("query too long".into()).to_string(),
            "invalid input: query too long"
        );
        assert_eq!(
            Error::Persistence("truncated snapshot".into()).to_string(),
            "persistence failure: truncated snapshot"
        );
    }
}
