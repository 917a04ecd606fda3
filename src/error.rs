//! Error kinds surfaced by the vision pipeline.
//!
//! Every variant renders with a fixed prefix so callers can match on message text.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Invalid arguments: {0}")]
    InvalidArgument(String),

    #[error("{provider} OCR provider requires {var}.")]
    MissingCredential {
        provider: &'static str,
        var: &'static str,
    },

    #[error("Failed to resolve PDF source: {0}")]
    SourceResolution(String),

    /// Carries the configured duration, never the elapsed time.
    #[error("OCR request timed out after {0}ms.")]
    Timeout(u64),

    #[error("OCR provider request failed: {0}")]
    ProviderTransport(#[source] BoxError),

    #[error("OCR provider returned an unusable response ({status}): {body}")]
    ProviderResponse { status: u16, body: String },
}

impl VisionError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn source_resolution(msg: impl Into<String>) -> Self {
        Self::SourceResolution(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_deterministic() {
        let err = VisionError::MissingCredential {
            provider: "Mistral",
            var: "MISTRAL_API_KEY",
        };
        assert_eq!(err.to_string(), "Mistral OCR provider requires MISTRAL_API_KEY.");
        assert_eq!(
            VisionError::Timeout(10).to_string(),
            "OCR request timed out after 10ms."
        );
        assert!(VisionError::invalid("page must be >= 1")
            .to_string()
            .starts_with("Invalid arguments:"));
    }

    #[test]
    fn test_transport_error_keeps_cause() {
        let cause: BoxError = "connection reset".into();
        let err = VisionError::ProviderTransport(cause);
        assert_eq!(err.to_string(), "OCR provider request failed: connection reset");
        assert!(std::error::Error::source(&err).is_some());
    }
}
