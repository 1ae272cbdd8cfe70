use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslatorError {
    /// The caller named a language identifier that is not in the catalog.
    #[error("Invalid language: {0}")]
    InvalidLanguage(String),

    /// A required request field (text, audio) was absent or empty.
    #[error("{0} required")]
    MissingInput(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Network failure or timeout talking to the upstream provider.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The provider understood the request and refused it.
    #[error("Upstream rejected request: {0}")]
    UpstreamRejected(String),

    #[error("Upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// A computed payload would exceed a transport ceiling.
    #[error("Payload too large: {size} bytes (max {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Relay error: {0}")]
    InternalRelay(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TranslatorError {
    /// Whether the error was caused by the caller's input rather than by
    /// the upstream provider or the service itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLanguage(_) | Self::MissingInput(_) | Self::MalformedInput(_)
        )
    }

    /// Short, stable label used for log fields and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidLanguage(_) => "invalid_language",
            Self::MissingInput(_) => "missing_input",
            Self::MalformedInput(_) => "malformed_input",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamRejected(_) => "upstream_rejected",
            Self::UpstreamAuth(_) => "upstream_auth",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InternalRelay(_) => "internal_relay",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_language_message() {
        let err = TranslatorError::InvalidLanguage("klingon".into());
        assert_eq!(err.to_string(), "Invalid language: klingon");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_missing_input_message() {
        let err = TranslatorError::MissingInput("Text".into());
        assert_eq!(err.to_string(), "Text required");
    }

    #[test]
    fn test_upstream_errors_are_not_client_errors() {
        assert!(!TranslatorError::UpstreamUnavailable("timeout".into()).is_client_error());
        assert!(
            !TranslatorError::PayloadTooLarge {
                size: 11,
                limit: 10
            }
            .is_client_error()
        );
        assert_eq!(
            TranslatorError::UpstreamRejected("bad audio".into()).kind(),
            "upstream_rejected"
        );
    }
}
