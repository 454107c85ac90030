//! Error taxonomy for inspect-link resolution

/// Failure to parse an inspect-link string.
///
/// Parsing is deterministic, so every variant is permanent for the
/// given input: retrying the same string can never succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("string does not contain the inspect-link marker")]
    NotAnInspectLink,

    #[error("inspect-link marker present but parameter blob is empty")]
    Malformed,

    #[error("inspect-link parameter blob does not match any known format")]
    UnrecognizedFormat,
}

/// Typed failures surfaced by the resolution coordinator.
///
/// The boundary layer maps `code()` to an HTTP status and user message;
/// `is_retryable()` tells callers whether backing off and retrying the
/// same link can help.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The provided string is not a recognizable inspect link. Permanent.
    #[error("invalid inspect link: {0}")]
    InvalidLink(#[from] ParseError),

    /// No session had capacity within the deadline. Transient.
    #[error("no bot session had capacity within the deadline")]
    Busy,

    /// A session fault or not-ready condition interrupted an otherwise
    /// valid request. Transient; the next attempt will likely land on a
    /// different session.
    #[error("transient session failure: {0}")]
    TransientFailure(String),

    /// The coordinator returned data outside expected semantic ranges.
    /// Permanent for this asset; session health is unaffected.
    #[error("malformed coordinator response: {0}")]
    MalformedResponse(String),

    /// A bot's credentials were permanently rejected. Fatal for that
    /// session only; the pool keeps running with reduced capacity.
    #[error("bot credentials rejected: {0}")]
    ConfigurationFault(String),
}

impl ResolutionError {
    /// Stable error code for the request-submission boundary.
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionError::InvalidLink(_) => "invalid_link",
            ResolutionError::Busy => "busy",
            ResolutionError::TransientFailure(_) => "transient_failure",
            ResolutionError::MalformedResponse(_) => "malformed_response",
            ResolutionError::ConfigurationFault(_) => "configuration_fault",
        }
    }

    /// Whether the caller may retry the same link with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolutionError::Busy | ResolutionError::TransientFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            ResolutionError::InvalidLink(ParseError::NotAnInspectLink).code(),
            "invalid_link"
        );
        assert_eq!(ResolutionError::Busy.code(), "busy");
        assert_eq!(
            ResolutionError::TransientFailure("drop".into()).code(),
            "transient_failure"
        );
        assert_eq!(
            ResolutionError::MalformedResponse("wear 1.5".into()).code(),
            "malformed_response"
        );
        assert_eq!(
            ResolutionError::ConfigurationFault("bot-1".into()).code(),
            "configuration_fault"
        );
    }

    #[test]
    fn retryability_matches_taxonomy() {
        assert!(ResolutionError::Busy.is_retryable());
        assert!(ResolutionError::TransientFailure("x".into()).is_retryable());
        assert!(!ResolutionError::InvalidLink(ParseError::Malformed).is_retryable());
        assert!(!ResolutionError::MalformedResponse("x".into()).is_retryable());
        assert!(!ResolutionError::ConfigurationFault("x".into()).is_retryable());
    }

    #[test]
    fn parse_error_converts_to_invalid_link() {
        let err: ResolutionError = ParseError::UnrecognizedFormat.into();
        assert!(matches!(err, ResolutionError::InvalidLink(_)));
        assert!(err.to_string().contains("invalid inspect link"));
    }
}
