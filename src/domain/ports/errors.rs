use thiserror::Error;

/// Errors from the external code generation service.
///
/// Failure is always signalled through this type; an empty file list in a
/// successful result is a legitimate "nothing to change" answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The request did not complete in time
    #[error("Generation request timed out")]
    Timeout,

    /// The service asked us to slow down (HTTP 429)
    #[error("Rate limit exceeded - too many requests")]
    RateLimited,

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Server-side failure (HTTP 5xx)
    #[error("Service unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The service refused the request (HTTP 4xx other than 429)
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be understood
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Timeout
                | GenerationError::RateLimited
                | GenerationError::Network(_)
                | GenerationError::Unavailable { .. }
        )
    }
}

/// Errors from the build verifier.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The verifier could not be reached or did not answer in time
    #[error("Verifier unavailable: {0}")]
    Unavailable(String),

    /// The verifier ran but could not produce a report
    #[error("Verification failed to run: {0}")]
    Execution(String),

    /// The verifier's report could not be understood
    #[error("Malformed verifier response: {0}")]
    Malformed(String),
}

impl VerifierError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, VerifierError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_generation_errors() {
        assert!(GenerationError::Timeout.is_transient());
        assert!(GenerationError::RateLimited.is_transient());
        assert!(GenerationError::Network("reset".to_string()).is_transient());
        assert!(GenerationError::Unavailable {
            status: 503,
            message: "busy".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_permanent_generation_errors() {
        assert!(!GenerationError::Malformed("no files".to_string()).is_transient());
        assert!(!GenerationError::Rejected {
            status: 400,
            message: "bad prompt".to_string()
        }
        .is_transient());
    }
}
