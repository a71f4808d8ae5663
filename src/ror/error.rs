use thiserror::Error;

use crate::error::CorpusError;
use crate::models::FailureKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("still rate limited after {waits} waits")]
    RateLimitExhausted { waits: u32 },
    #[error("gave up after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl LookupError {
    /// Whether the failure came from a condition that may clear up on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LookupError::RateLimitExhausted { .. }
                | LookupError::AttemptsExhausted { .. }
                | LookupError::Transport(_)
        )
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            LookupError::RateLimitExhausted { .. } => FailureKind::RateLimited,
            _ => FailureKind::Remote,
        }
    }
}

impl From<LookupError> for CorpusError {
    fn from(err: LookupError) -> Self {
        CorpusError::RemoteError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_exhaustion_maps_to_its_own_kind() {
        assert_eq!(
            LookupError::RateLimitExhausted { waits: 3 }.failure_kind(),
            FailureKind::RateLimited
        );
        assert_eq!(LookupError::Status(400).failure_kind(), FailureKind::Remote);
        assert!(!LookupError::Status(400).is_transient());
        assert!(LookupError::Transport("reset".into()).is_transient());
    }
}
