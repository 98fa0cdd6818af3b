//! Errors raised by the OBS client

use std::time::Duration;

use thiserror::Error;

/// Failure talking to OBS
#[derive(Debug, Error)]
pub enum ObsError {
    /// Transport could not be established
    #[error("failed to connect to OBS: {0}")]
    Connection(String),

    /// The live session went away mid-request
    #[error("OBS connection closed: {0}")]
    ConnectionClosed(String),

    /// OBS rejected our identify message
    #[error("OBS authentication failed (code={code}): {reason}")]
    Authentication { code: u16, reason: String },

    /// OBS answered the request with a non-success status
    #[error("OBS request {request_type} failed (code={code}, comment={comment})")]
    RequestFailed {
        request_type: String,
        code: i64,
        comment: String,
    },

    /// No response within the request timeout
    #[error("OBS request {request_type} timed out after {after:?}")]
    Timeout {
        request_type: String,
        after: Duration,
    },

    /// Malformed or unexpected message
    #[error("OBS protocol error: {0}")]
    Protocol(String),
}

impl ObsError {
    /// Whether this error means the session is gone and the next request
    /// has to reconnect.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionClosed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lost_classification() {
        assert!(ObsError::ConnectionClosed("eof".into()).is_connection_lost());
        assert!(ObsError::Connection("refused".into()).is_connection_lost());
        assert!(!ObsError::RequestFailed {
            request_type: "GetSceneItemId".into(),
            code: 600,
            comment: "not found".into(),
        }
        .is_connection_lost());
    }

    #[test]
    fn test_request_failed_message() {
        let err = ObsError::RequestFailed {
            request_type: "SetInputMute".into(),
            code: 600,
            comment: "No source was found".into(),
        };
        assert_eq!(
            err.to_string(),
            "OBS request SetInputMute failed (code=600, comment=No source was found)"
        );
    }
}
