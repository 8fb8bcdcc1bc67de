//! The return-code taxonomy shared by every layer of the runtime.
//!
//! Codes split into a retryable (transport-error) partition and a terminal one;
//! [`Code::is_retryable`] is a single method rather than an integer range check,
//! which is friendlier to exhaustive `match`.

use std::fmt;

/// Every outcome an attempt, a session, or a background task can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The call completed normally.
    Success,
    /// TCP connect failed or timed out. Retryable.
    ConnectFail,
    /// Writing the request to the socket failed. Retryable.
    SendFail,
    /// Reading the response from the socket failed. Retryable.
    RecvFail,
    /// The attempt's own deadline elapsed while waiting for I/O. Retryable.
    Timeout,
    /// Registering or re-registering with the reactor failed. Retryable.
    EpollFail,
    /// An error that does not fit another category but is safe to retry.
    InternalError,
    /// An error whose cause could not be classified. Retryable.
    Unknown,
    /// The peer closed the connection. Not retryable: the caller asked for something
    /// that will not get any better by retrying the same session.
    Disconnected,
    /// Bad options or a null/invalid argument was supplied.
    InvalidArgument,
    /// The session was cancelled by the caller or by a winning sibling attempt.
    Canceled,
    /// A sibling (backup or primary) attempt already completed the session.
    BackupSuccess,
    /// The load balancer had no alive endpoint to choose from.
    NoChoosableEndPoint,
    /// The response did not match the wire framing the protocol strategy expects.
    MessageNotMatch,
    /// The response matched the framing but failed to parse.
    ParseMessageFail,
    /// The requested feature or protocol is not registered.
    NotSupported,
}

impl Code {
    /// True iff this code falls in the transport-error range.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Code::ConnectFail
                | Code::SendFail
                | Code::RecvFail
                | Code::Timeout
                | Code::EpollFail
                | Code::InternalError
                | Code::Unknown
        )
    }

    /// True for [`Code::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, Code::Success)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "success",
            Code::ConnectFail => "connect failed",
            Code::SendFail => "send failed",
            Code::RecvFail => "receive failed",
            Code::Timeout => "timed out",
            Code::EpollFail => "reactor registration failed",
            Code::InternalError => "internal error",
            Code::Unknown => "unknown error",
            Code::Disconnected => "peer disconnected",
            Code::InvalidArgument => "invalid argument",
            Code::Canceled => "canceled",
            Code::BackupSuccess => "sibling attempt already succeeded",
            Code::NoChoosableEndPoint => "no choosable endpoint",
            Code::MessageNotMatch => "message does not match protocol framing",
            Code::ParseMessageFail => "failed to parse message",
            Code::NotSupported => "not supported",
        };
        f.write_str(s)
    }
}

/// The error type surfaced across crate boundaries; wraps a [`Code`] with an
/// optional human-readable detail (e.g. the OS error behind a `ConnectFail`).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}{}", detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct WrpcError {
    pub code: Code,
    pub detail: Option<String>,
}

impl WrpcError {
    pub fn new(code: Code) -> Self {
        Self { code, detail: None }
    }

    pub fn with_detail(code: Code, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Some(detail.into()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl From<Code> for WrpcError {
    fn from(code: Code) -> Self {
        WrpcError::new(code)
    }
}

pub type Result<T> = std::result::Result<T, WrpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_partition_covers_transport_errors_only() {
        for c in [
            Code::ConnectFail,
            Code::SendFail,
            Code::RecvFail,
            Code::Timeout,
            Code::EpollFail,
            Code::InternalError,
            Code::Unknown,
        ] {
            assert!(c.is_retryable(), "{c:?} should be retryable");
        }
        for c in [
            Code::Success,
            Code::Disconnected,
            Code::InvalidArgument,
            Code::Canceled,
            Code::BackupSuccess,
            Code::NoChoosableEndPoint,
            Code::MessageNotMatch,
            Code::ParseMessageFail,
            Code::NotSupported,
        ] {
            assert!(!c.is_retryable(), "{c:?} should not be retryable");
        }
    }

    #[test]
    fn display_includes_detail_when_present() {
        let err = WrpcError::with_detail(Code::ConnectFail, "ECONNREFUSED");
        assert_eq!(err.to_string(), "connect failed: ECONNREFUSED");
        let err = WrpcError::new(Code::Success);
        assert_eq!(err.to_string(), "success");
    }
}
