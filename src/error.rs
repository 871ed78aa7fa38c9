use thiserror::Error;

/// Error reported by a native driver call.
///
/// Driver errors are plain values: code and message are captured at the
/// failing call, before any later call on the same handle can overwrite the
/// driver-side error state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    code: u32,
    message: String,
}

impl DriverError {
    /// Error carrying a driver-assigned code.
    #[must_use]
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Client-side error with no driver code.
    #[must_use]
    pub fn local(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    /// Driver error code; `0` for client-side errors.
    #[must_use]
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Human-readable error text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by connector operations.
///
/// Each operation fails with its own kind, so callers can tell a failed
/// connect from a failed statement without matching on message text.
/// Cancellation always wins: a canceled operation reports [`Error::Canceled`]
/// no matter how the native call came out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Allocating the native handle failed; the connection stays closed.
    #[error("open failed: {0}")]
    Open(#[source] DriverError),

    /// Establishing the session failed; the connection stays unconnected and
    /// the caller may retry.
    #[error("connect failed: {0}")]
    Connect(#[source] DriverError),

    /// A statement failed; the session remains usable.
    #[error("query failed: {0}")]
    Query(#[source] DriverError),

    /// Acquiring or materializing a result failed; the partial snapshot was
    /// rolled back.
    #[error("result error: {0}")]
    Result(#[source] DriverError),

    /// The operation's generation was stale at delivery time.
    #[error("operation canceled")]
    Canceled,

    /// Row access on a snapshot whose backing native result was released.
    #[error("result set expired")]
    ResultExpired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display_is_the_message() {
        let err = DriverError::new(1064, "syntax error near 'SELEC'");
        assert_eq!(err.to_string(), "syntax error near 'SELEC'");
        assert_eq!(err.code(), 1064);
    }

    #[test]
    fn local_errors_have_code_zero() {
        let err = DriverError::local("connection is not open");
        assert_eq!(err.code(), 0);
        assert_eq!(err.message(), "connection is not open");
    }

    #[test]
    fn operation_errors_prefix_their_stage() {
        let err = Error::Connect(DriverError::new(2003, "can't connect to server"));
        assert_eq!(err.to_string(), "connect failed: can't connect to server");
        assert_eq!(Error::Canceled.to_string(), "operation canceled");
        assert_eq!(Error::ResultExpired.to_string(), "result set expired");
    }
}
