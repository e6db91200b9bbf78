//! Error taxonomy for event device operations.
//!
//! Restricted-context code never produces these: it either schedules deferred
//! work or drops the trigger. Everything reachable from the client side or the
//! registration layer returns a [`DevResult`].

use core::fmt;

use axerrno::AxError;

/// Errors returned by instance, registry and handle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevError {
    /// The registry has no free slot.
    Exhausted,
    /// Non-blocking read with no unread event, or a write while the
    /// single write slot is still pending.
    WouldBlock,
    /// Unknown control opcode.
    InvalidCommand,
    /// The operation raced with teardown, or the id is not live.
    DeviceGone,
    /// Payload copy between client and core failed (e.g. the read buffer is
    /// shorter than the snapshot line).
    HandleFault,
    /// The client handle was closed.
    Closed,
    /// The trigger layer refused to attach the event source.
    TriggerAttach(AxError),
}

/// Result alias used across the crate.
pub type DevResult<T = ()> = Result<T, DevError>;

impl DevError {
    /// The errno-style error a transport layer should report.
    pub const fn as_ax_error(&self) -> AxError {
        match self {
            Self::Exhausted => AxError::StorageFull,
            Self::WouldBlock => AxError::WouldBlock,
            Self::InvalidCommand => AxError::InvalidInput,
            Self::DeviceGone => AxError::NotFound,
            Self::HandleFault => AxError::BadAddress,
            Self::Closed => AxError::BadState,
            Self::TriggerAttach(err) => *err,
        }
    }
}

impl From<DevError> for AxError {
    fn from(err: DevError) -> Self {
        err.as_ax_error()
    }
}

impl fmt::Display for DevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("no free device slot"),
            Self::WouldBlock => f.write_str("operation would block"),
            Self::InvalidCommand => f.write_str("invalid control command"),
            Self::DeviceGone => f.write_str("device is gone"),
            Self::HandleFault => f.write_str("payload copy failed"),
            Self::Closed => f.write_str("handle is closed"),
            Self::TriggerAttach(err) => write!(f, "trigger attach failed: {err:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(AxError::from(DevError::Exhausted), AxError::StorageFull);
        assert_eq!(AxError::from(DevError::WouldBlock), AxError::WouldBlock);
        assert_eq!(AxError::from(DevError::InvalidCommand), AxError::InvalidInput);
        assert_eq!(AxError::from(DevError::DeviceGone), AxError::NotFound);
        assert_eq!(AxError::from(DevError::HandleFault), AxError::BadAddress);
        assert_eq!(
            AxError::from(DevError::TriggerAttach(AxError::ResourceBusy)),
            AxError::ResourceBusy
        );
    }
}
