//! Out-of-band control commands (the ioctl-equivalent surface).
//!
//! Wire form: an opcode from the fixed table below plus an optional integer
//! argument, currently unused and reserved for future commands.
//!
//! | opcode | command          | kind  |
//! |--------|------------------|-------|
//! | 0      | `RESET_COUNTER`  | write |
//! | 1      | `FORCE_ON`       | write |
//! | 2      | `FORCE_OFF`      | write |
//! | 3      | `ENABLE_NOTIFY`  | write |
//! | 4      | `DISABLE_NOTIFY` | write |
//! | 5      | `QUERY_STATUS`   | read  |

use alloc::string::String;

use crate::error::{DevError, DevResult};

/// A decoded control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ControlCommand {
    /// Zero the press counter.
    ResetCounter = 0,
    /// Switch the actuator on.
    ForceOn = 1,
    /// Switch the actuator off.
    ForceOff = 2,
    /// Surface readiness to pollers.
    EnableNotify = 3,
    /// Hide readiness from pollers.
    DisableNotify = 4,
    /// Return the status report as payload.
    QueryStatus = 5,
}

impl ControlCommand {
    /// Wire opcode of the command.
    #[inline]
    pub const fn opcode(self) -> u32 {
        self as u32
    }

    /// Whether the response carries a payload.
    #[inline]
    pub const fn is_query(self) -> bool {
        matches!(self, Self::QueryStatus)
    }
}

impl TryFrom<u32> for ControlCommand {
    type Error = DevError;

    fn try_from(opcode: u32) -> DevResult<Self> {
        Ok(match opcode {
            0 => Self::ResetCounter,
            1 => Self::ForceOn,
            2 => Self::ForceOff,
            3 => Self::EnableNotify,
            4 => Self::DisableNotify,
            5 => Self::QueryStatus,
            _ => return Err(DevError::InvalidCommand),
        })
    }
}

/// A control request as it arrives from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub opcode: u32,
    pub arg: Option<u64>,
}

impl ControlRequest {
    /// A request without argument.
    pub const fn new(opcode: u32) -> Self {
        Self { opcode, arg: None }
    }

    /// Attaches the optional argument.
    pub const fn with_arg(mut self, arg: u64) -> Self {
        self.arg = Some(arg);
        self
    }

    /// Decodes the opcode.
    pub fn command(&self) -> DevResult<ControlCommand> {
        ControlCommand::try_from(self.opcode)
    }
}

impl From<ControlCommand> for ControlRequest {
    fn from(command: ControlCommand) -> Self {
        Self::new(command.opcode())
    }
}

/// Successful control outcome. Only query commands carry a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlResponse {
    pub payload: Option<String>,
}

impl ControlResponse {
    pub(crate) const fn done() -> Self {
        Self { payload: None }
    }

    pub(crate) fn with_payload(payload: String) -> Self {
        Self {
            payload: Some(payload),
        }
    }
}
