use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ChannelError;

/// Status byte returned by the reader for every command. `0x00` is success.
pub const STATUS_SUCCESS: u8 = 0x00;
/// Status used for transport-level failures (socket errors, timeouts, bad replies).
pub const STATUS_COMMUNICATION_ERROR: u8 = 0x30;
/// Status the device uses to reject out-of-range parameters.
pub const STATUS_PARAMETER_ERROR: u8 = 0xFF;

const STATUS_TABLE: &[(u8, &str)] = &[
    (0x00, "API is called successfully."),
    (0x01, "No find tag"),
    (0x05, "Access password error."),
    (0x09, "Kill password error."),
    (0x0A, "All-zero tag killing password is invalid."),
    (0x0B, "Command is not support by the tag"),
    (0x0C, "All-zero tag access password is invalid for such command."),
    (0x0D, "Fail to setup read protection for a protection enabled tag."),
    (0x0E, "Fail to unlock a protection disabled tag."),
    (0x10, "Some bytes stored in the tag are locked."),
    (0x11, "Lock operation failed."),
    (0x12, "Already locked, lock operation failed."),
    (0x13, "Fail to store the value of some preserved parameters. Configuration will still valid before reader shut down."),
    (0x14, "Modification failed."),
    (0x30, "Communication error."),
    (0xF8, "Error detected in antenna check."),
    (0xF9, "Operation failed."),
    (0xFA, "Tag is detected, but fails to complete operation due to poor communication."),
    (0xFB, "No tag is detected."),
    (0xFC, "Error code returned from tags."),
    (0xFD, "Command length error."),
    (0xFE, "Illegal command."),
    (0xFF, "Parameter error."),
];

/// Non-zero status reported by the Device Facade.
///
/// Carries the raw status byte; the hex form and the human readable
/// description are derived from the vendor status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceError {
    code: u8,
}

impl DeviceError {
    pub fn from_code(code: u8) -> Self {
        Self { code }
    }

    pub fn communication() -> Self {
        Self::from_code(STATUS_COMMUNICATION_ERROR)
    }

    /// Turn a raw status byte into a `Result`, treating `0x00` as success.
    pub fn check(code: u8) -> Result<(), DeviceError> {
        if code == STATUS_SUCCESS {
            Ok(())
        } else {
            Err(Self::from_code(code))
        }
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn hex(&self) -> String {
        format!("0x{:02X}", self.code)
    }

    pub fn message(&self) -> &'static str {
        status_message(self.code)
    }
}

impl core::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.message(), self.hex())
    }
}

impl std::error::Error for DeviceError {}

impl From<std::io::Error> for DeviceError {
    fn from(_: std::io::Error) -> Self {
        Self::communication()
    }
}

/// Description for a raw status byte, `"Unknown error code"` when unmapped.
pub fn status_message(code: u8) -> &'static str {
    STATUS_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map_or("Unknown error code", |(_, message)| message)
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("device communication error: {0}")]
    Device(#[from] DeviceError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ChannelError),

    #[error("inventory is already running")]
    AlreadyRunning,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("failed to spawn inventory worker: {0}")]
    Spawn(#[from] std::io::Error),
}
