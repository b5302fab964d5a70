//! Newline-delimited JSON protocol spoken between [`crate::net::NetworkReader`]
//! and [`crate::server::serve`]. One request line, one response line.

use serde::{Deserialize, Serialize};

use crate::device::{DeviceInfo, InventoryRequest, RawTagRead, ReaderDevice};
use crate::error::{DeviceError, STATUS_SUCCESS};

pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Status replied to lines that do not parse as a request.
pub const STATUS_ILLEGAL_COMMAND: u8 = 0xFE;
/// Status replied to lines longer than [`MAX_MESSAGE_SIZE`].
pub const STATUS_LENGTH_ERROR: u8 = 0xFD;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReaderRequest {
    Connect,
    Disconnect,
    PollInventory { request: InventoryRequest },
    SetRegion { band: u8, max_index: u8, min_index: u8 },
    SetAntennaMask { persist: bool, mask: u16 },
    ReaderInfo,
    SerialNumber,
    StopImmediately,
    SetPower { dbm: u8 },
    SetBeep { enabled: bool },
    SetWritePower { packed: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponsePayload {
    #[default]
    Empty,
    Tags { tags: Vec<RawTagRead> },
    Info { info: DeviceInfo },
    Serial { serial: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderResponse {
    pub status: u8,
    #[serde(default)]
    pub payload: ResponsePayload,
}

impl ReaderResponse {
    pub fn ok(payload: ResponsePayload) -> Self {
        Self { status: STATUS_SUCCESS, payload }
    }

    pub fn status(code: u8) -> Self {
        Self { status: code, payload: ResponsePayload::Empty }
    }

    pub fn check(&self) -> Result<(), DeviceError> {
        DeviceError::check(self.status)
    }

    pub fn into_tags(self) -> Result<Vec<RawTagRead>, DeviceError> {
        self.check()?;
        match self.payload {
            ResponsePayload::Tags { tags } => Ok(tags),
            _ => Err(DeviceError::communication()),
        }
    }

    pub fn into_info(self) -> Result<DeviceInfo, DeviceError> {
        self.check()?;
        match self.payload {
            ResponsePayload::Info { info } => Ok(info),
            _ => Err(DeviceError::communication()),
        }
    }

    pub fn into_serial(self) -> Result<String, DeviceError> {
        self.check()?;
        match self.payload {
            ResponsePayload::Serial { serial } => Ok(serial),
            _ => Err(DeviceError::communication()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    InvalidJson,
    MessageTooLarge,
    SerializationError,
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::InvalidJson => write!(f, "Invalid JSON format"),
            ProtocolError::MessageTooLarge => write!(f, "Message exceeds buffer size"),
            ProtocolError::SerializationError => write!(f, "Serialization failed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Status byte sent back when a request line is rejected.
    pub fn status(self) -> u8 {
        match self {
            ProtocolError::MessageTooLarge => STATUS_LENGTH_ERROR,
            ProtocolError::InvalidJson | ProtocolError::SerializationError => STATUS_ILLEGAL_COMMAND,
        }
    }
}

pub fn parse_line<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge);
    }
    serde_json::from_str(trimmed).map_err(|_| ProtocolError::InvalidJson)
}

/// Serialize `message` followed by the line terminator.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message).map_err(|_| ProtocolError::SerializationError)?;
    if line.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge);
    }
    line.push('\n');
    Ok(line)
}

/// Execute one request against a local device.
pub fn dispatch(device: &dyn ReaderDevice, request: &ReaderRequest) -> ReaderResponse {
    let result = match request {
        ReaderRequest::Connect => device.connect().map(|_| ResponsePayload::Empty),
        ReaderRequest::Disconnect => device.disconnect().map(|_| ResponsePayload::Empty),
        ReaderRequest::PollInventory { request } => device
            .poll_inventory(request)
            .map(|tags| ResponsePayload::Tags { tags }),
        ReaderRequest::SetRegion { band, max_index, min_index } => device
            .set_region(*band, *max_index, *min_index)
            .map(|_| ResponsePayload::Empty),
        ReaderRequest::SetAntennaMask { persist, mask } => {
            device.set_antenna_mask(*persist, *mask).map(|_| ResponsePayload::Empty)
        }
        ReaderRequest::ReaderInfo => device.reader_info().map(|info| ResponsePayload::Info { info }),
        ReaderRequest::SerialNumber => device.serial_number().map(|serial| ResponsePayload::Serial { serial }),
        ReaderRequest::StopImmediately => device.stop_immediately().map(|_| ResponsePayload::Empty),
        ReaderRequest::SetPower { dbm } => device.set_power(*dbm).map(|_| ResponsePayload::Empty),
        ReaderRequest::SetBeep { enabled } => device.set_beep(*enabled).map(|_| ResponsePayload::Empty),
        ReaderRequest::SetWritePower { packed } => {
            device.set_write_power(*packed).map(|_| ResponsePayload::Empty)
        }
    };

    match result {
        Ok(payload) => ReaderResponse::ok(payload),
        Err(e) => ReaderResponse::status(e.code()),
    }
}
