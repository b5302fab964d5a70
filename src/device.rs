//! The Device Facade: the single seam between inventory logic and the vendor
//! reader. Everything that talks bytes to hardware lives behind [`ReaderDevice`].

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::error::{DeviceError, ReaderError};

/// Hardware limit of the antenna multiplexer (one bit per antenna in a `u16` mask).
pub const MAX_ANTENNAS: usize = 16;
pub const MIN_POWER_DBM: u8 = 0;
pub const MAX_POWER_DBM: u8 = 33;
/// Power byte reported by `reader_info` once power is configured per antenna.
pub const POWER_PER_ANTENNA: u8 = 0xFF;

const_assert!(MAX_ANTENNAS <= u16::BITS as usize);

/// Gen2 session used for inventory rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Session {
    S0,
    S1,
    S2,
    S3,
}

impl Session {
    pub fn code(self) -> u8 {
        match self {
            Session::S0 => 0,
            Session::S1 => 1,
            Session::S2 => 2,
            Session::S3 => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Session::S0),
            1 => Some(Session::S1),
            2 => Some(Session::S2),
            3 => Some(Session::S3),
            _ => None,
        }
    }

    /// S2/S3 inventoried flags persist between rounds, so suppressed tags
    /// only answer once the queried target flips.
    pub fn is_persistent(self) -> bool {
        matches!(self, Session::S2 | Session::S3)
    }
}

/// Inventoried-flag value queried in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    A,
    B,
}

impl Target {
    pub fn bit(self) -> u8 {
        match self {
            Target::A => 0,
            Target::B => 1,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Target::A => Target::B,
            Target::B => Target::A,
        }
    }
}

/// Anti-collision target policy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    A,
    B,
    /// Start at A and flip after enough consecutive empty polls.
    Auto,
}

impl TargetMode {
    pub fn initial_target(self) -> Target {
        match self {
            TargetMode::A | TargetMode::Auto => Target::A,
            TargetMode::B => Target::B,
        }
    }
}

/// Inventory round parameters shared by every poll of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryParams {
    pub q_value: u8,
    pub session: Session,
    pub target_mode: TargetMode,
    /// Scan-time budget per poll, in units of 100 ms.
    pub scan_time: u8,
}

impl InventoryParams {
    pub fn new(q_value: u8, session: Session, target_mode: TargetMode, scan_time: u8) -> Result<Self, ReaderError> {
        if q_value > 15 {
            return Err(ReaderError::Validation(format!("Q value must be between 0 and 15, got {}", q_value)));
        }
        if scan_time == 0 {
            return Err(ReaderError::Validation("scan time must be at least 1 (x100 ms)".to_string()));
        }
        Ok(Self { q_value, session, target_mode, scan_time })
    }

    pub fn scan_budget(&self) -> std::time::Duration {
        scan_budget(self.scan_time)
    }
}

fn scan_budget(scan_time: u8) -> std::time::Duration {
    std::time::Duration::from_millis(u64::from(scan_time) * 100)
}

impl Default for InventoryParams {
    fn default() -> Self {
        Self {
            q_value: 4,
            session: Session::S1,
            target_mode: TargetMode::Auto,
            scan_time: 10,
        }
    }
}

/// One inventory poll on one antenna.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRequest {
    /// Zero-based antenna index.
    pub antenna: u8,
    pub q_value: u8,
    pub session: Session,
    pub target: Target,
    pub scan_time: u8,
}

impl InventoryRequest {
    /// Longest the device may spend on this poll.
    pub fn scan_budget(&self) -> std::time::Duration {
        scan_budget(self.scan_time)
    }
}

/// A tag read exactly as the device reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTagRead {
    pub epc: String,
    pub rssi: i32,
    /// One-based antenna number.
    pub antenna: u8,
    pub device: String,
    pub mem_id: String,
}

/// Raw reader information block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Major and minor firmware version.
    pub version: [u8; 2],
    pub power: u8,
    pub band: u8,
    pub max_index: u8,
    pub min_index: u8,
    pub beep_enabled: bool,
    pub antenna_mask: u16,
}

/// Device Facade consumed by the inventory layer.
///
/// Implementations must be callable from the worker thread and from external
/// threads at the same time; `stop_immediately` in particular is issued while
/// `poll_inventory` is in flight.
pub trait ReaderDevice: Send + Sync {
    fn connect(&self) -> Result<(), DeviceError>;
    fn disconnect(&self) -> Result<(), DeviceError>;

    /// Run one inventory round. Blocks at most for the request's scan budget.
    fn poll_inventory(&self, request: &InventoryRequest) -> Result<Vec<RawTagRead>, DeviceError>;

    /// Argument order follows the vendor command: band, max index, min index.
    fn set_region(&self, band: u8, max_index: u8, min_index: u8) -> Result<(), DeviceError>;
    fn set_antenna_mask(&self, persist: bool, mask: u16) -> Result<(), DeviceError>;
    fn reader_info(&self) -> Result<DeviceInfo, DeviceError>;
    fn serial_number(&self) -> Result<String, DeviceError>;
    fn stop_immediately(&self) -> Result<(), DeviceError>;

    fn set_power(&self, dbm: u8) -> Result<(), DeviceError>;
    fn set_beep(&self, enabled: bool) -> Result<(), DeviceError>;
    fn set_write_power(&self, packed: u8) -> Result<(), DeviceError>;
}

/// Antenna numbers (one-based) enabled in `mask`, limited to `antenna_count`.
pub fn enabled_antennas(mask: u16, antenna_count: usize) -> Vec<u8> {
    (0..antenna_count.min(MAX_ANTENNAS))
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| bit as u8 + 1)
        .collect()
}

/// Pack a write-power request: bits 0..6 carry dBm, bit 7 the high-power flag.
pub fn pack_write_power(dbm: u8, high_power: bool) -> u8 {
    (dbm & 0x7F) | if high_power { 0x80 } else { 0x00 }
}
