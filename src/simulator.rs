//! In-process reader used by the simulator binary and the test-suite.
//!
//! Tags live on fixed antennas. In persistent sessions (S2/S3) each tag keeps
//! an inventoried flag: it answers only when the queried target matches the
//! flag and flips the flag once read, which is what makes the scheduler's
//! target toggling observable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::channel::ChannelPlan;
use crate::device::{DeviceInfo, InventoryRequest, RawTagRead, ReaderDevice, Target, MAX_POWER_DBM};
use crate::error::{DeviceError, STATUS_PARAMETER_ERROR};

const POLL_SLICE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTag {
    pub epc: String,
    /// One-based antenna the tag sits in front of.
    pub antenna: u8,
    pub rssi: i32,
}

impl SimTag {
    pub fn new(epc: &str, antenna: u8, rssi: i32) -> Self {
        Self { epc: epc.to_string(), antenna, rssi }
    }
}

#[derive(Debug)]
struct TagState {
    tag: SimTag,
    flag: Target,
}

#[derive(Debug)]
struct SimState {
    connected: bool,
    band: u8,
    max_index: u8,
    min_index: u8,
    power: u8,
    write_power: u8,
    beep: bool,
    antenna_mask: u16,
    tags: Vec<TagState>,
    poll_fault: Option<u8>,
    region_fault: Option<u8>,
    region_changes: Vec<(u8, u8, u8)>,
    polls: u64,
}

#[derive(Debug)]
pub struct SimulatedReader {
    state: Mutex<SimState>,
    stop_requested: AtomicBool,
    channels: ChannelPlan,
    poll_latency: Duration,
    antennas: usize,
    address: String,
    serial: String,
}

impl SimulatedReader {
    pub fn new(antennas: usize) -> Self {
        Self {
            state: Mutex::new(SimState {
                connected: false,
                band: 2,
                max_index: 49,
                min_index: 0,
                power: 30,
                write_power: 0,
                beep: true,
                antenna_mask: if antennas >= 16 { u16::MAX } else { (1u16 << antennas) - 1 },
                tags: Vec::new(),
                poll_fault: None,
                region_fault: None,
                region_changes: Vec::new(),
                polls: 0,
            }),
            stop_requested: AtomicBool::new(false),
            channels: ChannelPlan::regulatory(),
            poll_latency: Duration::from_millis(2),
            antennas,
            address: "127.0.0.1".to_string(),
            serial: "SIM00000001".to_string(),
        }
    }

    pub fn with_tags(self, tags: impl IntoIterator<Item = SimTag>) -> Self {
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    pub fn with_poll_latency(mut self, latency: Duration) -> Self {
        self.poll_latency = latency;
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// A small population spread over four antennas.
    pub fn demo() -> Self {
        Self::new(4).with_tags([
            SimTag::new("E28011700000020A1B2C3D01", 1, -48),
            SimTag::new("E28011700000020A1B2C3D02", 1, -55),
            SimTag::new("E28011700000020A1B2C3D03", 2, -61),
            SimTag::new("E28011700000020A1B2C3D04", 3, -52),
            SimTag::new("E28011700000020A1B2C3D05", 4, -67),
            SimTag::new("E28011700000020A1B2C3D06", 4, -70),
        ])
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_tag(&self, tag: SimTag) {
        self.lock().tags.push(TagState { tag, flag: Target::A });
    }

    pub fn remove_tag(&self, epc: &str) {
        self.lock().tags.retain(|state| state.tag.epc != epc);
    }

    /// Make every subsequent poll fail with `code` (`None` clears it).
    pub fn set_poll_fault(&self, code: Option<u8>) {
        self.lock().poll_fault = code;
    }

    pub fn set_region_fault(&self, code: Option<u8>) {
        self.lock().region_fault = code;
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Active `(band, min_index, max_index)`.
    pub fn region(&self) -> (u8, u8, u8) {
        let state = self.lock();
        (state.band, state.min_index, state.max_index)
    }

    /// Every accepted region change as `(band, min_index, max_index)`.
    pub fn region_changes(&self) -> Vec<(u8, u8, u8)> {
        self.lock().region_changes.clone()
    }

    pub fn poll_count(&self) -> u64 {
        self.lock().polls
    }

    pub fn power(&self) -> u8 {
        self.lock().power
    }

    pub fn write_power(&self) -> u8 {
        self.lock().write_power
    }

    pub fn beep(&self) -> bool {
        self.lock().beep
    }

    pub fn antenna_mask(&self) -> u16 {
        self.lock().antenna_mask
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.lock().connected {
            Ok(())
        } else {
            Err(DeviceError::communication())
        }
    }

    /// Sleep out the scan latency, capped at the poll's scan budget, unless a
    /// stop-immediately arrives first.
    fn wait_scan(&self, budget: Duration) {
        let deadline = Instant::now() + self.poll_latency.min(budget);
        while Instant::now() < deadline {
            if self.stop_requested.load(Ordering::Acquire) {
                debug!("Simulated poll interrupted by stop-immediately");
                return;
            }
            thread::sleep(POLL_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
}

impl ReaderDevice for SimulatedReader {
    fn connect(&self) -> Result<(), DeviceError> {
        self.lock().connected = true;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), DeviceError> {
        self.lock().connected = false;
        Ok(())
    }

    fn poll_inventory(&self, request: &InventoryRequest) -> Result<Vec<RawTagRead>, DeviceError> {
        self.ensure_connected()?;
        self.stop_requested.store(false, Ordering::Release);
        self.wait_scan(request.scan_budget());

        let mut state = self.lock();
        state.polls += 1;
        if let Some(code) = state.poll_fault {
            return Err(DeviceError::from_code(code));
        }
        if usize::from(request.antenna) >= self.antennas || state.power == 0 {
            return Ok(Vec::new());
        }
        let enabled = 1u16
            .checked_shl(u32::from(request.antenna))
            .is_some_and(|bit| state.antenna_mask & bit != 0);
        if !enabled {
            debug!(antenna = request.antenna + 1, "Poll on a disabled antenna");
            return Ok(Vec::new());
        }

        let antenna = request.antenna + 1;
        let persistent = request.session.is_persistent();
        let mut reads = Vec::new();
        for tag_state in state.tags.iter_mut().filter(|t| t.tag.antenna == antenna) {
            if persistent {
                if tag_state.flag != request.target {
                    continue;
                }
                tag_state.flag = tag_state.flag.flipped();
            }
            reads.push(RawTagRead {
                epc: tag_state.tag.epc.clone(),
                rssi: tag_state.tag.rssi,
                antenna,
                device: self.address.clone(),
                mem_id: "EPC".to_string(),
            });
        }
        Ok(reads)
    }

    fn set_region(&self, band: u8, max_index: u8, min_index: u8) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        let mut state = self.lock();
        if let Some(code) = state.region_fault {
            return Err(DeviceError::from_code(code));
        }
        if self.channels.resolve_by_index(band, min_index, max_index).is_err() {
            return Err(DeviceError::from_code(STATUS_PARAMETER_ERROR));
        }

        state.band = band;
        state.max_index = max_index;
        state.min_index = min_index;
        state.region_changes.push((band, min_index, max_index));
        Ok(())
    }

    fn set_antenna_mask(&self, _persist: bool, mask: u16) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        if mask == 0 {
            return Err(DeviceError::from_code(STATUS_PARAMETER_ERROR));
        }
        self.lock().antenna_mask = mask;
        Ok(())
    }

    fn reader_info(&self) -> Result<DeviceInfo, DeviceError> {
        self.ensure_connected()?;
        let state = self.lock();
        Ok(DeviceInfo {
            version: [2, 7],
            power: state.power,
            band: state.band,
            max_index: state.max_index,
            min_index: state.min_index,
            beep_enabled: state.beep,
            antenna_mask: state.antenna_mask,
        })
    }

    fn serial_number(&self) -> Result<String, DeviceError> {
        self.ensure_connected()?;
        Ok(self.serial.clone())
    }

    fn stop_immediately(&self) -> Result<(), DeviceError> {
        self.stop_requested.store(true, Ordering::Release);
        Ok(())
    }

    fn set_power(&self, dbm: u8) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        if dbm > MAX_POWER_DBM {
            return Err(DeviceError::from_code(STATUS_PARAMETER_ERROR));
        }
        self.lock().power = dbm;
        Ok(())
    }

    fn set_beep(&self, enabled: bool) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.lock().beep = enabled;
        Ok(())
    }

    fn set_write_power(&self, packed: u8) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.lock().write_power = packed;
        Ok(())
    }
}
