use std::collections::HashSet;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::channel::{ChannelPlan, ChannelSelection, FrequencySpec};
use crate::device::{
    enabled_antennas, pack_write_power, InventoryParams, ReaderDevice, MAX_ANTENNAS, MAX_POWER_DBM,
    MIN_POWER_DBM, POWER_PER_ANTENNA,
};
use crate::error::ReaderError;
use crate::hopper::HopPlan;
use crate::scheduler::{InventoryScheduler, RunState};
use crate::tags::{TagEvent, TagSink};

/// Decoded reader information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    pub version: String,
    /// `None` when power is configured per antenna.
    pub power: Option<u8>,
    pub band: u8,
    pub max_index: u8,
    pub min_index: u8,
    pub beep_enabled: bool,
    pub antenna_mask: u16,
    /// One-based numbers of the enabled antennas.
    pub antennas: Vec<u8>,
    pub serial: String,
}

/// Public handle over one network-attached reader.
///
/// Owns the Device Facade, the channel plan, the inventory scheduler and the
/// tag sink. Parameter changes go straight to the device and surface their
/// errors; inventory runs on the scheduler's worker thread.
pub struct UhfReader {
    device: Arc<dyn ReaderDevice>,
    channels: ChannelPlan,
    sink: Arc<TagSink>,
    antenna_mask: Arc<AtomicU16>,
    antenna_lock: Mutex<()>,
    start_lock: Mutex<()>,
    scheduler: InventoryScheduler,
    antennas: usize,
}

impl UhfReader {
    pub fn new(
        device: Arc<dyn ReaderDevice>,
        channels: ChannelPlan,
        antennas: usize,
        params: InventoryParams,
    ) -> Result<Self, ReaderError> {
        if antennas == 0 || antennas > MAX_ANTENNAS {
            return Err(ReaderError::Validation(format!(
                "antenna count must be between 1 and {}, got {}",
                MAX_ANTENNAS, antennas
            )));
        }

        let sink = Arc::new(TagSink::new());
        // Antenna 1 only until the device reports its real mask.
        let antenna_mask = Arc::new(AtomicU16::new(0x0001));
        let scheduler = InventoryScheduler::new(
            Arc::clone(&device),
            Arc::clone(&sink),
            Arc::clone(&antenna_mask),
            params,
        );

        Ok(Self {
            device,
            channels,
            sink,
            antenna_mask,
            antenna_lock: Mutex::new(()),
            start_lock: Mutex::new(()),
            scheduler,
            antennas,
        })
    }

    pub fn channel_plan(&self) -> &ChannelPlan {
        &self.channels
    }

    pub fn antenna_count(&self) -> usize {
        self.antennas
    }

    pub fn antenna_mask(&self) -> u16 {
        self.antenna_mask.load(Ordering::Acquire)
    }

    pub fn connect(&self) -> Result<(), ReaderError> {
        self.device.connect()?;
        let info = self.device.reader_info()?;
        self.antenna_mask.store(info.antenna_mask, Ordering::Release);
        info!(antenna_mask = format_args!("{:#06x}", info.antenna_mask), "Reader connected");
        Ok(())
    }

    /// Stop any running inventory, then drop the connection.
    pub fn close(&self) -> Result<(), ReaderError> {
        let started = Instant::now();
        self.scheduler.stop();
        self.device.disconnect()?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Reader closed");
        Ok(())
    }

    pub fn info(&self) -> Result<ReaderInfo, ReaderError> {
        let raw = self.device.reader_info()?;
        let serial = self.device.serial_number()?;
        self.antenna_mask.store(raw.antenna_mask, Ordering::Release);

        Ok(ReaderInfo {
            version: format!("{}.{}", raw.version[0], raw.version[1]),
            power: (raw.power != POWER_PER_ANTENNA).then_some(raw.power),
            band: raw.band,
            max_index: raw.max_index,
            min_index: raw.min_index,
            beep_enabled: raw.beep_enabled,
            antenna_mask: raw.antenna_mask,
            antennas: enabled_antennas(raw.antenna_mask, self.antennas),
            serial,
        })
    }

    pub fn set_power(&self, dbm: u8) -> Result<(), ReaderError> {
        validate_power(dbm)?;
        self.device.set_power(dbm)?;
        debug!(dbm, "Reader power updated");
        Ok(())
    }

    /// Enable or disable one antenna (one-based `position`).
    ///
    /// The new mask is published to a running worker immediately.
    pub fn set_antenna(&self, position: u8, enabled: bool, persist: bool) -> Result<(), ReaderError> {
        if position == 0 || usize::from(position) > self.antennas {
            return Err(ReaderError::Validation(format!(
                "antenna must be between 1 and {}, got {}",
                self.antennas, position
            )));
        }

        let _guard = self.antenna_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.device.reader_info()?.antenna_mask;
        let bit = 1u16 << (position - 1);
        let mask = if enabled { current | bit } else { current & !bit };

        self.device.set_antenna_mask(persist, mask)?;
        self.antenna_mask.store(mask, Ordering::Release);
        debug!(position, enabled, persist, mask = format_args!("{:#06x}", mask), "Antenna mask updated");
        Ok(())
    }

    pub fn set_beep(&self, enabled: bool) -> Result<(), ReaderError> {
        self.device.set_beep(enabled)?;
        Ok(())
    }

    /// Write power for tag-write operations; `high_power` sets bit 7.
    pub fn set_write_power(&self, dbm: u8, high_power: bool) -> Result<(), ReaderError> {
        validate_power(dbm)?;
        self.device.set_write_power(pack_write_power(dbm, high_power))?;
        Ok(())
    }

    pub fn set_frequency(&self, selection: &ChannelSelection) -> Result<(), ReaderError> {
        let started = Instant::now();
        self.device
            .set_region(selection.band_id(), selection.max_index(), selection.min_index())?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Region set to {}", selection);
        Ok(())
    }

    /// Build the hop plan for a run. With no specs the reader keeps the
    /// region it currently reports.
    pub fn hop_plan(&self, specs: &[FrequencySpec], interval_ms: u64) -> Result<HopPlan, ReaderError> {
        if !specs.is_empty() {
            return Ok(HopPlan::from_specs(&self.channels, specs, interval_ms)?);
        }

        let info = self.device.reader_info()?;
        let current = self
            .channels
            .resolve_by_index(info.band, info.min_index, info.max_index)?;
        Ok(HopPlan::single(current))
    }

    /// Apply the plan's first selection and start continuous inventory.
    pub fn start(&self, hop_plan: HopPlan) -> Result<(), ReaderError> {
        // Held until the worker is spawned so a losing caller never retunes the region.
        let _guard = self.start_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.scheduler.is_running() {
            return Err(ReaderError::AlreadyRunning);
        }
        self.set_frequency(hop_plan.first())?;
        self.scheduler.start(self.antennas, hop_plan)
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn state(&self) -> RunState {
        self.scheduler.state()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn current_selection(&self) -> Option<ChannelSelection> {
        self.scheduler.current_selection()
    }

    pub fn snapshot_buffer(&self) -> HashSet<String> {
        self.sink.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TagEvent> {
        self.sink.subscribe()
    }
}

fn validate_power(dbm: u8) -> Result<(), ReaderError> {
    if !(MIN_POWER_DBM..=MAX_POWER_DBM).contains(&dbm) {
        return Err(ReaderError::Validation(format!(
            "power must be between {} and {} dBm, got {}",
            MIN_POWER_DBM, MAX_POWER_DBM, dbm
        )));
    }
    Ok(())
}
