#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use uhfscan::device::{DeviceInfo, InventoryRequest, RawTagRead, ReaderDevice};
use uhfscan::DeviceError;

/// Device double that replays fixed tag lists per antenna and records every call.
pub struct ScriptedReader {
    requests: Mutex<Vec<InventoryRequest>>,
    regions: Mutex<Vec<(u8, u8, u8)>>,
    responses: Mutex<HashMap<u8, Vec<RawTagRead>>>,
    poll_error: Mutex<Option<u8>>,
    region_error: Mutex<Option<u8>>,
    info: Mutex<DeviceInfo>,
    stop_calls: AtomicUsize,
    poll_delay: Duration,
    region_delay: Duration,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            regions: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            poll_error: Mutex::new(None),
            region_error: Mutex::new(None),
            info: Mutex::new(DeviceInfo {
                version: [1, 4],
                power: 30,
                band: 2,
                max_index: 49,
                min_index: 0,
                beep_enabled: true,
                antenna_mask: 0x000F,
            }),
            stop_calls: AtomicUsize::new(0),
            poll_delay: Duration::ZERO,
            region_delay: Duration::ZERO,
        }
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn with_region_delay(mut self, delay: Duration) -> Self {
        self.region_delay = delay;
        self
    }

    /// Tags returned by every poll of the zero-based `antenna`.
    pub fn respond(&self, antenna: u8, tags: Vec<RawTagRead>) {
        self.responses.lock().unwrap().insert(antenna, tags);
    }

    pub fn fail_polls(&self, code: Option<u8>) {
        *self.poll_error.lock().unwrap() = code;
    }

    pub fn fail_regions(&self, code: Option<u8>) {
        *self.region_error.lock().unwrap() = code;
    }

    pub fn requests(&self) -> Vec<InventoryRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Region changes as `(band, min_index, max_index)`.
    pub fn regions(&self) -> Vec<(u8, u8, u8)> {
        self.regions.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl ReaderDevice for ScriptedReader {
    fn connect(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn disconnect(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn poll_inventory(&self, request: &InventoryRequest) -> Result<Vec<RawTagRead>, DeviceError> {
        self.requests.lock().unwrap().push(*request);
        if !self.poll_delay.is_zero() {
            thread::sleep(self.poll_delay);
        }
        if let Some(code) = *self.poll_error.lock().unwrap() {
            return Err(DeviceError::from_code(code));
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&request.antenna)
            .cloned()
            .unwrap_or_default())
    }

    fn set_region(&self, band: u8, max_index: u8, min_index: u8) -> Result<(), DeviceError> {
        if !self.region_delay.is_zero() {
            thread::sleep(self.region_delay);
        }
        self.regions.lock().unwrap().push((band, min_index, max_index));
        if let Some(code) = *self.region_error.lock().unwrap() {
            return Err(DeviceError::from_code(code));
        }
        let mut info = self.info.lock().unwrap();
        info.band = band;
        info.max_index = max_index;
        info.min_index = min_index;
        Ok(())
    }

    fn set_antenna_mask(&self, _persist: bool, mask: u16) -> Result<(), DeviceError> {
        self.info.lock().unwrap().antenna_mask = mask;
        Ok(())
    }

    fn reader_info(&self) -> Result<DeviceInfo, DeviceError> {
        Ok(self.info.lock().unwrap().clone())
    }

    fn serial_number(&self) -> Result<String, DeviceError> {
        Ok("SCRIPTED01".to_string())
    }

    fn stop_immediately(&self) -> Result<(), DeviceError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_power(&self, dbm: u8) -> Result<(), DeviceError> {
        self.info.lock().unwrap().power = dbm;
        Ok(())
    }

    fn set_beep(&self, enabled: bool) -> Result<(), DeviceError> {
        self.info.lock().unwrap().beep_enabled = enabled;
        Ok(())
    }

    fn set_write_power(&self, _packed: u8) -> Result<(), DeviceError> {
        Ok(())
    }
}

pub fn raw_tag(epc: &str, antenna: u8) -> RawTagRead {
    RawTagRead {
        epc: epc.to_string(),
        rssi: -55,
        antenna,
        device: "192.168.1.200".to_string(),
        mem_id: "EPC".to_string(),
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
