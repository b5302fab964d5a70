use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::device::RawTagRead;

pub const TAG_EVENT_BUFFER_SIZE: usize = 1024;

/// Normalized tag read. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub epc: String,
    pub rssi: i32,
    pub antenna: u8,
    pub device_id: String,
    pub memory_bank: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl TagRecord {
    /// Returns `None` when the read carries no EPC.
    pub fn from_raw(raw: RawTagRead, timestamp: u64) -> Option<Self> {
        let epc: String = raw
            .epc
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if epc.is_empty() {
            return None;
        }

        Some(Self {
            epc,
            rssi: raw.rssi,
            antenna: raw.antenna,
            device_id: raw.device,
            memory_bank: raw.mem_id,
            timestamp,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagEvent {
    Read { record: TagRecord, first_seen: bool },
    /// Final notification of a run; nothing follows it until the next start.
    Stopped,
}

/// Receives raw reads from the worker and keeps the per-run dedup view.
#[derive(Debug)]
pub struct TagSink {
    seen: Mutex<HashMap<String, u64>>,
    events: broadcast::Sender<TagEvent>,
}

impl TagSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(TAG_EVENT_BUFFER_SIZE);
        Self {
            seen: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TagEvent> {
        self.events.subscribe()
    }

    pub fn on_tag(&self, raw: RawTagRead) -> Option<TagRecord> {
        let Some(record) = TagRecord::from_raw(raw, now_millis()) else {
            warn!("Tag received with an empty EPC, dropping it");
            return None;
        };

        let first_seen = {
            let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let count = seen.entry(record.epc.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };

        if first_seen {
            info!(epc = %record.epc, rssi = record.rssi, antenna = record.antenna, "Tag received");
        } else {
            debug!(epc = %record.epc, rssi = record.rssi, antenna = record.antenna, "Tag seen again");
        }

        // No subscribers is fine; the dedup view is still updated.
        let _ = self.events.send(TagEvent::Read { record: record.clone(), first_seen });
        Some(record)
    }

    /// Distinct EPCs of the current run.
    pub fn snapshot(&self) -> HashSet<String> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn read_count(&self, epc: &str) -> u64 {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(epc)
            .copied()
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }

    pub fn finish(&self) {
        debug!("Tag stream stopped");
        let _ = self.events.send(TagEvent::Stopped);
    }
}

impl Default for TagSink {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}
