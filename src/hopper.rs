use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use heapless::Vec;
use static_assertions::const_assert;
use tracing::{debug, error, info};

use crate::channel::{ChannelError, ChannelPlan, ChannelSelection, FrequencySpec};
use crate::device::ReaderDevice;
use crate::error::DeviceError;

pub const MAX_HOP_CHANNELS: usize = 32;
const_assert!(MAX_HOP_CHANNELS >= 1);

/// Ordered channel selections cycled during one inventory run.
#[derive(Debug, Clone, PartialEq)]
pub struct HopPlan {
    selections: Vec<ChannelSelection, MAX_HOP_CHANNELS>,
    interval: Duration,
}

impl HopPlan {
    pub fn new(
        selections: impl IntoIterator<Item = ChannelSelection>,
        interval_ms: u64,
    ) -> Result<Self, ChannelError> {
        let mut collected: Vec<ChannelSelection, MAX_HOP_CHANNELS> = Vec::new();
        for selection in selections {
            collected
                .push(selection)
                .map_err(|_| ChannelError::HopPlanTooLong(MAX_HOP_CHANNELS))?;
        }
        if collected.is_empty() {
            return Err(ChannelError::EmptyHopPlan);
        }

        Ok(Self {
            selections: collected,
            interval: Duration::from_millis(interval_ms),
        })
    }

    /// Resolve every spec up front; the first bad spec aborts the whole plan.
    pub fn from_specs(plan: &ChannelPlan, specs: &[FrequencySpec], interval_ms: u64) -> Result<Self, ChannelError> {
        let selections = specs
            .iter()
            .map(|spec| plan.resolve(spec))
            .collect::<Result<std::vec::Vec<_>, _>>()?;
        Self::new(selections, interval_ms)
    }

    /// A plan that stays on one selection.
    pub fn single(selection: ChannelSelection) -> Self {
        let mut selections: Vec<ChannelSelection, MAX_HOP_CHANNELS> = Vec::new();
        // Fits: the capacity is asserted non-zero at compile time.
        selections.extend(core::iter::once(selection));
        Self { selections, interval: Duration::ZERO }
    }

    pub fn selections(&self) -> &[ChannelSelection] {
        &self.selections
    }

    pub fn first(&self) -> &ChannelSelection {
        &self.selections[0]
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Hopping needs more than one selection and a non-zero interval.
    pub fn hopping_enabled(&self) -> bool {
        self.selections.len() > 1 && !self.interval.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HopOutcome {
    Disabled,
    NotDue,
    /// Another hop holds the guard; this tick was dropped, not queued.
    InFlight,
    Hopped(ChannelSelection),
    Failed(ChannelSelection, DeviceError),
}

/// Time-driven region switching with a single-slot re-entrancy guard.
#[derive(Debug)]
pub struct FrequencyHopper {
    plan: HopPlan,
    cursor: AtomicUsize,
    last_hop: Mutex<Instant>,
    in_flight: AtomicBool,
}

struct HopGuard<'a>(&'a AtomicBool);

impl Drop for HopGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FrequencyHopper {
    /// The cursor starts on the plan's first selection, assumed already active.
    pub fn new(plan: HopPlan, started_at: Instant) -> Self {
        Self {
            plan,
            cursor: AtomicUsize::new(0),
            last_hop: Mutex::new(started_at),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn plan(&self) -> &HopPlan {
        &self.plan
    }

    pub fn current(&self) -> ChannelSelection {
        self.plan.selections[self.cursor.load(Ordering::Acquire)]
    }

    pub fn last_hop(&self) -> Instant {
        *self.last_hop.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_hop()) >= self.plan.interval
    }

    pub fn tick(&self, now: Instant, device: &dyn ReaderDevice) -> HopOutcome {
        if !self.plan.hopping_enabled() {
            return HopOutcome::Disabled;
        }
        if !self.is_due(now) {
            return HopOutcome::NotDue;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Skipping frequency hop, previous region change still in progress");
            return HopOutcome::InFlight;
        }
        let _guard = HopGuard(&self.in_flight);
        // A hop that finished between the first check and the guard resets the timer.
        if !self.is_due(now) {
            return HopOutcome::NotDue;
        }

        let len = self.plan.selections.len();
        let next_index = (self.cursor.load(Ordering::Acquire) + 1) % len;
        self.cursor.store(next_index, Ordering::Release);
        let next = self.plan.selections[next_index];

        let call_start = Instant::now();
        let result = device.set_region(next.band_id(), next.max_index(), next.min_index());
        let elapsed_ms = call_start.elapsed().as_millis() as u64;

        // Advance the timer even on failure so a dead link is not hammered.
        *self.last_hop.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;

        match result {
            Ok(()) => {
                info!(
                    band = next.band_id(),
                    min_index = next.min_index(),
                    max_index = next.max_index(),
                    elapsed_ms,
                    "Frequency changed to {:.3} ~ {:.3} MHz",
                    next.min_frequency(),
                    next.max_frequency()
                );
                HopOutcome::Hopped(next)
            }
            Err(e) => {
                error!(
                    band = next.band_id(),
                    min_index = next.min_index(),
                    max_index = next.max_index(),
                    elapsed_ms,
                    "Failed to change frequency to {:.3} ~ {:.3} MHz: {}",
                    next.min_frequency(),
                    next.max_frequency(),
                    e
                );
                HopOutcome::Failed(next, e)
            }
        }
    }
}
