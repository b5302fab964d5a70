use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::channel::ChannelSelection;
use crate::device::{InventoryParams, InventoryRequest, ReaderDevice, Session, Target, TargetMode, MAX_ANTENNAS};
use crate::error::ReaderError;
use crate::hopper::{FrequencyHopper, HopPlan};
use crate::tags::TagSink;

/// Pause between antenna polls so the link is never saturated.
pub const POLL_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

/// Per-run anti-collision bookkeeping, owned by the worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySession {
    antenna_count: usize,
    cursor: usize,
    no_card_count: u32,
    target: Target,
    target_mode: TargetMode,
    persistent: bool,
}

impl InventorySession {
    pub fn new(antenna_count: usize, session: Session, target_mode: TargetMode) -> Self {
        Self {
            antenna_count,
            cursor: 0,
            no_card_count: 0,
            target: target_mode.initial_target(),
            target_mode,
            persistent: session.is_persistent(),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn antenna_bit(&self) -> u16 {
        1 << self.cursor
    }

    pub fn no_card_count(&self) -> u32 {
        self.no_card_count
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Feed the outcome of one poll. Returns `true` when the target flipped.
    ///
    /// Empty polls accumulate; once more than `antenna_count` pile up in auto
    /// mode the target flips so tags parked on the other flag answer again.
    /// S0/S1 flags do not persist between rounds, so those sessions never count.
    pub fn record_poll(&mut self, tag_count: usize) -> bool {
        if tag_count > 0 || !self.persistent {
            self.no_card_count = 0;
            return false;
        }

        self.no_card_count = self.no_card_count.saturating_add(1);
        if self.target_mode == TargetMode::Auto && self.no_card_count as usize > self.antenna_count {
            self.target = self.target.flipped();
            self.no_card_count = 0;
            return true;
        }
        false
    }

    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.antenna_count;
    }
}

/// Cooperative cancellation flag shared by `stop()` and the worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Control {
    state: RunState,
    token: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
    hopper: Option<Arc<FrequencyHopper>>,
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Continuous multi-antenna inventory on a dedicated worker thread.
pub struct InventoryScheduler {
    device: Arc<dyn ReaderDevice>,
    sink: Arc<TagSink>,
    antenna_mask: Arc<AtomicU16>,
    params: InventoryParams,
    shared: Arc<Shared>,
}

impl InventoryScheduler {
    pub fn new(
        device: Arc<dyn ReaderDevice>,
        sink: Arc<TagSink>,
        antenna_mask: Arc<AtomicU16>,
        params: InventoryParams,
    ) -> Self {
        Self {
            device,
            sink,
            antenna_mask,
            params,
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: RunState::Idle,
                    token: None,
                    worker: None,
                    hopper: None,
                }),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() != RunState::Idle
    }

    pub fn params(&self) -> InventoryParams {
        self.params
    }

    /// Channel selection the hopper last switched to, while a run is active.
    pub fn current_selection(&self) -> Option<ChannelSelection> {
        self.shared.lock().hopper.as_ref().map(|hopper| hopper.current())
    }

    /// Spawn the worker. Anything but `Idle` yields `AlreadyRunning`.
    pub fn start(&self, antenna_count: usize, hop_plan: HopPlan) -> Result<(), ReaderError> {
        if antenna_count == 0 || antenna_count > MAX_ANTENNAS {
            return Err(ReaderError::Validation(format!(
                "antenna count must be between 1 and {}, got {}",
                MAX_ANTENNAS, antenna_count
            )));
        }

        let mut control = self.shared.lock();
        if control.state != RunState::Idle {
            return Err(ReaderError::AlreadyRunning);
        }

        self.sink.clear();
        let token = CancellationToken::new();
        let hopper = Arc::new(FrequencyHopper::new(hop_plan, Instant::now()));

        let worker = Worker {
            device: Arc::clone(&self.device),
            sink: Arc::clone(&self.sink),
            antenna_mask: Arc::clone(&self.antenna_mask),
            params: self.params,
            hopper: Arc::clone(&hopper),
            token: token.clone(),
            shared: Arc::clone(&self.shared),
            session: InventorySession::new(antenna_count, self.params.session, self.params.target_mode),
        };

        // The lock is held across the spawn, so the worker cannot report Idle
        // before its handle is stored.
        let handle = thread::Builder::new()
            .name("inventory-worker".to_string())
            .spawn(move || worker.run())?;

        control.state = RunState::Running;
        control.token = Some(token);
        control.worker = Some(handle);
        control.hopper = Some(hopper);

        info!(antenna_count, session = ?self.params.session, target_mode = ?self.params.target_mode, "Inventory started");
        Ok(())
    }

    /// Cancel the run and block until the worker has fully exited.
    pub fn stop(&self) {
        let started = Instant::now();
        let mut control = self.shared.lock();

        match control.state {
            RunState::Idle => return,
            RunState::Stopping => {
                let _idle = self
                    .shared
                    .idle
                    .wait_while(control, |c| c.state != RunState::Idle)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                return;
            }
            RunState::Running => {}
        }

        control.state = RunState::Stopping;
        let token = control.token.take();
        let worker = control.worker.take();
        drop(control);

        if let Some(token) = token {
            token.cancel();
        }
        // Cut the in-flight poll short instead of waiting out its scan budget.
        if let Err(e) = self.device.stop_immediately() {
            warn!("Stop-immediately command failed: {}", e);
        }

        let control = self
            .shared
            .idle
            .wait_while(self.shared.lock(), |c| c.state != RunState::Idle)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(control);

        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("Inventory worker panicked during shutdown");
            }
        }

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Inventory stopped");
    }
}

impl Drop for InventoryScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    device: Arc<dyn ReaderDevice>,
    sink: Arc<TagSink>,
    antenna_mask: Arc<AtomicU16>,
    params: InventoryParams,
    hopper: Arc<FrequencyHopper>,
    token: CancellationToken,
    shared: Arc<Shared>,
    session: InventorySession,
}

/// Runs on every worker exit path, including panics.
struct ExitNotifier {
    sink: Arc<TagSink>,
    shared: Arc<Shared>,
}

impl Drop for ExitNotifier {
    fn drop(&mut self) {
        self.sink.finish();
        let mut control = self.shared.lock();
        control.state = RunState::Idle;
        control.hopper = None;
        control.token = None;
        drop(control);
        self.shared.idle.notify_all();
    }
}

impl Worker {
    fn run(mut self) {
        let _exit = ExitNotifier {
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
        };

        while !self.token.is_cancelled() {
            if self.antenna_mask.load(Ordering::Acquire) & self.session.antenna_bit() != 0 {
                self.poll_current_antenna();
            }

            thread::sleep(POLL_DELAY);
            self.session.advance();

            if self.token.is_cancelled() {
                break;
            }
            self.hopper.tick(Instant::now(), self.device.as_ref());
        }

        debug!("Inventory worker leaving its loop");
    }

    fn poll_current_antenna(&mut self) {
        let request = InventoryRequest {
            antenna: self.session.cursor() as u8,
            q_value: self.params.q_value,
            session: self.params.session,
            target: self.session.target(),
            scan_time: self.params.scan_time,
        };

        let tag_count = match self.device.poll_inventory(&request) {
            Ok(reads) => {
                let count = reads.len();
                for read in reads {
                    self.sink.on_tag(read);
                }
                count
            }
            Err(e) => {
                warn!(antenna = request.antenna + 1, "Inventory poll failed: {}", e);
                0
            }
        };

        if self.session.record_poll(tag_count) {
            debug!(query_target = ?self.session.target(), "No tags for a full cycle, switching query target");
        }
    }
}
