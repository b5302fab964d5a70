//! # uhfscan
//!
//! Continuous multi-antenna inventory for network-attached UHF RFID readers.
//!
//! ## Features
//!
//! - **Channel plans**: regulatory band registry, MHz window and index window resolution
//! - **Inventory scheduling**: round-robin antenna polling on a dedicated worker with Gen2 target toggling
//! - **Frequency hopping**: timed, non re-entrant rotation through configured channel windows
//! - **Tag stream**: per-run de-duplication plus a broadcast event feed
//! - **Transports**: a TCP reader facade and a simulated reader that can be served over TCP
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use uhfscan::{ChannelPlan, FrequencySpec, InventoryParams, SimulatedReader, UhfReader};
//!
//! let device = Arc::new(SimulatedReader::demo());
//! let reader = UhfReader::new(device, ChannelPlan::regulatory(), 4, InventoryParams::default())?;
//! reader.connect()?;
//!
//! let plan = reader.hop_plan(&[FrequencySpec::Range { min: 902.0, max: 907.5 }], 1_000)?;
//! reader.start(plan)?;
//! std::thread::sleep(Duration::from_millis(50));
//! reader.stop();
//!
//! println!("{} distinct tags", reader.snapshot_buffer().len());
//! # Ok::<(), uhfscan::ReaderError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`channel`] - band registry and channel selection
//! - [`device`] - the Device Facade trait and its wire-level types
//! - [`scheduler`] - inventory worker and anti-collision bookkeeping
//! - [`hopper`] - timed frequency hopping
//! - [`tags`] - tag normalization, de-duplication and events
//! - [`reader`] - the public reader handle tying it all together
//! - [`net`], [`server`], [`protocol`] - JSON-over-TCP transport
//! - [`simulator`] - in-process reader for demos and tests
//! - [`config`] - JSON configuration

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod hopper;
pub mod net;
pub mod protocol;
pub mod reader;
pub mod scheduler;
pub mod server;
pub mod simulator;
pub mod tags;

pub use channel::{frequency_for_index, Band, ChannelError, ChannelPlan, ChannelSelection, FrequencySpec};
pub use config::{Config, ConfigError};
pub use device::{InventoryParams, ReaderDevice, Session, Target, TargetMode};
pub use error::{DeviceError, ReaderError};
pub use hopper::{FrequencyHopper, HopOutcome, HopPlan};
pub use net::NetworkReader;
pub use reader::{ReaderInfo, UhfReader};
pub use scheduler::{InventoryScheduler, RunState};
pub use simulator::{SimTag, SimulatedReader};
pub use tags::{TagEvent, TagRecord, TagSink};
