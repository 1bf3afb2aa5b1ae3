//! Adwatch Core - Engagement tracking for instrumented video ads
//!
//! This crate provides the watch-session state machine used by every
//! tracker variant (native `<video>`, iframe players, GA4 or custom-store
//! backends):
//! - Cumulative watch time across pause/resume/replay
//! - Exactly-once progress milestones (25/50/75/100%)
//! - Exactly-once final report on page teardown
//! - Ordered delivery with retry while the analytics client loads
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Adwatch Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Playback   │  │  Lifecycle   │  │    Clock     │           │
//! │  │    Source    │  │   Signals    │  │              │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │    Watch    │  (driver: poll, unmute,      │
//! │                    │   Session   │   retry timers)              │
//! │                    │   Tracker   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │                    ┌──────┴──────┐     ┌──────────────┐         │
//! │                    │ Dispatcher  │────▶│  Event Sink  │         │
//! │                    └─────────────┘     └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod clock;
pub mod config;
pub mod source;
pub mod events;
pub mod sink;
pub mod dispatch;
pub mod session;
pub mod tracker;
pub mod scenario;
#[cfg(feature = "runtime")]
pub mod driver;

pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::TrackerConfig;
pub use source::{PlaybackEvent, PlaybackSource, SimulatedSource, SourceCommand};
pub use events::{EventRecord, SessionSummary, TrackingEvent};
pub use sink::{EventSink, JsonLinesSink, MemorySink, TracingSink};
#[cfg(feature = "beacon")]
pub use sink::BeaconSink;
pub use dispatch::{Delivery, Dispatcher};
pub use session::{SessionSnapshot, WatchSession};
pub use tracker::WatchSessionTracker;
pub use scenario::{Scenario, ScenarioRunner, Step};
#[cfg(feature = "runtime")]
pub use driver::{DriverHandle, LifecycleSignal, TrackerDriver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Adwatch Core initialized");
}
