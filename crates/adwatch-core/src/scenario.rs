//! Scripted playback sessions
//!
//! A scenario is a timeline of viewer and page actions replayed against a
//! [`ManualClock`] and a [`SimulatedSource`], so the events a real session
//! would emit can be checked without a browser.
//!
//! ```toml
//! duration = 100.0
//! auto_poll = true
//!
//! [config]
//! video_id = "spring-ad"
//!
//! [[steps]]
//! at = 0.0
//! action = "enable"
//!
//! [[steps]]
//! at = 0.2
//! action = "play"
//! position = 0.0
//! ```

use crate::{
    clock::ManualClock,
    config::TrackerConfig,
    events::EventRecord,
    session::SessionSnapshot,
    sink::MemorySink,
    source::SimulatedSource,
    tracker::WatchSessionTracker,
    types::TeardownReason,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A scripted session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Duration the player reports (0 = metadata never loads)
    pub duration: f64,
    /// Issue poll ticks at the configured cadence while playing
    #[serde(default)]
    pub auto_poll: bool,
    #[serde(default)]
    pub config: TrackerConfig,
    pub steps: Vec<Step>,
}

/// One timeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Clock reading in seconds
    pub at: f64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// User gesture
    Enable,
    Play { position: f64 },
    Pause { position: f64 },
    Ended { position: f64 },
    /// Playhead moved without a state change
    Seek { position: f64 },
    Mute,
    Unmute,
    /// Metadata arrived
    Duration { seconds: f64 },
    /// One milestone poll; optionally move the playhead first
    Tick {
        #[serde(default)]
        position: Option<f64>,
    },
    /// Unmute delay elapsed
    ConfirmAutoplay,
    Teardown {
        #[serde(default = "default_reason")]
        reason: TeardownReason,
    },
    SinkOffline,
    SinkOnline,
    /// Retry held events
    Flush,
}

/// Upper bound on poll ticks an `auto_poll` replay may synthesize
pub const MAX_AUTO_POLL_TICKS: f64 = 1_000_000.0;

fn default_reason() -> TeardownReason {
    TeardownReason::Unload
}

impl Scenario {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a `.json` or `.toml` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(Error::InvalidScenario(format!("duration {} is not valid", self.duration)));
        }
        let mut previous = 0.0;
        for (i, step) in self.steps.iter().enumerate() {
            if !step.at.is_finite() || step.at < previous {
                return Err(Error::InvalidScenario(format!(
                    "step {i} at {} is out of order",
                    step.at
                )));
            }
            previous = step.at;
        }
        if self.auto_poll {
            let interval = self.config.poll_interval_ms as f64 / 1000.0;
            let ticks = previous / interval;
            if ticks > MAX_AUTO_POLL_TICKS {
                return Err(Error::InvalidScenario(format!(
                    "timeline of {previous}s would need {ticks:.0} poll ticks at {}ms",
                    self.config.poll_interval_ms
                )));
            }
        }
        Ok(())
    }
}

/// Result of replaying a scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub records: Vec<EventRecord>,
    pub snapshot: SessionSnapshot,
}

type SimTracker = WatchSessionTracker<SimulatedSource, MemorySink, ManualClock>;

/// Replays a [`Scenario`]
pub struct ScenarioRunner {
    scenario: Scenario,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario) -> Result<Self> {
        scenario.validate()?;
        Ok(Self { scenario })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn run(&self) -> Result<ScenarioOutcome> {
        let source = SimulatedSource::new(self.scenario.duration);
        let sink = MemorySink::new();
        let clock = ManualClock::new();
        let mut tracker = WatchSessionTracker::new(
            self.scenario.config.clone(),
            source.clone(),
            sink.clone(),
            clock.clone(),
        );

        let mut playhead = Playhead::new(self.scenario.duration, self.scenario.config.poll_interval_ms);

        for step in &self.scenario.steps {
            if self.scenario.auto_poll {
                playhead.poll_until(step.at, &mut tracker, &source, &clock);
            }
            clock.set(step.at);
            debug!(at = step.at, action = ?step.action, "Scenario step");
            apply(&step.action, step.at, &mut tracker, &source, &sink, &mut playhead);
        }

        Ok(ScenarioOutcome {
            records: sink.records(),
            snapshot: tracker.snapshot(),
        })
    }
}

/// Where the simulated playhead is, for auto-polling
struct Playhead {
    duration: f64,
    interval: f64,
    /// (clock, position) when the current play interval began
    anchor: Option<(f64, f64)>,
    next_tick: Option<f64>,
}

impl Playhead {
    fn new(duration: f64, interval_ms: u64) -> Self {
        Self {
            duration,
            interval: interval_ms as f64 / 1000.0,
            anchor: None,
            next_tick: None,
        }
    }

    fn started(&mut self, at: f64, position: f64) {
        self.anchor = Some((at, position));
        self.next_tick = Some(at + self.interval);
    }

    fn stopped(&mut self) {
        self.anchor = None;
        self.next_tick = None;
    }

    fn position_at(&self, at: f64) -> Option<f64> {
        let (start, position) = self.anchor?;
        let moved = position + (at - start).max(0.0);
        Some(if self.duration > 0.0 { moved.min(self.duration) } else { moved })
    }

    fn poll_until(&mut self, until: f64, tracker: &mut SimTracker, source: &SimulatedSource, clock: &ManualClock) {
        while let Some(next) = self.next_tick {
            if next > until || !tracker.is_polling() {
                break;
            }
            clock.set(next);
            if let Some(position) = self.position_at(next) {
                source.set_position(position);
            }
            tracker.poll_progress();
            tracker.flush_pending();
            self.next_tick = Some(next + self.interval);
        }
    }
}

fn apply(
    action: &Action,
    at: f64,
    tracker: &mut SimTracker,
    source: &SimulatedSource,
    sink: &MemorySink,
    playhead: &mut Playhead,
) {
    match *action {
        Action::Enable => {
            tracker.enable_tracking();
        }
        Action::Play { position } => {
            source.set_position(position);
            let was_playing = tracker.state().is_playing();
            tracker.on_play(position);
            if !was_playing && tracker.state().is_playing() {
                playhead.started(at, position);
            }
        }
        Action::Pause { position } => {
            source.set_position(position);
            tracker.on_pause(position);
            playhead.stopped();
        }
        Action::Ended { position } => {
            source.set_position(position);
            tracker.on_ended(position);
            playhead.stopped();
        }
        Action::Seek { position } => {
            source.set_position(position);
            if playhead.anchor.is_some() {
                playhead.anchor = Some((at, position));
            }
            tracker.on_time_update(position);
        }
        Action::Mute => {
            source.set_muted(true);
            tracker.on_mute_change(true);
        }
        Action::Unmute => {
            source.set_muted(false);
            tracker.on_mute_change(false);
        }
        Action::Duration { seconds } => {
            source.set_duration(seconds);
            playhead.duration = seconds;
            tracker.on_duration_known(seconds);
        }
        Action::Tick { position } => {
            if let Some(position) = position {
                source.set_position(position);
            }
            tracker.poll_progress();
            tracker.flush_pending();
        }
        Action::ConfirmAutoplay => {
            if tracker.confirm_autoplay() {
                source.set_muted(false);
                tracker.on_mute_change(false);
            }
        }
        Action::Teardown { reason } => {
            tracker.report_final_results(reason);
        }
        Action::SinkOffline => sink.set_available(false),
        Action::SinkOnline => sink.set_available(true),
        Action::Flush => {
            tracker.flush_pending();
        }
    }
}
