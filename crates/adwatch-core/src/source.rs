//! Playback source abstraction
//!
//! A DOM `<video>` element and an embedded iframe player expose the same
//! capability set; adapters implement [`PlaybackSource`] and forward their
//! media callbacks as [`PlaybackEvent`]s.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Capability interface over a media player
pub trait PlaybackSource {
    /// Current play position in seconds
    fn current_time(&self) -> Result<f64>;

    /// Media duration in seconds (0 or NaN while metadata is loading)
    fn duration(&self) -> Result<f64>;

    /// Whether audio is muted
    fn is_muted(&self) -> Result<bool>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn mute(&mut self) -> Result<()>;

    fn unmute(&mut self) -> Result<()>;
}

impl<S: PlaybackSource + ?Sized> PlaybackSource for Box<S> {
    fn current_time(&self) -> Result<f64> {
        (**self).current_time()
    }

    fn duration(&self) -> Result<f64> {
        (**self).duration()
    }

    fn is_muted(&self) -> Result<bool> {
        (**self).is_muted()
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) -> Result<()> {
        (**self).pause()
    }

    fn mute(&mut self) -> Result<()> {
        (**self).mute()
    }

    fn unmute(&mut self) -> Result<()> {
        (**self).unmute()
    }
}

/// Media callbacks forwarded by a source adapter, in firing order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Play { position: f64 },
    Pause { position: f64 },
    Ended { position: f64 },
    TimeUpdate { position: f64 },
    VolumeChange { muted: bool },
    DurationChange { duration: f64 },
}

impl PlaybackEvent {
    /// DOM event name this maps to
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::Play { .. } => "play",
            PlaybackEvent::Pause { .. } => "pause",
            PlaybackEvent::Ended { .. } => "ended",
            PlaybackEvent::TimeUpdate { .. } => "timeupdate",
            PlaybackEvent::VolumeChange { .. } => "volumechange",
            PlaybackEvent::DurationChange { .. } => "durationchange",
        }
    }
}

/// Sanitize a time reading: non-finite or negative values mean "not ready"
pub(crate) fn checked_seconds(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::not_ready(format!("{what} reported {value}")))
    }
}

/// Guard for duration metadata: NaN, infinite, negative and zero values are
/// all "not loaded" rather than a real length
pub(crate) fn checked_duration(value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::MalformedDuration(value))
    }
}

/// Command issued to a [`SimulatedSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCommand {
    Play,
    Pause,
    Mute,
    Unmute,
}

#[derive(Debug, Default)]
struct SimulatedState {
    ready: bool,
    position: f64,
    duration: f64,
    muted: bool,
    playing: bool,
    commands: Vec<SourceCommand>,
}

/// In-memory player used by tests and scenario replay.
///
/// Clones share state so a test can keep a handle after moving the source
/// into a tracker.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedSource {
    /// A ready source with the given duration
    pub fn new(duration: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                ready: true,
                duration,
                ..Default::default()
            })),
        }
    }

    /// A source whose reads fail until [`SimulatedSource::set_ready`] is called
    pub fn not_ready() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatedState::default())),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.with(|s| s.ready = ready);
    }

    pub fn set_position(&self, position: f64) {
        self.with(|s| s.position = position);
    }

    pub fn set_duration(&self, duration: f64) {
        self.with(|s| s.duration = duration);
    }

    pub fn set_muted(&self, muted: bool) {
        self.with(|s| s.muted = muted);
    }

    pub fn is_playing(&self) -> bool {
        self.read(|s| s.playing)
    }

    /// Commands the tracker issued, oldest first
    pub fn commands(&self) -> Vec<SourceCommand> {
        self.read(|s| s.commands.clone())
    }

    fn with(&self, f: impl FnOnce(&mut SimulatedState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    fn read<T: Default>(&self, f: impl FnOnce(&SimulatedState) -> T) -> T {
        self.state.lock().map(|s| f(&s)).unwrap_or_default()
    }

    fn ready_read<T>(&self, what: &str, f: impl FnOnce(&SimulatedState) -> T) -> Result<T> {
        let state = self
            .state
            .lock()
            .map_err(|_| Error::Internal("simulated source poisoned".into()))?;
        if !state.ready {
            return Err(Error::not_ready(format!("{what} before player ready")));
        }
        Ok(f(&state))
    }

    fn command(&self, command: SourceCommand) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Internal("simulated source poisoned".into()))?;
        state.commands.push(command);
        match command {
            SourceCommand::Play => state.playing = true,
            SourceCommand::Pause => state.playing = false,
            SourceCommand::Mute => state.muted = true,
            SourceCommand::Unmute => state.muted = false,
        }
        Ok(())
    }
}

impl PlaybackSource for SimulatedSource {
    fn current_time(&self) -> Result<f64> {
        self.ready_read("currentTime", |s| s.position)
    }

    fn duration(&self) -> Result<f64> {
        self.ready_read("duration", |s| s.duration)
    }

    fn is_muted(&self) -> Result<bool> {
        self.ready_read("muted", |s| s.muted)
    }

    fn play(&mut self) -> Result<()> {
        self.command(SourceCommand::Play)
    }

    fn pause(&mut self) -> Result<()> {
        self.command(SourceCommand::Pause)
    }

    fn mute(&mut self) -> Result<()> {
        self.command(SourceCommand::Mute)
    }

    fn unmute(&mut self) -> Result<()> {
        self.command(SourceCommand::Unmute)
    }
}
