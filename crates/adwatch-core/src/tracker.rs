//! Watch Session Tracker - the playback state machine
//!
//! Consumes playback callbacks in firing order, keeps the [`WatchSession`]
//! up to date, and emits [`TrackingEvent`]s through the [`Dispatcher`].
//!
//! ```text
//!  Disabled ──enable──▶ Idle ──play──▶ Playing ◀──play── Paused
//!                                        │  └──pause──────▲  │
//!                                        └──ended──▶ Ended ◀─┘
//!                                                      └──play──▶ Playing
//! ```
//!
//! Instrumentation must never interrupt playback: every source read that
//! fails is logged and skipped, and no callback returns an error.

use crate::{
    clock::Clock,
    config::TrackerConfig,
    dispatch::{Delivery, Dispatcher},
    events::TrackingEvent,
    session::{SessionSnapshot, WatchSession},
    sink::EventSink,
    source::{checked_duration, checked_seconds, PlaybackEvent, PlaybackSource},
    types::{Milestone, SessionId, TeardownReason, TrackerState},
};
use tracing::{debug, info, warn};

pub struct WatchSessionTracker<S, K, C> {
    config: TrackerConfig,
    state: TrackerState,
    session: WatchSession,
    source: S,
    dispatcher: Dispatcher<K>,
    clock: C,
    /// Last observed mute state, for edge detection
    last_muted: Option<bool>,
    /// Last position any callback or poll reported
    last_position: f64,
    /// Muted autoplay requested; unmute once playback is confirmed
    autoplay_pending: bool,
}

impl<S: PlaybackSource, K: EventSink, C: Clock> WatchSessionTracker<S, K, C> {
    /// Create a tracker in the `Disabled` state
    pub fn new(config: TrackerConfig, source: S, sink: K, clock: C) -> Self {
        Self::with_session_id(config, source, sink, clock, SessionId::new())
    }

    pub fn with_session_id(config: TrackerConfig, source: S, sink: K, clock: C, session_id: SessionId) -> Self {
        let dispatcher = Dispatcher::new(
            sink,
            session_id,
            config.participant_id.clone(),
            config.max_pending_events,
        );

        Self {
            config,
            state: TrackerState::Disabled,
            session: WatchSession::new(),
            source,
            dispatcher,
            clock,
            last_muted: None,
            last_position: 0.0,
            autoplay_pending: false,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn session(&self) -> &WatchSession {
        &self.session
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn session_id(&self) -> SessionId {
        self.dispatcher.session_id()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        self.dispatcher.sink()
    }

    /// True while the milestone poll should be armed
    pub fn is_polling(&self) -> bool {
        self.state.is_playing() && self.session.has_started_once
    }

    /// True while muted autoplay is waiting to be unmuted
    pub fn autoplay_pending(&self) -> bool {
        self.autoplay_pending
    }

    pub fn has_pending_events(&self) -> bool {
        self.dispatcher.has_pending()
    }

    /// Retry events the sink could not accept earlier
    pub fn flush_pending(&mut self) -> usize {
        self.dispatcher.flush_pending()
    }

    /// Route a playback callback to its handler
    pub fn handle(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Play { position } => self.on_play(position),
            PlaybackEvent::Pause { position } => self.on_pause(position),
            PlaybackEvent::Ended { position } => self.on_ended(position),
            PlaybackEvent::TimeUpdate { position } => self.on_time_update(position),
            PlaybackEvent::VolumeChange { muted } => self.on_mute_change(muted),
            PlaybackEvent::DurationChange { duration } => self.on_duration_known(duration),
        }
    }

    /// Lift the gate after the user gesture and start muted autoplay.
    ///
    /// Returns false if tracking was already enabled.
    pub fn enable_tracking(&mut self) -> bool {
        if self.session.tracking_enabled {
            debug!("Tracking already enabled");
            return false;
        }

        self.session.tracking_enabled = true;
        self.transition(TrackerState::Idle);
        self.refresh_duration();

        // Browsers refuse unmuted autoplay until the gesture has propagated
        match self.source.mute() {
            Ok(()) => self.last_muted = Some(true),
            Err(e) => {
                warn!(code = e.error_code(), error = %e, "Could not mute before autoplay");
                self.last_muted = self.source.is_muted().ok();
            }
        }
        match self.source.play() {
            Ok(()) => self.autoplay_pending = true,
            Err(e) => warn!(code = e.error_code(), error = %e, "Autoplay request failed"),
        }

        info!(
            session_id = %self.session_id(),
            video_id = %self.config.video_id,
            "Tracking enabled"
        );
        true
    }

    /// Unmute after muted autoplay, once playback is confirmed.
    ///
    /// Called by the host `unmute_delay_ms` after the play callback. Returns
    /// true if the unmute was issued.
    pub fn confirm_autoplay(&mut self) -> bool {
        if !self.autoplay_pending || !self.state.is_playing() {
            return false;
        }
        self.autoplay_pending = false;

        match self.source.unmute() {
            Ok(()) => {
                debug!("Unmuted after autoplay");
                true
            }
            Err(e) => {
                warn!(code = e.error_code(), error = %e, "Unmute after autoplay failed");
                false
            }
        }
    }

    pub fn on_play(&mut self, position: f64) {
        if !self.session.tracking_enabled {
            debug!(position, "Play before tracking enabled, reverting");
            if let Err(e) = self.source.pause() {
                warn!(code = e.error_code(), error = %e, "Could not revert autonomous play");
            }
            return;
        }
        if !self.transition(TrackerState::Playing) {
            return;
        }

        self.refresh_duration();
        self.note_position(position);

        self.session.play_count += 1;
        self.session.begin_interval(self.clock.now());

        if !self.session.has_started_once {
            self.session.has_started_once = true;
            self.emit(TrackingEvent::VideoStart {
                duration: self.session.duration_seconds,
                video_id: self.config.video_id.clone(),
            });
        }

        let play_count = self.session.play_count;
        self.emit(TrackingEvent::VideoPlay {
            current_time: position,
            play_count,
            is_replay: play_count > 1,
        });
    }

    pub fn on_pause(&mut self, position: f64) {
        if self.state != TrackerState::Playing {
            return;
        }
        self.transition(TrackerState::Paused);
        self.note_position(position);

        let delta = self.session.close_interval(self.clock.now()).unwrap_or(0.0);
        self.emit(TrackingEvent::VideoPause {
            current_time: position,
            session_watch_time: delta,
            total_watch_time: self.session.accumulated_watch_seconds,
        });
    }

    /// Media reached its end. Native elements fire `pause` right before
    /// `ended`, so this is accepted from `Paused` as well.
    pub fn on_ended(&mut self, position: f64) {
        if !self.transition(TrackerState::Ended) {
            return;
        }
        self.note_position(position);

        self.session.close_interval(self.clock.now());
        self.session.completion_count += 1;
        info!(completions = self.session.completion_count, "Video completed");

        self.reach_milestone(Milestone::Complete, position);
    }

    /// `timeupdate`: raise the progress high-water mark
    pub fn on_time_update(&mut self, position: f64) {
        if !self.session.tracking_enabled {
            return;
        }
        self.note_position(position);
    }

    /// Metadata arrived; the first finite positive duration is kept
    pub fn on_duration_known(&mut self, duration: f64) {
        match checked_duration(duration) {
            Ok(duration) => {
                if self.session.record_duration(duration) {
                    debug!(duration, "Duration known");
                }
            }
            Err(e) => debug!(code = e.error_code(), error = %e, "Ignoring duration metadata"),
        }
    }

    /// Edge-triggered mute tracking
    pub fn on_mute_change(&mut self, muted: bool) {
        if !self.session.tracking_enabled {
            return;
        }
        let previous = self.last_muted.replace(muted);
        if previous.is_none() || previous == Some(muted) {
            return;
        }

        let current_time = self.read_position().unwrap_or(self.last_position);
        self.emit(TrackingEvent::VideoMuteToggle {
            is_muted: muted,
            current_time,
        });
    }

    /// One milestone poll tick. Returns milestones newly reached.
    ///
    /// A no-op outside `Playing`, while the source is not ready, or while the
    /// duration is unknown.
    pub fn poll_progress(&mut self) -> Vec<Milestone> {
        if !self.is_polling() {
            return Vec::new();
        }

        let position = match self.read_position() {
            Ok(position) => position,
            Err(e) => {
                debug!(code = e.error_code(), "Skipping progress tick");
                return Vec::new();
            }
        };

        self.refresh_duration();
        let Some(percent) = self.session.progress_percent(position) else {
            return Vec::new();
        };
        self.note_position(position);

        let mut reached = Vec::new();
        for milestone in Milestone::POLLED {
            if milestone.is_reached_by(percent) && self.reach_milestone(milestone, position) {
                reached.push(milestone);
            }
        }

        // Fallback for players that stop short of firing `ended`
        if Milestone::Complete.is_reached_by(percent) && self.reach_milestone(Milestone::Complete, position) {
            debug!(percent, "Completion milestone reached by poll");
            reached.push(Milestone::Complete);
        }

        reached
    }

    /// Final report on page teardown. Executes at most once per session.
    ///
    /// Returns `None` when nothing was sent (gated, already sent, or the
    /// session never accumulated a whole second of watch time).
    pub fn report_final_results(&mut self, reason: TeardownReason) -> Option<Delivery> {
        if !self.session.tracking_enabled || !self.session.has_started_once || self.session.final_report_sent {
            debug!(%reason, "Final report skipped");
            return None;
        }
        self.session.final_report_sent = true;

        let now = self.clock.now();
        if self.session.close_interval(now).is_some() {
            // Hidden tabs can come back; keep counting for later pause events
            self.session.begin_interval(now);
        }

        let summary = self.session.summary();
        if summary.total_watch_time_seconds == 0 {
            debug!(%reason, "No meaningful watch time, final report suppressed");
            return None;
        }

        info!(
            %reason,
            watch_seconds = summary.total_watch_time_seconds,
            plays = summary.play_count,
            completion_rate = summary.completion_rate,
            "Reporting session results"
        );
        Some(self.dispatcher.send_final(TrackingEvent::VideoSessionComplete(summary)))
    }

    /// Serializable view of the current session
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            tracking_enabled: self.session.tracking_enabled,
            play_count: self.session.play_count,
            completion_count: self.session.completion_count,
            watch_time_seconds: self.session.watch_time_at(self.clock.now()),
            duration_seconds: self.session.duration_seconds,
            max_progress_seconds: self.session.max_progress_seconds,
            milestones_reached: self.session.milestones_reached().collect(),
            completion_rate: self.session.completion_rate(),
            final_report_sent: self.session.final_report_sent,
        }
    }

    fn transition(&mut self, to: TrackerState) -> bool {
        let from = self.state;
        match from.transition_to(to) {
            Ok(state) => {
                self.state = state;
                debug!(%from, %to, "State transition");
                true
            }
            Err(e) => {
                debug!(code = e.error_code(), error = %e, "Ignoring callback");
                false
            }
        }
    }

    /// Insert and announce a milestone; false if it was already reached
    fn reach_milestone(&mut self, milestone: Milestone, position: f64) -> bool {
        if !self.session.reach(milestone) {
            return false;
        }
        info!(%milestone, position, "Milestone reached");
        self.emit(TrackingEvent::VideoProgress {
            milestone,
            current_time: position,
            total_watch_time_so_far: self.session.watch_time_at(self.clock.now()),
            play_count: self.session.play_count,
        });
        true
    }

    fn read_position(&self) -> crate::Result<f64> {
        self.source
            .current_time()
            .and_then(|t| checked_seconds(t, "currentTime"))
    }

    fn refresh_duration(&mut self) {
        if self.session.duration_seconds > 0.0 {
            return;
        }
        match self.source.duration().and_then(checked_duration) {
            Ok(duration) => self.on_duration_known(duration),
            Err(e) => debug!(code = e.error_code(), "Duration not available yet"),
        }
    }

    fn note_position(&mut self, position: f64) {
        if position.is_finite() && position >= 0.0 {
            self.last_position = position;
            self.session.record_position(position);
        }
    }

    fn emit(&mut self, event: TrackingEvent) {
        let name = event.name();
        let delivery = self.dispatcher.send(event);
        debug!(event = name, ?delivery, "Event dispatched");
    }
}
