//! Async driver for the tracker
//!
//! All inputs (playback callbacks, lifecycle signals, and the driver's own
//! timers) are funnelled into one loop that owns the tracker, so callbacks
//! are applied one at a time in arrival order. Any number of
//! [`DriverHandle`] clones may feed the loop; teardown is idempotent in the
//! tracker itself.

use crate::{
    clock::Clock,
    session::SessionSnapshot,
    sink::EventSink,
    source::{PlaybackEvent, PlaybackSource},
    tracker::WatchSessionTracker,
    types::{TeardownReason, TrackerState},
    Error, Result,
};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument};

/// Signals from the page lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The user gesture happened
    EnableTracking,
    /// The page is hiding or unloading; may arrive several times
    Teardown(TeardownReason),
}

#[derive(Debug)]
enum DriverInput {
    Playback(PlaybackEvent),
    Lifecycle(LifecycleSignal),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

#[derive(Debug, Clone, Copy)]
enum TimerInput {
    PollTick,
    ConfirmAutoplay,
    RetryPending,
}

/// Cloneable producer feeding a running [`TrackerDriver`]
#[derive(Debug, Clone)]
pub struct DriverHandle {
    inputs: mpsc::Sender<DriverInput>,
    state_rx: watch::Receiver<TrackerState>,
}

impl DriverHandle {
    /// Forward a playback callback
    pub async fn playback(&self, event: PlaybackEvent) -> Result<()> {
        self.send(DriverInput::Playback(event)).await
    }

    pub async fn lifecycle(&self, signal: LifecycleSignal) -> Result<()> {
        self.send(DriverInput::Lifecycle(signal)).await
    }

    pub async fn enable_tracking(&self) -> Result<()> {
        self.lifecycle(LifecycleSignal::EnableTracking).await
    }

    pub async fn teardown(&self, reason: TeardownReason) -> Result<()> {
        self.lifecycle(LifecycleSignal::Teardown(reason)).await
    }

    /// Session snapshot taken after every input sent before this call
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(DriverInput::Snapshot(tx)).await?;
        rx.await.map_err(|_| stopped())
    }

    /// Most recently published tracker state
    pub fn state(&self) -> TrackerState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<TrackerState> {
        self.state_rx.clone()
    }

    async fn send(&self, input: DriverInput) -> Result<()> {
        self.inputs.send(input).await.map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::Internal("tracker driver stopped".into())
}

/// Event loop owning a [`WatchSessionTracker`]
pub struct TrackerDriver<S, K, C> {
    tracker: WatchSessionTracker<S, K, C>,
    inputs: mpsc::Receiver<DriverInput>,
    timers_tx: mpsc::UnboundedSender<TimerInput>,
    timers_rx: mpsc::UnboundedReceiver<TimerInput>,
    state_tx: watch::Sender<TrackerState>,
    poll_task: Option<JoinHandle<()>>,
    retry_scheduled: bool,
}

impl<S, K, C> TrackerDriver<S, K, C>
where
    S: PlaybackSource,
    K: EventSink,
    C: Clock,
{
    /// Create a driver and its first handle. `capacity` bounds the input queue.
    pub fn new(tracker: WatchSessionTracker<S, K, C>, capacity: usize) -> (Self, DriverHandle) {
        let (inputs_tx, inputs) = mpsc::channel(capacity.max(1));
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(tracker.state());

        let driver = Self {
            tracker,
            inputs,
            timers_tx,
            timers_rx,
            state_tx,
            poll_task: None,
            retry_scheduled: false,
        };
        let handle = DriverHandle {
            inputs: inputs_tx,
            state_rx,
        };
        (driver, handle)
    }

    /// Run until every handle is dropped, then flush the final report and
    /// hand the tracker back.
    #[instrument(skip(self), fields(session_id = %self.tracker.session_id()))]
    pub async fn run(mut self) -> WatchSessionTracker<S, K, C> {
        info!("Tracker driver started");

        loop {
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => self.process(input),
                    None => break,
                },
                Some(timer) = self.timers_rx.recv() => self.on_timer(timer),
            }
            self.after_input();
        }

        // Page reclaimed without an explicit teardown signal
        self.tracker.report_final_results(TeardownReason::Unload);
        self.stop_polling();
        info!("Tracker driver stopped");
        self.tracker
    }

    fn process(&mut self, input: DriverInput) {
        match input {
            DriverInput::Playback(event) => {
                let was_playing = self.tracker.state().is_playing();
                self.tracker.handle(event);
                let started = !was_playing && self.tracker.state().is_playing();
                if started && self.tracker.autoplay_pending() {
                    let delay = self.tracker.config().unmute_delay();
                    self.schedule(delay, TimerInput::ConfirmAutoplay);
                }
            }
            DriverInput::Lifecycle(LifecycleSignal::EnableTracking) => {
                self.tracker.enable_tracking();
            }
            DriverInput::Lifecycle(LifecycleSignal::Teardown(reason)) => {
                self.tracker.report_final_results(reason);
            }
            DriverInput::Snapshot(reply) => {
                let _ = reply.send(self.tracker.snapshot());
            }
        }
    }

    fn on_timer(&mut self, timer: TimerInput) {
        match timer {
            TimerInput::PollTick => {
                self.tracker.poll_progress();
            }
            TimerInput::ConfirmAutoplay => {
                self.tracker.confirm_autoplay();
            }
            TimerInput::RetryPending => {
                self.retry_scheduled = false;
                self.tracker.flush_pending();
            }
        }
    }

    fn after_input(&mut self) {
        self.sync_polling();

        if self.tracker.has_pending_events() && !self.retry_scheduled {
            self.retry_scheduled = true;
            let delay = self.tracker.config().sink_retry_delay();
            self.schedule(delay, TimerInput::RetryPending);
        }

        let current = self.tracker.state();
        self.state_tx.send_if_modified(|state| {
            if *state == current {
                false
            } else {
                *state = current;
                true
            }
        });
    }

    /// Keep exactly one poll task alive while playing
    fn sync_polling(&mut self) {
        match (self.tracker.is_polling(), self.poll_task.is_some()) {
            (true, false) => {
                let period = self.tracker.config().poll_interval();
                let tx = self.timers_tx.clone();
                debug!(period_ms = period.as_millis() as u64, "Milestone polling armed");
                self.poll_task = Some(tokio::spawn(async move {
                    let mut ticker = time::interval_at(Instant::now() + period, period);
                    loop {
                        ticker.tick().await;
                        if tx.send(TimerInput::PollTick).is_err() {
                            break;
                        }
                    }
                }));
            }
            (false, true) => self.stop_polling(),
            _ => {}
        }
    }

    fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
            debug!("Milestone polling stopped");
        }
    }

    fn schedule(&self, delay: Duration, timer: TimerInput) {
        let tx = self.timers_tx.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(timer);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        config::TrackerConfig,
        sink::MemorySink,
        source::{SimulatedSource, SourceCommand},
        types::Milestone,
    };

    fn spawn_driver(
        duration: f64,
    ) -> (
        DriverHandle,
        JoinHandle<WatchSessionTracker<SimulatedSource, MemorySink, ManualClock>>,
        SimulatedSource,
        MemorySink,
        ManualClock,
    ) {
        let source = SimulatedSource::new(duration);
        let sink = MemorySink::new();
        let clock = ManualClock::new();
        let tracker = WatchSessionTracker::new(
            TrackerConfig::for_video("ad-driver"),
            source.clone(),
            sink.clone(),
            clock.clone(),
        );
        let (driver, handle) = TrackerDriver::new(tracker, 16);
        let task = tokio::spawn(driver.run());
        (handle, task, source, sink, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_and_autoplay_unmute() {
        let (handle, task, source, sink, clock) = spawn_driver(100.0);

        tokio_test::assert_ok!(handle.enable_tracking().await);
        tokio_test::assert_ok!(handle.playback(PlaybackEvent::Play { position: 0.0 }).await);
        // Play must be applied before the clock moves
        tokio_test::assert_ok!(handle.snapshot().await);
        source.set_position(30.0);
        clock.set(30.0);

        time::sleep(Duration::from_millis(1100)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, TrackerState::Playing);
        assert_eq!(snapshot.milestones_reached, vec![Milestone::Quarter]);
        assert_eq!(handle.state(), TrackerState::Playing);
        assert_eq!(
            source.commands(),
            vec![SourceCommand::Mute, SourceCommand::Play, SourceCommand::Unmute]
        );

        // Further ticks at the same position add nothing
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.count("video_progress"), 1);

        drop(handle);
        let tracker = task.await.unwrap();
        assert!(tracker.session().final_report_sent());
        assert_eq!(sink.count("video_session_complete"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stops_on_pause() {
        let (handle, task, source, sink, clock) = spawn_driver(100.0);

        handle.enable_tracking().await.unwrap();
        handle.playback(PlaybackEvent::Play { position: 0.0 }).await.unwrap();
        handle.snapshot().await.unwrap();
        clock.set(10.0);
        handle.playback(PlaybackEvent::Pause { position: 10.0 }).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().state, TrackerState::Paused);

        source.set_position(90.0);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.count("video_progress"), 0);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_rearms_on_replay() {
        let (handle, task, source, sink, clock) = spawn_driver(10.0);
        let progress = |sink: &MemorySink| -> Vec<Milestone> {
            sink.records().iter().filter_map(|r| r.event.milestone()).collect()
        };

        handle.enable_tracking().await.unwrap();
        handle.playback(PlaybackEvent::Play { position: 0.0 }).await.unwrap();
        handle.snapshot().await.unwrap();
        source.set_position(3.0);
        clock.set(3.0);
        time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(progress(&sink), vec![Milestone::Quarter]);

        // Ends before the next tick sees 50% or 75%
        source.set_position(10.0);
        clock.set(10.0);
        handle.playback(PlaybackEvent::Ended { position: 10.0 }).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, TrackerState::Ended);
        assert_eq!(progress(&sink), vec![Milestone::Quarter, Milestone::Complete]);

        // Nothing polls while ended
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.count("video_progress"), 2);

        // Replay
        source.set_position(0.0);
        clock.set(20.0);
        handle.playback(PlaybackEvent::Play { position: 0.0 }).await.unwrap();
        handle.snapshot().await.unwrap();

        source.set_position(3.0);
        time::sleep(Duration::from_millis(1100)).await;
        handle.snapshot().await.unwrap();
        assert_eq!(sink.count("video_progress"), 2);

        source.set_position(6.0);
        time::sleep(Duration::from_secs(1)).await;
        handle.snapshot().await.unwrap();
        assert_eq!(
            progress(&sink),
            vec![Milestone::Quarter, Milestone::Complete, Milestone::Half]
        );

        // The poll sees 100% again and only 75% is new
        source.set_position(10.0);
        time::sleep(Duration::from_secs(1)).await;
        clock.set(30.0);
        handle.playback(PlaybackEvent::Ended { position: 10.0 }).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.play_count, 2);
        assert_eq!(snapshot.completion_count, 2);
        assert_eq!(
            progress(&sink),
            vec![
                Milestone::Quarter,
                Milestone::Complete,
                Milestone::Half,
                Milestone::ThreeQuarters
            ]
        );

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_from_two_producers() {
        let (handle, task, _source, sink, clock) = spawn_driver(100.0);
        let visibility = handle.clone();
        let unload = handle.clone();

        handle.enable_tracking().await.unwrap();
        handle.playback(PlaybackEvent::Play { position: 0.0 }).await.unwrap();
        handle.snapshot().await.unwrap();
        clock.set(45.0);

        visibility.teardown(TeardownReason::VisibilityHidden).await.unwrap();
        unload.teardown(TeardownReason::Unload).await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.final_report_sent);
        assert_eq!(sink.count("video_session_complete"), 1);
        match &sink.records().last().unwrap().event {
            crate::events::TrackingEvent::VideoSessionComplete(summary) => {
                assert_eq!(summary.total_watch_time_seconds, 45);
            }
            other => panic!("unexpected event {other:?}"),
        }

        drop((handle, visibility, unload));
        task.await.unwrap();
        assert_eq!(sink.count("video_session_complete"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_sink_is_retried() {
        let (handle, task, _source, sink, _clock) = spawn_driver(100.0);
        sink.set_available(false);

        handle.enable_tracking().await.unwrap();
        handle.playback(PlaybackEvent::Play { position: 0.0 }).await.unwrap();
        handle.snapshot().await.unwrap();
        assert!(sink.records().is_empty());

        sink.set_available(true);
        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(sink.names(), vec!["video_start", "video_play"]);

        drop(handle);
        task.await.unwrap();
    }
}
