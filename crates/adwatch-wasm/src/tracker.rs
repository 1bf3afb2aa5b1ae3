//! JavaScript-facing tracker
//!
//! The page owns timers and DOM listeners; it forwards media callbacks to
//! `report*` methods and calls `tick()` on the poll cadence. Player commands
//! and event delivery go back out through the objects passed to the
//! constructor.

use adwatch_core::{
    Clock, Delivery, Error, EventRecord, EventSink, PlaybackSource, TeardownReason, Timestamp,
    TrackerConfig, WatchSessionTracker,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    /// Player adapter supplied by the page
    pub type PlayerHandle;

    #[wasm_bindgen(method, catch, js_name = getCurrentTime)]
    fn get_current_time(this: &PlayerHandle) -> Result<f64, JsValue>;

    #[wasm_bindgen(method, catch, js_name = getDuration)]
    fn get_duration(this: &PlayerHandle) -> Result<f64, JsValue>;

    #[wasm_bindgen(method, catch, js_name = isMuted)]
    fn is_muted(this: &PlayerHandle) -> Result<bool, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn play(this: &PlayerHandle) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn pause(this: &PlayerHandle) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn mute(this: &PlayerHandle) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn unmute(this: &PlayerHandle) -> Result<(), JsValue>;
}

fn js_reason(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| value.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .unwrap_or_else(|| "unknown JavaScript error".to_string())
}

struct JsPlayer {
    handle: PlayerHandle,
}

impl JsPlayer {
    fn command(result: Result<(), JsValue>, command: &'static str) -> adwatch_core::Result<()> {
        result.map_err(|e| Error::SourceCommand {
            command,
            reason: js_reason(&e),
        })
    }
}

impl PlaybackSource for JsPlayer {
    fn current_time(&self) -> adwatch_core::Result<f64> {
        self.handle.get_current_time().map_err(|e| Error::not_ready(js_reason(&e)))
    }

    fn duration(&self) -> adwatch_core::Result<f64> {
        self.handle.get_duration().map_err(|e| Error::not_ready(js_reason(&e)))
    }

    fn is_muted(&self) -> adwatch_core::Result<bool> {
        self.handle.is_muted().map_err(|e| Error::not_ready(js_reason(&e)))
    }

    fn play(&mut self) -> adwatch_core::Result<()> {
        Self::command(self.handle.play(), "play")
    }

    fn pause(&mut self) -> adwatch_core::Result<()> {
        Self::command(self.handle.pause(), "pause")
    }

    fn mute(&mut self) -> adwatch_core::Result<()> {
        Self::command(self.handle.mute(), "mute")
    }

    fn unmute(&mut self) -> adwatch_core::Result<()> {
        Self::command(self.handle.unmute(), "unmute")
    }
}

/// Calls `send(name, properties)`; a throw means the analytics client
/// isn't loaded yet and the record is held for retry.
struct JsSink {
    send: js_sys::Function,
}

impl EventSink for JsSink {
    fn emit(&mut self, record: &EventRecord) -> adwatch_core::Result<()> {
        let props = record
            .properties()
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| Error::SinkRejected {
                event: record.name().to_string(),
                reason: e.to_string(),
            })?;
        self.send
            .call2(&JsValue::NULL, &JsValue::from_str(record.name()), &props)
            .map_err(|e| Error::SinkUnavailable(js_reason(&e)))?;
        Ok(())
    }
}

/// Wall clock from `Date.now()`
struct DateClock;

impl Clock for DateClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(js_sys::Date::now() / 1000.0)
    }
}

pub(crate) fn parse_reason(reason: &str) -> TeardownReason {
    match reason {
        "visibility_hidden" | "visibilitychange" | "hidden" => TeardownReason::VisibilityHidden,
        "unload" | "beforeunload" | "pagehide" => TeardownReason::Unload,
        _ => TeardownReason::Explicit,
    }
}

pub(crate) fn final_report_delivered(delivery: Option<Delivery>) -> bool {
    matches!(delivery, Some(Delivery::Sent))
}

/// Watch-session tracker for one ad on the page
#[wasm_bindgen]
pub struct AdwatchTracker {
    inner: WatchSessionTracker<JsPlayer, JsSink, DateClock>,
}

#[wasm_bindgen]
impl AdwatchTracker {
    /// `config` may be omitted; missing fields take their defaults
    #[wasm_bindgen(constructor)]
    pub fn new(
        player: PlayerHandle,
        send: js_sys::Function,
        config: JsValue,
    ) -> Result<AdwatchTracker, JsError> {
        let config: TrackerConfig = if config.is_undefined() || config.is_null() {
            TrackerConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(|e| JsError::new(&e.to_string()))?
        };
        config.validate().map_err(|e| JsError::new(&e.to_string()))?;

        Ok(Self {
            inner: WatchSessionTracker::new(
                config,
                JsPlayer { handle: player },
                JsSink { send },
                DateClock,
            ),
        })
    }

    /// Call from the user gesture that consents to tracking
    #[wasm_bindgen(js_name = enableTracking)]
    pub fn enable_tracking(&mut self) -> bool {
        self.inner.enable_tracking()
    }

    /// Call `unmuteDelayMs()` after playback started following `enableTracking`
    #[wasm_bindgen(js_name = confirmAutoplay)]
    pub fn confirm_autoplay(&mut self) -> bool {
        self.inner.confirm_autoplay()
    }

    #[wasm_bindgen(js_name = reportPlay)]
    pub fn report_play(&mut self, position: f64) {
        self.inner.on_play(position);
    }

    #[wasm_bindgen(js_name = reportPause)]
    pub fn report_pause(&mut self, position: f64) {
        self.inner.on_pause(position);
    }

    #[wasm_bindgen(js_name = reportEnded)]
    pub fn report_ended(&mut self, position: f64) {
        self.inner.on_ended(position);
    }

    #[wasm_bindgen(js_name = reportTimeUpdate)]
    pub fn report_time_update(&mut self, position: f64) {
        self.inner.on_time_update(position);
    }

    #[wasm_bindgen(js_name = reportVolumeChange)]
    pub fn report_volume_change(&mut self, muted: bool) {
        self.inner.on_mute_change(muted);
    }

    #[wasm_bindgen(js_name = reportDurationChange)]
    pub fn report_duration_change(&mut self, duration: f64) {
        self.inner.on_duration_known(duration);
    }

    /// Poll milestones and retry held events. Returns the percentages
    /// reached by this tick.
    pub fn tick(&mut self) -> Vec<u8> {
        let reached = self.inner.poll_progress();
        if self.inner.has_pending_events() {
            self.inner.flush_pending();
        }
        reached.into_iter().map(u8::from).collect()
    }

    /// Retry held events; returns how many were delivered
    pub fn flush(&mut self) -> u32 {
        self.inner.flush_pending() as u32
    }

    /// Send the final report. Safe to call from every teardown listener;
    /// only the first call reports. True only if the summary was delivered.
    pub fn teardown(&mut self, reason: &str) -> bool {
        final_report_delivered(self.inner.report_final_results(parse_reason(reason)))
    }

    pub fn state(&self) -> String {
        self.inner.state().to_string()
    }

    #[wasm_bindgen(js_name = isPolling)]
    pub fn is_polling(&self) -> bool {
        self.inner.is_polling()
    }

    #[wasm_bindgen(js_name = pollIntervalMs)]
    pub fn poll_interval_ms(&self) -> u32 {
        self.inner.config().poll_interval_ms as u32
    }

    #[wasm_bindgen(js_name = unmuteDelayMs)]
    pub fn unmute_delay_ms(&self) -> u32 {
        self.inner.config().unmute_delay_ms as u32
    }

    #[wasm_bindgen(js_name = sessionId)]
    pub fn session_id(&self) -> String {
        self.inner.session_id().to_string()
    }

    /// Session snapshot as a JSON string
    #[wasm_bindgen(js_name = snapshotJson)]
    pub fn snapshot_json(&self) -> String {
        serde_json::to_string(&self.inner.snapshot()).unwrap_or_default()
    }
}
