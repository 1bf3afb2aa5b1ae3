//! Watch Session - per-page-load accounting
//!
//! Holds the counters, accumulated watch time, and milestone set. The
//! tracker is the only writer; every mutation here preserves:
//! - `accumulated_watch_seconds` and `max_progress_seconds` never decrease
//! - a milestone is inserted at most once
//! - `duration_seconds` is written once

use crate::{
    clock::Timestamp,
    events::SessionSummary,
    types::Milestone,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchSession {
    pub(crate) tracking_enabled: bool,
    pub(crate) has_started_once: bool,
    pub(crate) play_count: u32,
    pub(crate) completion_count: u32,
    pub(crate) current_play_started_at: Option<Timestamp>,
    pub(crate) accumulated_watch_seconds: f64,
    pub(crate) duration_seconds: f64,
    pub(crate) max_progress_seconds: f64,
    pub(crate) milestones_reached: BTreeSet<Milestone>,
    pub(crate) final_report_sent: bool,
}

impl WatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    pub fn has_started_once(&self) -> bool {
        self.has_started_once
    }

    pub fn play_count(&self) -> u32 {
        self.play_count
    }

    pub fn completion_count(&self) -> u32 {
        self.completion_count
    }

    pub fn is_in_play_interval(&self) -> bool {
        self.current_play_started_at.is_some()
    }

    /// Watch time from closed intervals only
    pub fn accumulated_watch_seconds(&self) -> f64 {
        self.accumulated_watch_seconds
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn max_progress_seconds(&self) -> f64 {
        self.max_progress_seconds
    }

    pub fn milestones_reached(&self) -> impl Iterator<Item = Milestone> + '_ {
        self.milestones_reached.iter().copied()
    }

    pub fn has_reached(&self, milestone: Milestone) -> bool {
        self.milestones_reached.contains(&milestone)
    }

    pub fn final_report_sent(&self) -> bool {
        self.final_report_sent
    }

    /// Open a play interval at `now`
    pub(crate) fn begin_interval(&mut self, now: Timestamp) {
        self.current_play_started_at = Some(now);
    }

    /// Close the open play interval, if any, and return its length
    pub(crate) fn close_interval(&mut self, now: Timestamp) -> Option<f64> {
        let started = self.current_play_started_at.take()?;
        let delta = now.elapsed_since(started);
        self.accumulated_watch_seconds += delta;
        Some(delta)
    }

    /// Watch time including the open interval, without closing it
    pub fn watch_time_at(&self, now: Timestamp) -> f64 {
        let open = self
            .current_play_started_at
            .map(|started| now.elapsed_since(started))
            .unwrap_or(0.0);
        self.accumulated_watch_seconds + open
    }

    /// Record the media duration. First finite positive value wins.
    pub(crate) fn record_duration(&mut self, duration: f64) -> bool {
        if self.duration_seconds > 0.0 || !duration.is_finite() || duration <= 0.0 {
            return false;
        }
        self.duration_seconds = duration;
        true
    }

    /// Raise the progress high-water mark
    pub(crate) fn record_position(&mut self, position: f64) {
        if position.is_finite() && position > self.max_progress_seconds {
            self.max_progress_seconds = position;
        }
    }

    /// Position as a percentage of duration; `None` while duration is unknown
    pub fn progress_percent(&self, position: f64) -> Option<f64> {
        if self.duration_seconds > 0.0 && position.is_finite() {
            Some(position / self.duration_seconds * 100.0)
        } else {
            None
        }
    }

    /// Insert a milestone; true only the first time
    pub(crate) fn reach(&mut self, milestone: Milestone) -> bool {
        self.milestones_reached.insert(milestone)
    }

    /// High-water mark as a percentage of duration, 0 when unknown
    pub fn max_progress_percent(&self) -> f64 {
        self.progress_percent(self.max_progress_seconds).unwrap_or(0.0)
    }

    /// Max progress percentage clamped to 0..=100
    pub fn completion_rate(&self) -> f64 {
        self.max_progress_percent().clamp(0.0, 100.0)
    }

    /// Build the teardown report from closed intervals
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            total_watch_time_seconds: round_non_negative(self.accumulated_watch_seconds) as u64,
            play_count: self.play_count,
            completion_count: self.completion_count,
            milestones_reached: self.milestones_reached.iter().copied().collect(),
            reached_25_percent: self.has_reached(Milestone::Quarter),
            reached_50_percent: self.has_reached(Milestone::Half),
            reached_75_percent: self.has_reached(Milestone::ThreeQuarters),
            reached_100_percent: self.has_reached(Milestone::Complete),
            max_progress_percent: round_non_negative(self.max_progress_percent()) as u32,
            video_duration: self.duration_seconds,
            completion_rate: round_non_negative(self.completion_rate()) as u32,
        }
    }
}

fn round_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0).round()
    } else {
        0.0
    }
}

/// Serializable view of the session for hosts and tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: crate::types::TrackerState,
    pub tracking_enabled: bool,
    pub play_count: u32,
    pub completion_count: u32,
    pub watch_time_seconds: f64,
    pub duration_seconds: f64,
    pub max_progress_seconds: f64,
    pub milestones_reached: Vec<Milestone>,
    pub completion_rate: f64,
    pub final_report_sent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: f64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_interval_accumulation() {
        let mut session = WatchSession::new();
        session.begin_interval(at(0.0));
        assert_eq!(session.watch_time_at(at(12.0)), 12.0);
        assert_eq!(session.close_interval(at(30.0)), Some(30.0));
        assert_eq!(session.close_interval(at(40.0)), None);

        session.begin_interval(at(50.0));
        session.close_interval(at(65.0));
        assert_eq!(session.accumulated_watch_seconds(), 45.0);
    }

    #[test]
    fn test_backwards_clock_adds_nothing() {
        let mut session = WatchSession::new();
        session.begin_interval(at(10.0));
        assert_eq!(session.close_interval(at(5.0)), Some(0.0));
        assert_eq!(session.accumulated_watch_seconds(), 0.0);
    }

    #[test]
    fn test_duration_written_once() {
        let mut session = WatchSession::new();
        assert!(!session.record_duration(f64::NAN));
        assert!(!session.record_duration(0.0));
        assert!(session.record_duration(100.0));
        assert!(!session.record_duration(120.0));
        assert_eq!(session.duration_seconds(), 100.0);
    }

    #[test]
    fn test_progress_high_water_mark() {
        let mut session = WatchSession::new();
        session.record_duration(200.0);
        session.record_position(80.0);
        session.record_position(20.0);
        assert_eq!(session.max_progress_seconds(), 80.0);
        assert_eq!(session.max_progress_percent(), 40.0);
    }

    #[test]
    fn test_unknown_duration_has_no_percent() {
        let mut session = WatchSession::new();
        session.record_position(30.0);
        assert_eq!(session.progress_percent(30.0), None);
        assert_eq!(session.completion_rate(), 0.0);
    }

    #[test]
    fn test_summary_milestones_sorted() {
        let mut session = WatchSession::new();
        session.record_duration(100.0);
        assert!(session.reach(Milestone::Complete));
        assert!(session.reach(Milestone::Quarter));
        assert!(!session.reach(Milestone::Quarter));
        session.record_position(104.0);

        let summary = session.summary();
        assert_eq!(summary.milestones_reached, vec![Milestone::Quarter, Milestone::Complete]);
        assert!(summary.reached_25_percent && summary.reached_100_percent);
        assert!(!summary.reached_50_percent);
        assert_eq!(summary.max_progress_percent, 104);
        assert_eq!(summary.completion_rate, 100);
    }
}
