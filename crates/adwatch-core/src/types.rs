//! Core types for Adwatch

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a watch session (one per page load)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// Waiting for the user gesture; playback callbacks are ignored
    Disabled,
    /// Tracking enabled, playback not started yet
    Idle,
    /// Actively playing
    Playing,
    /// Paused
    Paused,
    /// Reached the end of the video
    Ended,
}

impl TrackerState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: TrackerState) -> bool {
        use TrackerState::*;
        matches!(
            (self, target),
            (Disabled, Idle)
                | (Idle, Playing)
                | (Paused, Playing)
                | (Ended, Playing)
                | (Playing, Paused)
                | (Playing, Ended)
                | (Paused, Ended)
        )
    }

    /// The target state, or `InvalidStateTransition` if it isn't reachable
    pub fn transition_to(self, target: TrackerState) -> Result<TrackerState> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// True while the milestone poll should be running
    pub fn is_playing(&self) -> bool {
        *self == TrackerState::Playing
    }
}

impl std::fmt::Display for TrackerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerState::Disabled => write!(f, "disabled"),
            TrackerState::Idle => write!(f, "idle"),
            TrackerState::Playing => write!(f, "playing"),
            TrackerState::Paused => write!(f, "paused"),
            TrackerState::Ended => write!(f, "ended"),
        }
    }
}

/// Progress milestones, as a percentage of the video duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Milestone {
    Quarter,
    Half,
    ThreeQuarters,
    Complete,
}

impl Milestone {
    /// Thresholds checked by the progress poll, ascending.
    /// `Complete` is owned by the ended event; the poll only falls back to it.
    pub const POLLED: [Milestone; 3] = [Milestone::Quarter, Milestone::Half, Milestone::ThreeQuarters];

    pub const ALL: [Milestone; 4] = [
        Milestone::Quarter,
        Milestone::Half,
        Milestone::ThreeQuarters,
        Milestone::Complete,
    ];

    /// Percentage value of this milestone
    pub fn percent(&self) -> u8 {
        match self {
            Milestone::Quarter => 25,
            Milestone::Half => 50,
            Milestone::ThreeQuarters => 75,
            Milestone::Complete => 100,
        }
    }

    /// Returns true if `progress_percent` has crossed this milestone
    pub fn is_reached_by(&self, progress_percent: f64) -> bool {
        progress_percent >= f64::from(self.percent())
    }
}

impl From<Milestone> for u8 {
    fn from(milestone: Milestone) -> Self {
        milestone.percent()
    }
}

impl TryFrom<u8> for Milestone {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            25 => Ok(Milestone::Quarter),
            50 => Ok(Milestone::Half),
            75 => Ok(Milestone::ThreeQuarters),
            100 => Ok(Milestone::Complete),
            other => Err(format!("{other} is not a tracked milestone")),
        }
    }
}

impl std::fmt::Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Why the page is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownReason {
    /// Page became hidden
    VisibilityHidden,
    /// Page is being unloaded / navigated away from
    Unload,
    /// Host asked for a flush explicitly
    Explicit,
}

impl std::fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownReason::VisibilityHidden => write!(f, "visibility_hidden"),
            TeardownReason::Unload => write!(f, "unload"),
            TeardownReason::Explicit => write!(f, "explicit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert!(TrackerState::Disabled.can_transition_to(TrackerState::Idle));
        assert!(TrackerState::Idle.can_transition_to(TrackerState::Playing));
        assert!(TrackerState::Ended.can_transition_to(TrackerState::Playing));
        assert!(!TrackerState::Disabled.can_transition_to(TrackerState::Playing));
        assert!(TrackerState::Paused.can_transition_to(TrackerState::Ended));
        assert!(!TrackerState::Idle.can_transition_to(TrackerState::Ended));
        assert!(!TrackerState::Playing.can_transition_to(TrackerState::Playing));
    }

    #[test]
    fn test_invalid_transition_error() {
        assert_eq!(
            TrackerState::Paused.transition_to(TrackerState::Playing).unwrap(),
            TrackerState::Playing
        );
        match TrackerState::Idle.transition_to(TrackerState::Paused) {
            Err(Error::InvalidStateTransition { from, to }) => {
                assert_eq!(from, "idle");
                assert_eq!(to, "paused");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_milestone_round_trip_and_order() {
        assert_eq!(Milestone::try_from(75u8), Ok(Milestone::ThreeQuarters));
        assert!(Milestone::try_from(60u8).is_err());
        assert!(Milestone::Quarter < Milestone::Complete);
        assert!(Milestone::Half.is_reached_by(50.0));
        assert!(!Milestone::Half.is_reached_by(49.99));
    }

    #[test]
    fn test_milestone_serializes_as_number() {
        let json = serde_json::to_string(&vec![Milestone::Quarter, Milestone::Complete]).unwrap();
        assert_eq!(json, "[25,100]");
    }
}
