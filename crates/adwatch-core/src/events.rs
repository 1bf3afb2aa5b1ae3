//! Tracking events
//!
//! Event names and property keys are the contract with the analytics
//! backend, so the serde representation is the wire format.

use crate::types::{Milestone, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Semantic events emitted by the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackingEvent {
    /// First play of the session
    VideoStart {
        duration: f64,
        video_id: String,
    },

    /// Every transition into playing
    VideoPlay {
        current_time: f64,
        play_count: u32,
        is_replay: bool,
    },

    /// Transition out of playing by pause
    VideoPause {
        current_time: f64,
        session_watch_time: f64,
        total_watch_time: f64,
    },

    /// A progress milestone was crossed
    VideoProgress {
        milestone: Milestone,
        current_time: f64,
        total_watch_time_so_far: f64,
        play_count: u32,
    },

    /// Mute state flipped
    VideoMuteToggle {
        is_muted: bool,
        current_time: f64,
    },

    /// Final report on page teardown
    VideoSessionComplete(SessionSummary),
}

impl TrackingEvent {
    /// Event name as sent to the sink
    pub fn name(&self) -> &'static str {
        match self {
            TrackingEvent::VideoStart { .. } => "video_start",
            TrackingEvent::VideoPlay { .. } => "video_play",
            TrackingEvent::VideoPause { .. } => "video_pause",
            TrackingEvent::VideoProgress { .. } => "video_progress",
            TrackingEvent::VideoMuteToggle { .. } => "video_mute_toggle",
            TrackingEvent::VideoSessionComplete(_) => "video_session_complete",
        }
    }

    /// Property mapping, without the `event` tag
    pub fn properties(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("event");
                map
            }
            _ => Map::new(),
        }
    }

    /// Milestone carried by a `video_progress` event
    pub fn milestone(&self) -> Option<Milestone> {
        match self {
            TrackingEvent::VideoProgress { milestone, .. } => Some(*milestone),
            _ => None,
        }
    }
}

/// Aggregates reported once per session on teardown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_watch_time_seconds: u64,
    pub play_count: u32,
    pub completion_count: u32,
    pub milestones_reached: Vec<Milestone>,
    pub reached_25_percent: bool,
    pub reached_50_percent: bool,
    pub reached_75_percent: bool,
    pub reached_100_percent: bool,
    pub max_progress_percent: u32,
    pub video_duration: f64,
    pub completion_rate: u32,
}

/// Event with delivery metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Session ID
    pub session_id: SessionId,
    /// Study participant, when the host collected one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Sequence number within the session
    pub sequence: u64,
    /// The event
    #[serde(flatten)]
    pub event: TrackingEvent,
}

impl EventRecord {
    pub fn name(&self) -> &'static str {
        self.event.name()
    }

    /// Properties sent to the backend, including the participant if known
    pub fn properties(&self) -> Map<String, Value> {
        let mut props = self.event.properties();
        if let Some(ref participant) = self.participant_id {
            props.insert("participant_id".into(), Value::String(participant.clone()));
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_names() {
        let event = TrackingEvent::VideoMuteToggle {
            is_muted: false,
            current_time: 3.0,
        };
        assert_eq!(event.name(), "video_mute_toggle");
    }

    #[test]
    fn test_progress_properties() {
        let event = TrackingEvent::VideoProgress {
            milestone: Milestone::Half,
            current_time: 50.2,
            total_watch_time_so_far: 48.0,
            play_count: 1,
        };

        let props = Value::Object(event.properties());
        assert_eq!(
            props,
            json!({
                "milestone": 50,
                "current_time": 50.2,
                "total_watch_time_so_far": 48.0,
                "play_count": 1
            })
        );
    }

    #[test]
    fn test_summary_is_flattened_into_properties() {
        let event = TrackingEvent::VideoSessionComplete(SessionSummary {
            total_watch_time_seconds: 45,
            play_count: 1,
            completion_count: 0,
            milestones_reached: vec![Milestone::Quarter],
            reached_25_percent: true,
            reached_50_percent: false,
            reached_75_percent: false,
            reached_100_percent: false,
            max_progress_percent: 45,
            video_duration: 100.0,
            completion_rate: 45,
        });

        let props = event.properties();
        assert_eq!(props["total_watch_time_seconds"], json!(45));
        assert_eq!(props["milestones_reached"], json!([25]));
        assert!(!props.contains_key("event"));
    }

    #[test]
    fn test_record_wire_format() {
        let record = EventRecord {
            id: Uuid::new_v4(),
            session_id: SessionId::new(),
            participant_id: Some("P-017".into()),
            timestamp: Utc::now(),
            sequence: 3,
            event: TrackingEvent::VideoPlay {
                current_time: 0.0,
                play_count: 2,
                is_replay: true,
            },
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["event"], "video_play");
        assert_eq!(value["is_replay"], true);
        assert_eq!(value["participant_id"], "P-017");
        assert_eq!(record.properties()["participant_id"], "P-017");

        let decoded: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, record);
    }
}
