//! Tracker configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `video_id`
pub const ENV_VIDEO_ID: &str = "ADWATCH_VIDEO_ID";
/// Environment variable overriding `participant_id`
pub const ENV_PARTICIPANT_ID: &str = "ADWATCH_PARTICIPANT_ID";

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Identifier of the advertisement, sent with `video_start`
    pub video_id: String,
    /// Study participant identifier, attached to every record when set
    pub participant_id: Option<String>,
    /// Milestone poll cadence (ms)
    pub poll_interval_ms: u64,
    /// Delay between confirmed muted autoplay and unmuting (ms)
    pub unmute_delay_ms: u64,
    /// Delay before retrying events the sink could not accept (ms)
    pub sink_retry_delay_ms: u64,
    /// Maximum events held while the sink is unavailable
    pub max_pending_events: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            video_id: "ad-video".to_string(),
            participant_id: None,
            poll_interval_ms: 1000,
            unmute_delay_ms: 500,
            sink_retry_delay_ms: 500,
            max_pending_events: 100,
        }
    }
}

impl TrackerConfig {
    /// Config for a given video
    pub fn for_video(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            ..Default::default()
        }
    }

    /// Config tuned for an embedded iframe player, whose play promise
    /// resolves later than a native element's
    pub fn youtube(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            unmute_delay_ms: 800,
            ..Default::default()
        }
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            _ => toml::from_str(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `ADWATCH_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(video_id) = std::env::var(ENV_VIDEO_ID) {
            if !video_id.trim().is_empty() {
                self.video_id = video_id;
            }
        }
        if let Ok(participant) = std::env::var(ENV_PARTICIPANT_ID) {
            if !participant.trim().is_empty() {
                self.participant_id = Some(participant);
            }
        }
        self
    }

    /// Serialize as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_id.trim().is_empty() {
            return Err(Error::InvalidConfig("video_id must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be > 0".into()));
        }
        if self.sink_retry_delay_ms == 0 {
            return Err(Error::InvalidConfig("sink_retry_delay_ms must be > 0".into()));
        }
        if self.max_pending_events == 0 {
            return Err(Error::InvalidConfig("max_pending_events must be > 0".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn unmute_delay(&self) -> Duration {
        Duration::from_millis(self.unmute_delay_ms)
    }

    pub fn sink_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sink_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.max_pending_events, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TrackerConfig::from_toml_str(
            r#"
            video_id = "spring-campaign"
            participant_id = "P-042"
            unmute_delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.video_id, "spring-campaign");
        assert_eq!(config.participant_id.as_deref(), Some("P-042"));
        assert_eq!(config.unmute_delay_ms, 250);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_validation_rejects_zero_poll() {
        let err = TrackerConfig::from_toml_str("poll_interval_ms = 0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = TrackerConfig::from_toml_str("poll_interval_ms = \"fast\"").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_PARSE");
    }

    #[test]
    fn test_toml_output_round_trips() {
        let config = TrackerConfig::youtube("yt-abc123");
        let text = config.to_toml_string().unwrap();
        assert_eq!(TrackerConfig::from_toml_str(&text).unwrap(), config);
    }
}
