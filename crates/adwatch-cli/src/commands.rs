//! CLI command implementations

use crate::output::{format_records, format_snapshot, format_summary, OutputFormat};
use adwatch_core::scenario::Action;
use adwatch_core::{
    BeaconSink, EventSink, JsonLinesSink, ManualClock, PlaybackEvent, Scenario, ScenarioRunner,
    SimulatedSource, TrackerConfig, TrackerDriver, TracingSink, TrackingEvent,
    WatchSessionTracker,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Largest clock step taken between scenario steps in live mode
const LIVE_STEP_SECS: f64 = 0.1;

/// Replay a scenario and print what it emitted
pub fn simulate(
    scenario_path: &Path,
    output: Option<PathBuf>,
    summary_only: bool,
    format: &str,
) -> anyhow::Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let label = scenario
        .name
        .clone()
        .unwrap_or_else(|| scenario_path.display().to_string());
    info!(scenario = %label, steps = scenario.steps.len(), "Replaying scenario");

    let outcome = ScenarioRunner::new(scenario)?.run()?;

    if let Some(path) = output {
        let mut sink = JsonLinesSink::new(BufWriter::new(File::create(&path)?));
        for record in &outcome.records {
            sink.emit(record)?;
        }
        info!(path = %path.display(), records = outcome.records.len(), "Records written");
    }

    if summary_only {
        let summary = outcome.records.iter().find_map(|r| match &r.event {
            TrackingEvent::VideoSessionComplete(summary) => Some(summary),
            _ => None,
        });
        match summary {
            Some(summary) => println!("{}", format_summary(summary, format)),
            None => println!("No session summary was reported"),
        }
        return Ok(());
    }

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", crate::output::to_json(&outcome)),
        _ => {
            println!("Scenario: {}\n", label);
            println!("{}\n", format_records(&outcome.records, format));
            println!("{}", format_snapshot(&outcome.snapshot, format));
        }
    }

    Ok(())
}

/// Replay a scenario in real time through the async driver
pub async fn live(
    scenario_path: &Path,
    speed: f64,
    endpoint: Option<Url>,
    format: &str,
) -> anyhow::Result<()> {
    if !speed.is_finite() || speed <= 0.0 {
        anyhow::bail!("speed must be a positive number, got {speed}");
    }

    let scenario = Scenario::load(scenario_path)?;
    scenario.validate()?;

    let sink: Box<dyn EventSink + Send> = match endpoint {
        Some(url) => {
            info!(endpoint = %url, "Sending events as beacons");
            Box::new(BeaconSink::new(url))
        }
        None => Box::new(TracingSink),
    };

    let source = SimulatedSource::new(scenario.duration);
    let clock = ManualClock::new();
    let tracker = WatchSessionTracker::new(
        scenario.config.clone(),
        source.clone(),
        sink,
        clock.clone(),
    );
    let (driver, handle) = TrackerDriver::new(tracker, 64);
    let task = tokio::spawn(driver.run());

    let mut duration = scenario.duration;
    let mut now = 0.0;
    let mut position = 0.0;

    for step in &scenario.steps {
        while now < step.at {
            let dt = (step.at - now).min(LIVE_STEP_SECS);
            tokio::time::sleep(Duration::from_secs_f64(dt / speed)).await;
            now += dt;
            clock.set(now);
            if handle.state().is_playing() {
                position += dt;
                if duration > 0.0 {
                    position = position.min(duration);
                }
                source.set_position(position);
            }
        }

        match step.action {
            Action::Enable => handle.enable_tracking().await?,
            Action::Play { position: at } => {
                position = at;
                source.set_position(at);
                handle.playback(PlaybackEvent::Play { position: at }).await?;
            }
            Action::Pause { position: at } => {
                position = at;
                source.set_position(at);
                handle.playback(PlaybackEvent::Pause { position: at }).await?;
            }
            Action::Ended { position: at } => {
                position = at;
                source.set_position(at);
                handle.playback(PlaybackEvent::Ended { position: at }).await?;
            }
            Action::Seek { position: at } | Action::Tick { position: Some(at) } => {
                position = at;
                source.set_position(at);
                handle.playback(PlaybackEvent::TimeUpdate { position: at }).await?;
            }
            Action::Tick { position: None } => {}
            Action::Mute | Action::Unmute => {
                let muted = matches!(step.action, Action::Mute);
                source.set_muted(muted);
                handle.playback(PlaybackEvent::VolumeChange { muted }).await?;
            }
            Action::Duration { seconds } => {
                duration = seconds;
                source.set_duration(seconds);
                handle.playback(PlaybackEvent::DurationChange { duration: seconds }).await?;
            }
            Action::Teardown { reason } => handle.teardown(reason).await?,
            // The driver owns autoplay confirmation and sink retries
            Action::ConfirmAutoplay | Action::Flush => {}
            Action::SinkOffline | Action::SinkOnline => {
                warn!(action = ?step.action, "Sink availability cannot be scripted in live mode");
            }
        }
    }

    let snapshot = handle.snapshot().await?;
    drop(handle);
    task.await?;

    println!("{}", format_snapshot(&snapshot, format));
    Ok(())
}

/// Print the effective configuration after file and environment overrides
pub fn config(file: Option<PathBuf>, format: &str) -> anyhow::Result<()> {
    let config = match file {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", crate::output::to_json(&config)),
        _ => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}
