//! Session replay example
//!
//! Replays a short viewing session and prints every event the tracker emits.
//!
//! Run with: cargo run -p adwatch-core --example session_replay

use adwatch_core::{Scenario, ScenarioRunner};

const SESSION: &str = r#"
name = "pause, resume, leave"
duration = 30.0
auto_poll = true

[config]
video_id = "example-ad"

[[steps]]
at = 0.0
action = "enable"

[[steps]]
at = 0.3
action = "play"
position = 0.0

[[steps]]
at = 0.8
action = "confirm_autoplay"

[[steps]]
at = 12.0
action = "pause"
position = 11.7

[[steps]]
at = 20.0
action = "play"
position = 11.7

[[steps]]
at = 31.0
action = "teardown"
reason = "visibility_hidden"

[[steps]]
at = 31.2
action = "teardown"
reason = "unload"
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Adwatch Core - Session Replay Example");
    println!("=====================================\n");

    let scenario = Scenario::from_toml_str(SESSION)?;
    let outcome = ScenarioRunner::new(scenario)?.run()?;

    for record in &outcome.records {
        println!(
            "#{:<3} {:<24} {}",
            record.sequence,
            record.name(),
            serde_json::Value::Object(record.properties())
        );
    }

    println!("\nSnapshot:");
    println!("{}", serde_json::to_string_pretty(&outcome.snapshot)?);

    Ok(())
}
