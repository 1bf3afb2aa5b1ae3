//! Output formatting for CLI

use adwatch_core::{EventRecord, SessionSnapshot, SessionSummary};
use console::style;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON, falling back to an empty object
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "#")]
    sequence: u64,
    event: &'static str,
    properties: String,
}

impl From<&EventRecord> for EventRow {
    fn from(record: &EventRecord) -> Self {
        Self {
            sequence: record.sequence,
            event: record.name(),
            properties: compact_properties(record),
        }
    }
}

fn compact_properties(record: &EventRecord) -> String {
    record
        .event
        .properties()
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render emitted records
pub fn format_records(records: &[EventRecord], format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => to_json(&records),
        OutputFormat::Table => {
            let rows: Vec<EventRow> = records.iter().map(EventRow::from).collect();
            Table::new(rows).with(Style::modern()).to_string()
        }
        OutputFormat::Text => records
            .iter()
            .map(|record| {
                format!(
                    "{:>4}  {}  {}",
                    style(record.sequence).dim(),
                    style(record.name()).cyan().bold(),
                    compact_properties(record)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[derive(Tabled)]
struct FieldRow {
    field: &'static str,
    value: String,
}

/// Render the end-of-session snapshot
pub fn format_snapshot(snapshot: &SessionSnapshot, format: &str) -> String {
    let milestones = snapshot
        .milestones_reached
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let rows = vec![
        FieldRow { field: "State", value: snapshot.state.to_string() },
        FieldRow { field: "Plays", value: snapshot.play_count.to_string() },
        FieldRow { field: "Completions", value: snapshot.completion_count.to_string() },
        FieldRow { field: "Watch time", value: format!("{:.1}s", snapshot.watch_time_seconds) },
        FieldRow { field: "Duration", value: format!("{:.1}s", snapshot.duration_seconds) },
        FieldRow { field: "Furthest", value: format!("{:.1}s", snapshot.max_progress_seconds) },
        FieldRow { field: "Milestones", value: milestones },
        FieldRow { field: "Completion", value: format!("{:.0}%", snapshot.completion_rate) },
        FieldRow { field: "Final report", value: snapshot.final_report_sent.to_string() },
    ];

    match OutputFormat::from(format) {
        OutputFormat::Json => to_json(snapshot),
        OutputFormat::Table => Table::new(rows).with(Style::modern()).to_string(),
        OutputFormat::Text => {
            let mut out = format!("{}\n", style("Session:").bold());
            for row in rows {
                out.push_str(&format!("  {:<13} {}\n", format!("{}:", row.field), row.value));
            }
            out
        }
    }
}

/// Render the final report payload
pub fn format_summary(summary: &SessionSummary, format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => to_json(summary),
        OutputFormat::Table | OutputFormat::Text => {
            let reached = |hit: bool| if hit { style("yes").green() } else { style("no").red() };
            format!(
                "{}\n  Watch time:  {}s\n  Plays:       {}\n  Completions: {}\n  25/50/75/100: {} {} {} {}\n  Furthest:    {}%\n  Completion:  {}%\n",
                style("Session complete:").bold(),
                summary.total_watch_time_seconds,
                summary.play_count,
                summary.completion_count,
                reached(summary.reached_25_percent),
                reached(summary.reached_50_percent),
                reached(summary.reached_75_percent),
                reached(summary.reached_100_percent),
                summary.max_progress_percent,
                summary.completion_rate,
            )
        }
    }
}
