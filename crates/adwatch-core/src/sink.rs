//! Event sinks
//!
//! A sink accepts one record at a time and is fire-and-forget from the
//! tracker's point of view. `Error::SinkUnavailable` tells the dispatcher to
//! keep the record and retry later; any other error drops it.

use crate::{events::EventRecord, Error, Result};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Destination for tracking events
pub trait EventSink {
    fn emit(&mut self, record: &EventRecord) -> Result<()>;
}

impl<K: EventSink + ?Sized> EventSink for Box<K> {
    fn emit(&mut self, record: &EventRecord) -> Result<()> {
        (**self).emit(record)
    }
}

/// Sink that keeps every record in memory. Clones share storage.
#[derive(Debug, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<EventRecord>>>,
    available: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the backend client loading or going away
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// All records received so far
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Event names in arrival order
    pub fn names(&self) -> Vec<&'static str> {
        self.records().iter().map(EventRecord::name).collect()
    }

    /// Number of records with the given event name
    pub fn count(&self, name: &str) -> usize {
        self.records().iter().filter(|r| r.name() == name).count()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, record: &EventRecord) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::SinkUnavailable("memory sink offline".into()));
        }
        self.records
            .lock()
            .map_err(|_| Error::Internal("memory sink poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}

/// Sink that writes each record as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, record: &EventRecord) -> Result<()> {
        let properties = serde_json::Value::Object(record.properties());
        info!(
            event = record.name(),
            sequence = record.sequence,
            session_id = %record.session_id,
            %properties,
            "Tracking event"
        );
        Ok(())
    }
}

/// Sink that writes one JSON record per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &EventRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(|e| {
            if e.is_io() {
                Error::Json(e)
            } else {
                Error::SinkRejected {
                    event: record.name().to_string(),
                    reason: e.to_string(),
                }
            }
        })?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(feature = "beacon")]
pub use beacon::BeaconSink;

#[cfg(feature = "beacon")]
mod beacon {
    use super::*;
    use tracing::{debug, warn};
    use url::Url;

    /// Sink that POSTs each record to a collection endpoint.
    ///
    /// Requests are spawned onto the current tokio runtime and never awaited;
    /// delivery guarantees belong to the endpoint's transport.
    #[derive(Debug, Clone)]
    pub struct BeaconSink {
        client: reqwest::Client,
        endpoint: Url,
    }

    impl BeaconSink {
        pub fn new(endpoint: Url) -> Self {
            Self {
                client: reqwest::Client::new(),
                endpoint,
            }
        }
    }

    impl EventSink for BeaconSink {
        fn emit(&mut self, record: &EventRecord) -> Result<()> {
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|_| Error::SinkUnavailable("no async runtime for beacon".into()))?;

            let request = self.client.post(self.endpoint.clone()).json(record);
            let event = record.name();
            let sequence = record.sequence;
            handle.spawn(async move {
                match request.send().await {
                    Ok(resp) => debug!(event, sequence, status = %resp.status(), "Beacon sent"),
                    Err(e) => warn!(event, sequence, error = %e, "Beacon failed"),
                }
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TrackingEvent;
    use crate::types::SessionId;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(sequence: u64) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            session_id: SessionId::new(),
            participant_id: None,
            timestamp: Utc::now(),
            sequence,
            event: TrackingEvent::VideoPause {
                current_time: 30.0,
                session_watch_time: 30.0,
                total_watch_time: 30.0,
            },
        }
    }

    #[test]
    fn test_memory_sink_offline() {
        let mut sink = MemorySink::new();
        sink.set_available(false);
        assert!(matches!(sink.emit(&record(1)), Err(Error::SinkUnavailable(_))));

        sink.set_available(true);
        sink.emit(&record(2)).unwrap();
        assert_eq!(sink.names(), vec!["video_pause"]);
    }

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(&record(1)).unwrap();
        sink.emit(&record(2)).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["sequence"], 2);
        assert_eq!(second["event"], "video_pause");
    }
}
