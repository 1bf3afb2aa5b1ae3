//! Ordered delivery to an event sink
//!
//! Wraps each event in an [`EventRecord`], numbers it, and holds records the
//! sink could not accept yet. Held records are always delivered before newer
//! ones so the backend sees events in firing order.

use crate::{
    events::{EventRecord, TrackingEvent},
    sink::EventSink,
    types::SessionId,
};
use chrono::Utc;
use std::collections::VecDeque;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the sink
    Sent,
    /// Held for a later retry
    Queued,
    /// Dropped (sink rejected it, or final report could not be delivered)
    Dropped,
}

#[derive(Debug, Default)]
struct Flushed {
    delivered: usize,
    watched_dropped: bool,
}

pub struct Dispatcher<K> {
    sink: K,
    session_id: SessionId,
    participant_id: Option<String>,
    sequence: u64,
    pending: VecDeque<EventRecord>,
    max_pending: usize,
}

impl<K: EventSink> Dispatcher<K> {
    pub fn new(sink: K, session_id: SessionId, participant_id: Option<String>, max_pending: usize) -> Self {
        Self {
            sink,
            session_id,
            participant_id,
            sequence: 0,
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
        }
    }

    /// Deliver an event, queueing it if the sink is not ready
    pub fn send(&mut self, event: TrackingEvent) -> Delivery {
        let record = self.record(event);

        if !self.pending.is_empty() {
            let sequence = record.sequence;
            self.enqueue(record);
            let flushed = self.drain_pending(Some(sequence));
            return if flushed.watched_dropped {
                Delivery::Dropped
            } else if self.pending.iter().any(|r| r.sequence == sequence) {
                Delivery::Queued
            } else {
                Delivery::Sent
            };
        }

        match self.sink.emit(&record) {
            Ok(()) => Delivery::Sent,
            Err(e) if e.is_recoverable() => {
                debug!(event = record.name(), code = e.error_code(), error = %e, "Sink unavailable, queueing event");
                self.enqueue(record);
                Delivery::Queued
            }
            Err(e) => {
                warn!(event = record.name(), code = e.error_code(), error = %e, "Event dropped");
                Delivery::Dropped
            }
        }
    }

    /// Deliver an event exactly once with no retry.
    ///
    /// Held records get one more attempt first so ordering survives; anything
    /// still undeliverable is dropped because the page is going away.
    pub fn send_final(&mut self, event: TrackingEvent) -> Delivery {
        self.flush_pending();
        if !self.pending.is_empty() {
            warn!(dropped = self.pending.len(), "Sink unavailable at teardown, dropping held events");
            self.pending.clear();
        }

        let record = self.record(event);
        match self.sink.emit(&record) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                warn!(event = record.name(), code = e.error_code(), error = %e, "Final report not delivered");
                Delivery::Dropped
            }
        }
    }

    /// Retry held records in order. Returns the number delivered.
    pub fn flush_pending(&mut self) -> usize {
        self.drain_pending(None).delivered
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Number of records created so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn record(&mut self, event: TrackingEvent) -> EventRecord {
        self.sequence += 1;
        EventRecord {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            participant_id: self.participant_id.clone(),
            timestamp: Utc::now(),
            sequence: self.sequence,
            event,
        }
    }

    /// Deliver held records until the sink reports it is unavailable again.
    /// `watch` names a sequence number whose fate the caller wants to know.
    fn drain_pending(&mut self, watch: Option<u64>) -> Flushed {
        let mut flushed = Flushed::default();
        while let Some(record) = self.pending.front() {
            match self.sink.emit(record) {
                Ok(()) => {
                    self.pending.pop_front();
                    flushed.delivered += 1;
                }
                Err(e) if e.is_recoverable() => break,
                Err(e) => {
                    warn!(event = record.name(), code = e.error_code(), error = %e, "Held event dropped");
                    if watch == Some(record.sequence) {
                        flushed.watched_dropped = true;
                    }
                    self.pending.pop_front();
                }
            }
        }
        if flushed.delivered > 0 {
            debug!(delivered = flushed.delivered, remaining = self.pending.len(), "Flushed held events");
        }
        flushed
    }

    fn enqueue(&mut self, record: EventRecord) {
        if self.pending.len() >= self.max_pending {
            if let Some(oldest) = self.pending.pop_front() {
                warn!(event = oldest.name(), sequence = oldest.sequence, "Pending queue full, dropping oldest event");
            }
        }
        self.pending.push_back(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sink::MemorySink, Error, Result};

    /// Sink that answers from a script, then accepts everything
    #[derive(Default)]
    struct ScriptedSink {
        script: VecDeque<Result<()>>,
        accepted: Vec<u64>,
    }

    impl EventSink for ScriptedSink {
        fn emit(&mut self, record: &EventRecord) -> Result<()> {
            let result = self.script.pop_front().unwrap_or(Ok(()));
            if result.is_ok() {
                self.accepted.push(record.sequence);
            }
            result
        }
    }

    fn rejected(event: &str) -> Result<()> {
        Err(Error::SinkRejected {
            event: event.into(),
            reason: "schema mismatch".into(),
        })
    }

    fn play(count: u32) -> TrackingEvent {
        TrackingEvent::VideoPlay {
            current_time: 0.0,
            play_count: count,
            is_replay: count > 1,
        }
    }

    #[test]
    fn test_send_numbers_records() {
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(sink.clone(), SessionId::new(), None, 10);

        assert_eq!(dispatcher.send(play(1)), Delivery::Sent);
        assert_eq!(dispatcher.send(play(2)), Delivery::Sent);

        let sequences: Vec<_> = sink.records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_unavailable_sink_preserves_order() {
        let sink = MemorySink::new();
        sink.set_available(false);
        let mut dispatcher = Dispatcher::new(sink.clone(), SessionId::new(), None, 10);

        assert_eq!(dispatcher.send(play(1)), Delivery::Queued);
        assert_eq!(dispatcher.send(play(2)), Delivery::Queued);
        assert_eq!(dispatcher.pending_len(), 2);

        sink.set_available(true);
        assert_eq!(dispatcher.send(play(3)), Delivery::Sent);

        let counts: Vec<_> = sink
            .records()
            .iter()
            .map(|r| match r.event {
                TrackingEvent::VideoPlay { play_count, .. } => play_count,
                _ => 0,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[test]
    fn test_queue_is_bounded() {
        let sink = MemorySink::new();
        sink.set_available(false);
        let mut dispatcher = Dispatcher::new(sink.clone(), SessionId::new(), None, 2);

        for n in 1..=5 {
            dispatcher.send(play(n));
        }
        assert_eq!(dispatcher.pending_len(), 2);

        sink.set_available(true);
        assert_eq!(dispatcher.flush_pending(), 2);
        let sequences: Vec<_> = sink.records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![4, 5]);
    }

    #[test]
    fn test_final_send_never_queues() {
        let sink = MemorySink::new();
        sink.set_available(false);
        let mut dispatcher = Dispatcher::new(sink.clone(), SessionId::new(), None, 10);

        dispatcher.send(play(1));
        assert_eq!(dispatcher.send_final(play(2)), Delivery::Dropped);
        assert!(!dispatcher.has_pending());

        sink.set_available(true);
        assert_eq!(dispatcher.flush_pending(), 0);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_rejected_event_is_not_retried() {
        let sink = ScriptedSink {
            script: VecDeque::from([rejected("video_play")]),
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(sink, SessionId::new(), None, 10);

        assert_eq!(dispatcher.send(play(1)), Delivery::Dropped);
        assert!(!dispatcher.has_pending());
        assert_eq!(dispatcher.send(play(2)), Delivery::Sent);
        assert_eq!(dispatcher.sink().accepted, vec![2]);
    }

    #[test]
    fn test_rejection_behind_held_events_reports_dropped() {
        let sink = ScriptedSink {
            script: VecDeque::from([
                Err(Error::SinkUnavailable("client loading".into())),
                Ok(()),
                rejected("video_play"),
            ]),
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(sink, SessionId::new(), None, 10);

        assert_eq!(dispatcher.send(play(1)), Delivery::Queued);
        // Held record goes out first, then the new one is rejected
        assert_eq!(dispatcher.send(play(2)), Delivery::Dropped);
        assert!(!dispatcher.has_pending());
        assert_eq!(dispatcher.sink().accepted, vec![1]);

        assert_eq!(dispatcher.send(play(3)), Delivery::Sent);
        assert_eq!(dispatcher.sink().accepted, vec![1, 3]);
    }

    #[test]
    fn test_participant_attached() {
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(sink.clone(), SessionId::new(), Some("P-9".into()), 10);
        dispatcher.send(play(1));
        assert_eq!(sink.records()[0].participant_id.as_deref(), Some("P-9"));
    }
}
