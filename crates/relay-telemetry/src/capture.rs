//! In-memory capture of warn+ events.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// One captured log event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// RFC 3339 capture time (UTC).
    pub timestamp: String,
    /// Event level.
    pub level: Level,
    /// Module path of the emitting code.
    pub target: String,
    /// The `message` field.
    pub message: String,
    /// All other structured fields.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl CapturedEvent {
    /// String form of a structured field, if present.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Bounded ring buffer shared between a [`CaptureLayer`] and its readers.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    events: Arc<Mutex<VecDeque<CapturedEvent>>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer retaining at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn push(&self, event: CapturedEvent) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            let _ = events.pop_front();
        }
        events.push_back(event);
    }

    /// Up to `limit` most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CapturedEvent> {
        self.events.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Number of retained events at `level` or more severe.
    pub fn count_at_least(&self, level: Level) -> usize {
        self.events.lock().iter().filter(|e| e.level <= level).count()
    }

    /// Retained events whose message contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.message.contains(needle))
            .cloned()
            .collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// `tracing` layer that copies events at or above a level into a [`LogBuffer`].
pub struct CaptureLayer {
    buffer: LogBuffer,
    min_level: Level,
}

impl CaptureLayer {
    /// Capture WARN and ERROR events.
    pub fn new(buffer: LogBuffer) -> Self {
        Self::with_level(buffer, Level::WARN)
    }

    /// Capture events at `min_level` or more severe.
    pub fn with_level(buffer: LogBuffer, min_level: Level) -> Self {
        Self { buffer, min_level }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > self.min_level {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(CapturedEvent {
            timestamp: Utc::now().to_rfc3339(),
            level,
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(val);
        } else {
            let _ = self
                .fields
                .insert(field.name().to_string(), serde_json::Value::String(val));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            let _ = self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture<F: FnOnce()>(buffer: &LogBuffer, level: Level, f: F) {
        let subscriber =
            tracing_subscriber::registry().with(CaptureLayer::with_level(buffer.clone(), level));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn captures_warn_and_error_only() {
        let buffer = LogBuffer::new(16);
        capture(&buffer, Level::WARN, || {
            tracing::info!("ignored");
            tracing::debug!("ignored too");
            tracing::warn!("slow client");
            tracing::error!("broken");
        });
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.count_at_least(Level::ERROR), 1);
        assert_eq!(buffer.count_at_least(Level::WARN), 2);
    }

    #[test]
    fn records_structured_fields() {
        let buffer = LogBuffer::new(16);
        capture(&buffer, Level::WARN, || {
            tracing::warn!(conn_id = "conn_1", failed = 3u64, fatal = true, "send failed");
        });
        let events = buffer.recent(1);
        let event = &events[0];
        assert_eq!(event.message, "send failed");
        assert_eq!(event.field("conn_id").as_deref(), Some("conn_1"));
        assert_eq!(event.field("failed").as_deref(), Some("3"));
        assert_eq!(event.field("fatal").as_deref(), Some("true"));
        assert!(event.field("missing").is_none());
    }

    #[test]
    fn display_fields_are_captured() {
        let buffer = LogBuffer::new(16);
        let err = std::io::Error::other("boom");
        capture(&buffer, Level::WARN, || {
            tracing::warn!(error = %err, "io failed");
        });
        assert_eq!(buffer.recent(1)[0].field("error").as_deref(), Some("boom"));
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let buffer = LogBuffer::new(2);
        capture(&buffer, Level::WARN, || {
            tracing::warn!("one");
            tracing::warn!("two");
            tracing::warn!("three");
        });
        let recent = buffer.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "three");
        assert_eq!(recent[1].message, "two");
    }

    #[test]
    fn matching_filters_by_message() {
        let buffer = LogBuffer::new(8);
        capture(&buffer, Level::INFO, || {
            tracing::info!("client connected");
            tracing::info!("client disconnected");
            tracing::info!("broadcast");
        });
        assert_eq!(buffer.matching("client").len(), 2);
        assert!(buffer.matching("nothing").is_empty());
    }

    #[test]
    fn zero_capacity_clamped_to_one() {
        let buffer = LogBuffer::new(0);
        capture(&buffer, Level::WARN, || {
            tracing::warn!("a");
            tracing::warn!("b");
        });
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn empty_buffer() {
        let buffer = LogBuffer::new(4);
        assert!(buffer.is_empty());
        assert!(buffer.recent(5).is_empty());
    }
}
