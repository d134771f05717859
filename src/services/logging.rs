//! In-memory log ring for the `logging` action
//!
//! [`LogBufferLayer`] is added to the subscriber in main next to the JSON fmt
//! layer. It formats each event into one line and pushes it into a shared
//! [`LogBuffer`]. The buffer remembers how many lines arrived since the last
//! incremental read so the web page can poll for new lines only.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

struct Inner {
    lines: VecDeque<String>,
    /// Lines pushed since the last `refresh_new` read
    unread: usize,
}

/// Bounded ring of formatted log lines
#[derive(Clone)]
pub struct LogBuffer {
    capacity: usize,
    inner: Arc<Mutex<Inner>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Arc::new(Mutex::new(Inner {
                lines: VecDeque::with_capacity(capacity),
                unread: 0,
            })),
        }
    }

    pub fn push(&self, line: String) {
        let mut inner = self.inner.lock();
        if inner.lines.len() == self.capacity {
            inner.lines.pop_front();
        }
        inner.lines.push_back(line);
        inner.unread = (inner.unread + 1).min(self.capacity);
    }

    /// Every buffered line, or only the unread ones when `refresh_new` is set.
    /// An incremental read resets the unread counter.
    pub fn lines(&self, refresh_new: bool) -> Vec<String> {
        let mut inner = self.inner.lock();
        if !refresh_new {
            return inner.lines.iter().cloned().collect();
        }
        let skip = inner.lines.len() - inner.unread;
        let lines = inner.lines.iter().skip(skip).cloned().collect();
        inner.unread = 0;
        lines
    }

    pub fn layer(&self) -> LogBufferLayer {
        LogBufferLayer {
            buffer: self.clone(),
            min_level: Level::INFO,
        }
    }
}

/// Tracing layer feeding a [`LogBuffer`]
pub struct LogBufferLayer {
    buffer: LogBuffer,
    min_level: Level,
}

#[derive(Default)]
struct FieldVisitor {
    fields: BTreeMap<String, String>,
    message: Option<String>,
}

impl FieldVisitor {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record(field, value.to_string());
    }
}

impl<S> Layer<S> for LogBufferLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > self.min_level {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut line = format!(
            "{} {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.as_str(),
            visitor.message.unwrap_or_default()
        );
        for (key, value) in &visitor.fields {
            line.push_str(&format!(" {}={}", key, value));
        }
        self.buffer.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_ring_drops_oldest() {
        let buffer = LogBuffer::new(2);
        buffer.push("a".into());
        buffer.push("b".into());
        buffer.push("c".into());
        assert_eq!(buffer.lines(false), vec!["b", "c"]);
    }

    #[test]
    fn test_refresh_new_returns_only_unread() {
        let buffer = LogBuffer::new(10);
        buffer.push("one".into());
        buffer.push("two".into());
        assert_eq!(buffer.lines(true), vec!["one", "two"]);
        assert!(buffer.lines(true).is_empty());
        buffer.push("three".into());
        assert_eq!(buffer.lines(true), vec!["three"]);
        assert_eq!(buffer.lines(false).len(), 3);
    }

    #[test]
    fn test_layer_formats_events() {
        let buffer = LogBuffer::new(10);
        let subscriber = tracing_subscriber::registry().with(buffer.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(path = "/downloads/a.mkv", "Transfer finished");
            tracing::debug!("hidden");
        });
        let lines = buffer.lines(false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("INFO - Transfer finished path=/downloads/a.mkv"));
    }
}
