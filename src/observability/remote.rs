//! Remote indexed-log sink.
//!
//! # Responsibilities
//! - Turn tracing events into Elasticsearch bulk documents
//! - Hand documents to a background task without blocking the caller
//! - Batch documents and flush once a byte threshold is reached
//!
//! # Design Decisions
//! - `try_send` on a bounded channel: a full or closed channel drops the entry
//! - Delivery failures are reported on the console only, never to callers
//! - Events emitted by this module are never shipped (no feedback loop)
//! - Fields of the enclosing spans (request id, method, uri) are copied into
//!   each document; the innermost span wins on a name clash

use axum::http::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::observability::metrics;

/// Target of events produced by the sink itself.
pub const SINK_TARGET: &str = module_path!();

/// Messages accepted by the sink task.
#[derive(Debug)]
pub enum SinkMessage {
    /// One bulk action/document pair, newline terminated.
    Entry(String),
    /// Flush whatever is buffered, then acknowledge.
    Flush(oneshot::Sender<()>),
}

/// NDJSON accumulator with a flush threshold.
#[derive(Debug)]
pub struct BulkBuffer {
    body: String,
    entries: usize,
    flush_bytes: usize,
}

impl BulkBuffer {
    pub fn new(flush_bytes: usize) -> Self {
        Self {
            body: String::new(),
            entries: 0,
            flush_bytes,
        }
    }

    /// Append an entry. Returns true once the buffer should be flushed.
    pub fn push(&mut self, entry: &str) -> bool {
        self.body.push_str(entry);
        self.entries += 1;
        self.body.len() >= self.flush_bytes
    }

    /// Take the buffered payload, leaving the buffer empty.
    pub fn take(&mut self) -> Option<String> {
        if self.body.is_empty() {
            return None;
        }
        self.entries = 0;
        Some(std::mem::take(&mut self.body))
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Collects event fields into a JSON object.
#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }
}

/// Fields recorded on a span, kept in its extensions.
struct SpanFields(Map<String, Value>);

/// Tracing layer that forwards events to the sink task.
pub struct RemoteLayer {
    tx: mpsc::Sender<SinkMessage>,
    action: String,
}

impl RemoteLayer {
    pub fn new(tx: mpsc::Sender<SinkMessage>, index: &str) -> Self {
        let action = serde_json::json!({ "index": { "_index": index } }).to_string();
        Self { tx, action }
    }

    fn encode(&self, event: &Event<'_>, span_fields: Map<String, Value>) -> String {
        let meta = event.metadata();
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut doc = Map::new();
        doc.insert(
            "@timestamp".into(),
            Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        doc.insert("level".into(), Value::String(meta.level().as_str().to_lowercase()));
        doc.insert("target".into(), Value::String(meta.target().to_string()));
        doc.extend(span_fields);
        if let Some(message) = visitor.fields.remove("message") {
            doc.insert("msg".into(), message);
        }
        doc.extend(visitor.fields);

        format!("{}\n{}\n", self.action, Value::Object(doc))
    }
}

impl<S> Layer<S> for RemoteLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor {
                fields: std::mem::take(fields),
            };
            values.record(&mut visitor);
            *fields = visitor.fields;
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if event.metadata().target().starts_with(SINK_TARGET) {
            return;
        }

        let mut span_fields = Map::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    span_fields.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }

        let entry = self.encode(event, span_fields);
        if self.tx.try_send(SinkMessage::Entry(entry)).is_err() {
            metrics::record_log_drop();
        }
    }
}

/// Background task that batches entries and posts them to `<url>/_bulk`.
pub struct RemoteSink {
    client: reqwest::Client,
    endpoint: String,
    buffer: BulkBuffer,
    interval: Duration,
    rx: mpsc::Receiver<SinkMessage>,
}

impl RemoteSink {
    pub fn new(
        remote_url: &str,
        flush_bytes: usize,
        interval: Duration,
        rx: mpsc::Receiver<SinkMessage>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/_bulk", remote_url.trim_end_matches('/')),
            buffer: BulkBuffer::new(flush_bytes),
            interval,
            rx,
        })
    }

    pub async fn run(mut self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(SinkMessage::Entry(entry)) => {
                        if self.buffer.push(&entry) {
                            self.flush().await;
                        }
                    }
                    Some(SinkMessage::Flush(ack)) => {
                        self.flush().await;
                        let _ = ack.send(());
                    }
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                _ = ticker.tick() => self.flush().await,
            }
        }
        tracing::debug!("Remote log sink stopped");
    }

    async fn flush(&mut self) {
        let entries = self.buffer.entries();
        let Some(body) = self.buffer.take() else {
            return;
        };

        let result = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::trace!(entries, "Flushed log batch");
            }
            Ok(resp) => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    status = %resp.status(),
                    entries,
                    "Remote log sink rejected batch"
                );
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    entries,
                    "Remote log sink unreachable, batch dropped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_buffer_threshold() {
        let mut buffer = BulkBuffer::new(10);
        assert!(!buffer.push("12345"));
        assert!(buffer.push("67890"));
        assert_eq!(buffer.entries(), 2);
        assert_eq!(buffer.take().as_deref(), Some("1234567890"));
        assert!(buffer.is_empty());
        assert_eq!(buffer.take(), None);
    }

    #[test]
    fn test_event_encoded_as_bulk_pair() {
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry().with(RemoteLayer::new(tx, "monitoring_test"));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(tag = "user_api_call_issue", attempt = 2u64, "upstream down");
        });

        let SinkMessage::Entry(entry) = rx.try_recv().unwrap() else {
            panic!("expected an entry");
        };
        let mut lines = entry.lines();
        let action: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        let doc: Value = serde_json::from_str(lines.next().unwrap()).unwrap();

        assert_eq!(action["index"]["_index"], "monitoring_test");
        assert_eq!(doc["level"], "warn");
        assert_eq!(doc["msg"], "upstream down");
        assert_eq!(doc["tag"], "user_api_call_issue");
        assert_eq!(doc["attempt"], 2);
        assert!(doc["@timestamp"].is_string());
    }

    #[test]
    fn test_span_fields_copied_into_document() {
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry().with(RemoteLayer::new(tx, "idx"));

        tracing::subscriber::with_default(subscriber, || {
            let request = tracing::info_span!(
                "request",
                request_id = "abc-123",
                method = "GET",
                route = tracing::field::Empty
            );
            let _outer = request.enter();
            request.record("route", "/users");

            let stage = tracing::info_span!("stage", method = "POST");
            let _inner = stage.enter();
            tracing::info!("inside request");
        });

        let SinkMessage::Entry(entry) = rx.try_recv().unwrap() else {
            panic!("expected an entry");
        };
        let doc: Value = serde_json::from_str(entry.lines().nth(1).unwrap()).unwrap();
        assert_eq!(doc["request_id"], "abc-123");
        assert_eq!(doc["route"], "/users");
        assert_eq!(doc["method"], "POST");
        assert_eq!(doc["msg"], "inside request");
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let subscriber = tracing_subscriber::registry().with(RemoteLayer::new(tx, "idx"));

        tracing::subscriber::with_default(subscriber, || {
            for i in 0..5 {
                tracing::info!(i, "burst");
            }
        });

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_own_events_not_shipped() {
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry().with(RemoteLayer::new(tx, "idx"));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: SINK_TARGET, "sink trouble");
        });

        assert!(rx.try_recv().is_err());
    }
}
