//! In-memory span capture.
//!
//! [`CaptureLayer`] is a `tracing_subscriber` layer that records every span
//! it sees: name, parent, fields (including ones recorded after creation)
//! and open/close times. Records land in a [`SpanCapture`] handle that tests
//! keep to query after the work is done.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::span::{Attributes, Record};
use tracing::{Id, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

/// One closed span.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedSpan {
    /// Subscriber-assigned span id.
    pub id: u64,
    /// Span name, e.g. `rag.retrieve`.
    pub name: String,
    /// Name of the enclosing span, if any.
    pub parent: Option<String>,
    /// Field values, rendered to JSON.
    pub fields: HashMap<String, serde_json::Value>,
    /// Nanoseconds since the Unix epoch when the span was created.
    pub start_time: u128,
    /// Nanoseconds since the Unix epoch when the span closed.
    pub end_time: u128,
}

impl CapturedSpan {
    /// Time between creation and close.
    pub fn duration(&self) -> Duration {
        let nanos = self.end_time.saturating_sub(self.start_time);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// A field as a string, if it was recorded as one.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    /// A field as an unsigned integer.
    pub fn field_u64(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(|v| v.as_u64())
    }
}

/// Shared storage for captured spans, in close order.
#[derive(Debug, Clone, Default)]
pub struct SpanCapture {
    spans: Arc<RwLock<Vec<CapturedSpan>>>,
}

impl SpanCapture {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// A layer writing into this capture.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer { capture: self.clone() }
    }

    /// A complete subscriber with only this capture attached, for
    /// `tracing::subscriber::set_default`.
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
        Registry::default().with(self.layer())
    }

    /// Every span closed so far.
    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.read().map(|spans| spans.clone()).unwrap_or_default()
    }

    /// Closed spans with the given name.
    pub fn spans_named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }

    /// Names of closed spans, in close order.
    pub fn names(&self) -> Vec<String> {
        self.spans().into_iter().map(|s| s.name).collect()
    }

    /// Forget everything captured so far.
    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.write() {
            spans.clear();
        }
    }

    fn push(&self, span: CapturedSpan) {
        if let Ok(mut spans) = self.spans.write() {
            spans.push(span);
        }
    }
}

/// A tracing layer that captures spans in memory.
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    capture: SpanCapture,
}

struct SpanStart(u128);

#[derive(Clone, Default)]
struct SpanFields(HashMap<String, serde_json::Value>);

fn now_nanos() -> u128 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_nanos()
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        extensions.insert(SpanStart(now_nanos()));
        extensions.insert(SpanFields(visitor.0));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let extensions = span.extensions();
        let start_time = extensions.get::<SpanStart>().map_or(0, |s| s.0);
        let fields = extensions.get::<SpanFields>().cloned().unwrap_or_default().0;

        self.capture.push(CapturedSpan {
            id: id.into_u64(),
            name: span.metadata().name().to_string(),
            parent: span.parent().map(|p| p.metadata().name().to_string()),
            fields,
            start_time,
            end_time: now_nanos(),
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{Instrument, info_span};

    #[test]
    fn captures_nested_spans_with_late_fields() {
        let capture = SpanCapture::new();
        tracing::subscriber::with_default(capture.subscriber(), || {
            let outer = info_span!("rag.ask", outcome = tracing::field::Empty);
            let _entered = outer.enter();
            info_span!("rag.retrieve", k = 4usize, entries = 12usize).in_scope(|| {});
            outer.record("outcome", "answered");
        });

        let names = capture.names();
        assert_eq!(names, vec!["rag.retrieve", "rag.ask"]);

        let retrieve = &capture.spans_named("rag.retrieve")[0];
        assert_eq!(retrieve.parent.as_deref(), Some("rag.ask"));
        assert_eq!(retrieve.field_u64("k"), Some(4));
        assert!(retrieve.end_time >= retrieve.start_time);

        let ask = &capture.spans_named("rag.ask")[0];
        assert_eq!(ask.field_str("outcome"), Some("answered"));
        assert!(ask.parent.is_none());
    }

    #[tokio::test]
    async fn captures_spans_across_await_points() {
        let capture = SpanCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        .instrument(info_span!("rag.generate", backend = "mock"))
        .await;

        let spans = capture.spans_named("rag.generate");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].field_str("backend"), Some("mock"));
        assert!(spans[0].duration() >= Duration::from_millis(5));

        capture.clear();
        assert!(capture.spans().is_empty());
    }
}
