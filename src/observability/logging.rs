//! Structured logging with correlation enrichment.
//!
//! # Responsibilities
//! - Copy the flow's correlation identifiers and custom tags onto every log record
//! - Render records as JSON lines for production, pretty text for development
//! - Initialize the global subscriber from configuration
//!
//! # Design Decisions
//! - Enrichment is add-if-absent: a property the call site set explicitly always wins
//! - Enrichment never fails and never blocks on anything but the context's own lock
//! - Log level comes from `RUST_LOG` when set, otherwise from config

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::schema::{LogFormat, TelemetryConfig};
use crate::correlation::context::CorrelationContext;
use crate::correlation::store::{FlowContextAccessor, SharedAccessor};
use crate::error::TelemetryError;

/// A log record that can receive extra properties.
pub trait LogProperties {
    fn contains_property(&self, name: &str) -> bool;

    fn add_property(&mut self, name: &str, value: &str);

    /// Add `name = value` unless the record already has `name`. Returns true if added.
    fn add_property_if_absent(&mut self, name: &str, value: &str) -> bool {
        if self.contains_property(name) {
            return false;
        }
        self.add_property(name, value);
        true
    }
}

impl LogProperties for Map<String, Value> {
    fn contains_property(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn add_property(&mut self, name: &str, value: &str) {
        self.insert(name.to_string(), Value::String(value.to_string()));
    }
}

impl LogProperties for BTreeMap<String, String> {
    fn contains_property(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn add_property(&mut self, name: &str, value: &str) {
        self.insert(name.to_string(), value.to_string());
    }
}

/// Add the correlation properties of `context` to `record`. Returns how many were added.
pub fn enrich_record<R: LogProperties + ?Sized>(context: &CorrelationContext, record: &mut R) -> usize {
    let mut added = 0;
    for (field, value) in context.present_fields() {
        if record.add_property_if_absent(field.log_property(), value) {
            added += 1;
        }
    }
    for (key, value) in &context.custom_tags {
        if record.add_property_if_absent(key, value) {
            added += 1;
        }
    }
    added
}

/// Per-record hook reading the calling flow's context.
#[derive(Clone)]
pub struct CorrelationEnricher {
    accessor: SharedAccessor,
}

impl CorrelationEnricher {
    pub fn new(accessor: SharedAccessor) -> Self {
        Self { accessor }
    }

    /// Enrich `record` from the calling flow's context. Never creates a context.
    pub fn enrich<R: LogProperties + ?Sized>(&self, record: &mut R) -> usize {
        match self.accessor.peek() {
            Some(handle) => handle.read(|context| enrich_record(context, record)),
            None => 0,
        }
    }
}

impl Default for CorrelationEnricher {
    fn default() -> Self {
        Self::new(FlowContextAccessor::shared())
    }
}

impl fmt::Debug for CorrelationEnricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationEnricher").finish_non_exhaustive()
    }
}

/// Collects event fields into a JSON object.
struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl Visit for JsonVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.0.insert(field.name().to_string(), Value::Number(n));
        }
    }
}

/// `tracing` layer writing one enriched JSON object per event.
///
/// Each line carries `timestamp`, `level`, `target`, the enclosing span
/// name, every event field, the correlation properties, and the static
/// resource attributes (`service.name`, `deployment.environment`).
pub struct CorrelationLogLayer<W = fn() -> io::Stdout> {
    make_writer: W,
    enricher: CorrelationEnricher,
    resource: Map<String, Value>,
}

impl CorrelationLogLayer {
    pub fn new(enricher: CorrelationEnricher) -> Self {
        Self {
            make_writer: io::stdout,
            enricher,
            resource: Map::new(),
        }
    }
}

impl<W> CorrelationLogLayer<W> {
    pub fn with_writer<W2>(self, make_writer: W2) -> CorrelationLogLayer<W2>
    where
        W2: for<'w> MakeWriter<'w> + 'static,
    {
        CorrelationLogLayer {
            make_writer,
            enricher: self.enricher,
            resource: self.resource,
        }
    }

    /// Static attribute added to every record (unless the event sets it).
    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource.insert(key.into(), Value::String(value.into()));
        self
    }

    fn render<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> Map<String, Value>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let metadata = event.metadata();
        let mut record = Map::new();
        event.record(&mut JsonVisitor(&mut record));

        self.enricher.enrich(&mut record);

        for (key, value) in &self.resource {
            record.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if let Some(span) = ctx.event_span(event) {
            record
                .entry("span")
                .or_insert_with(|| Value::String(span.name().to_string()));
        }
        record.insert(
            "timestamp".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        record.insert("level".to_string(), Value::String(metadata.level().to_string()));
        record.insert("target".to_string(), Value::String(metadata.target().to_string()));
        record
    }
}

impl<S, W> Layer<S> for CorrelationLogLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let record = self.render(event, &ctx);
        let Ok(mut line) = serde_json::to_vec(&Value::Object(record)) else {
            return;
        };
        line.push(b'\n');

        let mut writer = self.make_writer.make_writer_for(event.metadata());
        let _ = writer.write_all(&line);
    }
}

/// Install the global subscriber described by `config`.
///
/// JSON output goes through [`CorrelationLogLayer`]; pretty output uses the
/// stock fmt layer, where correlation ids show up as request span fields.
pub fn init_logging(
    config: &TelemetryConfig,
    enricher: CorrelationEnricher,
) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            let layer = CorrelationLogLayer::new(enricher)
                .with_resource("service.name", config.service_name.as_str())
                .with_resource("deployment.environment", config.environment.as_str());
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;
        }
    }
    Ok(())
}
