//! Active span capability.
//!
//! The sync layer only needs to attach string tags to whatever span is open
//! for the flow. Any key is accepted, including custom tags. Keeping that behind a one-method trait lets the context
//! stay independent of the concrete tracing backend.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing_subscriber::registry::{LookupSpan, Registry};

/// A span that string-valued tags can be attached to.
pub trait ActiveSpan: Send + Sync {
    /// Attach `key = value`, overwriting any previous value for `key`.
    fn attach_tag(&self, key: &str, value: &str);
}

/// Tags attached to a `tracing` span, kept in the registry's span extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanTags(pub BTreeMap<String, String>);

impl SpanTags {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Every tag is stored in the span's [`SpanTags`] extension, whatever its
/// key. Keys the span declared up front (see
/// [`crate::observability::tracing::CorrelationMakeSpan`]) are also recorded
/// as span fields so layers see them through `on_record`. Disabled spans
/// ignore tags; subscribers without a `Registry` keep only declared fields.
impl ActiveSpan for tracing::Span {
    fn attach_tag(&self, key: &str, value: &str) {
        self.with_subscriber(|(id, dispatch)| {
            let Some(registry) = dispatch.downcast_ref::<Registry>() else {
                return;
            };
            let Some(span) = registry.span(id) else {
                return;
            };
            let mut extensions = span.extensions_mut();
            match extensions.get_mut::<SpanTags>() {
                Some(tags) => {
                    tags.0.insert(key.to_string(), value.to_string());
                }
                None => {
                    let mut tags = SpanTags::default();
                    tags.0.insert(key.to_string(), value.to_string());
                    extensions.insert(tags);
                }
            }
        });

        if self.has_field(key) {
            self.record(key, value);
        }
    }
}

/// Tags attached to `span` so far. Empty for disabled spans.
pub fn span_tags(span: &tracing::Span) -> SpanTags {
    span.with_subscriber(|(id, dispatch)| {
        dispatch
            .downcast_ref::<Registry>()
            .and_then(|registry| registry.span(id))
            .and_then(|span| {
                let extensions = span.extensions();
                extensions.get::<SpanTags>().cloned()
            })
    })
    .flatten()
    .unwrap_or_default()
}

/// In-memory span that keeps every tag it receives.
#[derive(Debug, Default)]
pub struct TagRecorder {
    tags: Mutex<HashMap<String, String>>,
}

impl TagRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value last attached under `key`.
    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags.lock().get(key).cloned()
    }

    /// Copy of every tag attached so far.
    pub fn tags(&self) -> HashMap<String, String> {
        self.tags.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.tags.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.lock().is_empty()
    }
}

impl ActiveSpan for TagRecorder {
    fn attach_tag(&self, key: &str, value: &str) {
        self.tags.lock().insert(key.to_string(), value.to_string());
    }
}
