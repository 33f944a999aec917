//! Correlation context and the set-and-mirror operations.
//!
//! # Responsibilities
//! - Hold the five correlation identifiers and custom tags of one flow
//! - Update a field and mirror it onto the active span in one call
//! - Reset everything for reuse or test isolation
//!
//! # Design Decisions
//! - [`CorrelationContext`] is plain data; [`ContextHandle`] is "the context
//!   object" a flow owns and hands to children by reference
//! - The handle's mutex is held only for a single read or write. It makes the
//!   handle `Send + Sync` for tokio, it does not make concurrent mutation of
//!   one context from two flows meaningful: callers must not do that
//! - Mirroring happens after the write lock is released, so a span backend
//!   that logs cannot re-enter the context while it is locked

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::correlation::fields::CorrelationField;
use crate::correlation::span::ActiveSpan;
use crate::correlation::store;

/// Correlation identifiers and custom tags for one logical flow.
///
/// Every field is independently optional; a new context has none set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationContext {
    pub request_id: Option<String>,
    pub client_id: Option<String>,
    pub tunnel_id: Option<String>,
    pub instance_id: Option<String>,
    pub session_id: Option<String>,
    /// Low-cardinality metadata such as tier or region.
    pub custom_tags: HashMap<String, String>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: CorrelationField) -> Option<&str> {
        match field {
            CorrelationField::RequestId => self.request_id.as_deref(),
            CorrelationField::ClientId => self.client_id.as_deref(),
            CorrelationField::TunnelId => self.tunnel_id.as_deref(),
            CorrelationField::InstanceId => self.instance_id.as_deref(),
            CorrelationField::SessionId => self.session_id.as_deref(),
        }
    }

    /// Write a field without touching any span.
    pub fn set(&mut self, field: CorrelationField, value: String) {
        *self.slot_mut(field) = Some(value);
    }

    fn slot_mut(&mut self, field: CorrelationField) -> &mut Option<String> {
        match field {
            CorrelationField::RequestId => &mut self.request_id,
            CorrelationField::ClientId => &mut self.client_id,
            CorrelationField::TunnelId => &mut self.tunnel_id,
            CorrelationField::InstanceId => &mut self.instance_id,
            CorrelationField::SessionId => &mut self.session_id,
        }
    }

    /// Fields that are set to a non-empty value, in [`CorrelationField::ALL`] order.
    pub fn present_fields(&self) -> impl Iterator<Item = (CorrelationField, &str)> + '_ {
        CorrelationField::ALL.into_iter().filter_map(move |field| {
            self.get(field)
                .filter(|value| !value.is_empty())
                .map(|value| (field, value))
        })
    }

    /// Reset every field to absent and drop all custom tags. Idempotent.
    pub fn clear(&mut self) {
        for field in CorrelationField::ALL {
            *self.slot_mut(field) = None;
        }
        self.custom_tags.clear();
    }

    pub fn is_empty(&self) -> bool {
        CorrelationField::ALL.iter().all(|f| self.get(*f).is_none()) && self.custom_tags.is_empty()
    }
}

/// Shared reference to the context owned by a flow.
///
/// Clones point at the same context: an in-place update through one clone
/// is visible through all of them. Rebinding a flow's slot to another handle
/// (see [`store::bind`]) is not.
#[derive(Clone, Default)]
pub struct ContextHandle {
    inner: Arc<Mutex<CorrelationContext>>,
}

impl ContextHandle {
    /// A handle to a new, empty context.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_context(context: CorrelationContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// True when both handles refer to the same context object.
    pub fn ptr_eq(&self, other: &ContextHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy of the current field values.
    pub fn snapshot(&self) -> CorrelationContext {
        self.inner.lock().clone()
    }

    /// Borrow the context for the duration of `f`. `f` must not touch this handle.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&CorrelationContext) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn get(&self, field: CorrelationField) -> Option<String> {
        self.inner.lock().get(field).map(str::to_owned)
    }

    pub fn request_id(&self) -> Option<String> {
        self.get(CorrelationField::RequestId)
    }

    pub fn client_id(&self) -> Option<String> {
        self.get(CorrelationField::ClientId)
    }

    pub fn tunnel_id(&self) -> Option<String> {
        self.get(CorrelationField::TunnelId)
    }

    pub fn instance_id(&self) -> Option<String> {
        self.get(CorrelationField::InstanceId)
    }

    pub fn session_id(&self) -> Option<String> {
        self.get(CorrelationField::SessionId)
    }

    pub fn custom_tag(&self, key: &str) -> Option<String> {
        self.inner.lock().custom_tags.get(key).cloned()
    }

    pub fn custom_tags(&self) -> HashMap<String, String> {
        self.inner.lock().custom_tags.clone()
    }

    /// Reset the shared context in place. Every holder of this handle sees the reset.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Write `field` and attach the same value to `span` under the field's fixed tag.
    pub fn set_field_mirrored(
        &self,
        field: CorrelationField,
        value: impl Into<String>,
        span: Option<&dyn ActiveSpan>,
    ) {
        let value = value.into();
        self.inner.lock().set(field, value.clone());
        if let Some(span) = span {
            span.attach_tag(field.span_tag(), &value);
        }
    }

    /// Insert or overwrite a custom tag and attach it verbatim to `span`.
    pub fn add_custom_tag_mirrored(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        span: Option<&dyn ActiveSpan>,
    ) {
        let (key, value) = (key.into(), value.into());
        self.inner
            .lock()
            .custom_tags
            .insert(key.clone(), value.clone());
        if let Some(span) = span {
            span.attach_tag(&key, &value);
        }
    }

    /// Write `field` and mirror it onto the flow's active span, if any.
    pub fn set_field(&self, field: CorrelationField, value: impl Into<String>) {
        let value = value.into();
        store::with_active_span(|span| self.set_field_mirrored(field, value, span));
    }

    pub fn set_request_id(&self, request_id: impl Into<String>) {
        self.set_field(CorrelationField::RequestId, request_id);
    }

    pub fn set_client_id(&self, client_id: impl Into<String>) {
        self.set_field(CorrelationField::ClientId, client_id);
    }

    pub fn set_tunnel_id(&self, tunnel_id: impl Into<String>) {
        self.set_field(CorrelationField::TunnelId, tunnel_id);
    }

    pub fn set_instance_id(&self, instance_id: impl Into<String>) {
        self.set_field(CorrelationField::InstanceId, instance_id);
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.set_field(CorrelationField::SessionId, session_id);
    }

    pub fn add_custom_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        store::with_active_span(|span| self.add_custom_tag_mirrored(key, value, span));
    }

    /// Set the tunnel identity in one call (handshake completion).
    ///
    /// `tunnel_id` and `client_id` are always written; `instance_id` and
    /// `session_id` only when given. Each written field is mirrored on its own.
    pub fn set_all(
        &self,
        tunnel_id: &str,
        client_id: &str,
        instance_id: Option<&str>,
        session_id: Option<&str>,
    ) {
        self.set_tunnel_id(tunnel_id);
        self.set_client_id(client_id);

        if let Some(instance_id) = instance_id {
            self.set_instance_id(instance_id);
        }
        if let Some(session_id) = session_id {
            self.set_session_id(session_id);
        }
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextHandle").field(&*self.inner.lock()).finish()
    }
}
