//! Flow-scoped context storage.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → request_scope()        opens a task-local slot for the flow
//!     → current()              lazily binds a ContextHandle in the slot
//!     → .await points          the slot travels with the task, not the thread
//!     → spawn()/inherit()      child flow gets a new slot holding the SAME handle
//! ```
//!
//! # Inheritance Rule
//! A child flow started with [`spawn`] or [`inherit`] receives a clone of the
//! parent's [`ContextHandle`] captured at branch time. In-place updates
//! (`set_*`, `add_custom_tag`, `clear`) made by either side are visible to
//! both. Rebinding a slot with [`bind`] or [`unbind`] only affects the side
//! that did it. Sibling children fanned out from one parent all share the
//! parent's handle.
//!
//! A plain `tokio::spawn` does not carry the slot: the spawned task starts
//! without a flow. Inside a runtime but outside any flow there is no slot at
//! all: [`current`] hands out a fresh, unbound context on every call, [`peek`]
//! returns `None` and [`bind`] is discarded. Code running with no runtime
//! (plain threads, `#[test]` functions) uses a per-thread fallback slot.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::task_local;

use crate::correlation::context::ContextHandle;
use crate::correlation::span::ActiveSpan;

#[derive(Default)]
struct FlowSlot {
    context: RefCell<Option<ContextHandle>>,
    span: RefCell<Option<Arc<dyn ActiveSpan>>>,
    /// Opened for one inbound request by [`request_scope`].
    request: bool,
}

impl FlowSlot {
    fn new(context: Option<ContextHandle>, span: Option<Arc<dyn ActiveSpan>>) -> Self {
        Self {
            context: RefCell::new(context),
            span: RefCell::new(span),
            request: false,
        }
    }

    fn context_or_init(&self) -> ContextHandle {
        self.context
            .borrow_mut()
            .get_or_insert_with(ContextHandle::new)
            .clone()
    }
}

task_local! {
    static FLOW: FlowSlot;
}

thread_local! {
    static THREAD_SLOT: FlowSlot = FlowSlot::default();
}

fn with_slot<R>(f: impl FnOnce(&FlowSlot) -> R) -> R {
    if in_flow() {
        FLOW.with(f)
    } else if tokio::runtime::Handle::try_current().is_err() {
        THREAD_SLOT.with(f)
    } else {
        // A task outside any flow: worker threads are shared, so nothing persists.
        f(&FlowSlot::default())
    }
}

/// True when called from inside a flow scope.
pub fn in_flow() -> bool {
    FLOW.try_with(|_| ()).is_ok()
}

/// Context bound to the calling flow, created empty on first access.
///
/// Repeated calls in one flow, across any number of `.await` points,
/// return handles to the same context.
pub fn current() -> ContextHandle {
    with_slot(FlowSlot::context_or_init)
}

/// Context bound to the calling flow, without creating one.
pub fn peek() -> Option<ContextHandle> {
    with_slot(|slot| slot.context.borrow().clone())
}

/// Bind `handle` to the calling flow, returning the previous binding.
pub fn bind(handle: ContextHandle) -> Option<ContextHandle> {
    with_slot(|slot| slot.context.replace(Some(handle)))
}

/// Drop the calling flow's binding; the next [`current`] creates a fresh context.
pub fn unbind() -> Option<ContextHandle> {
    with_slot(|slot| slot.context.take())
}

/// Bind `span` as the calling flow's active span, returning the previous one.
pub fn bind_span(span: Option<Arc<dyn ActiveSpan>>) -> Option<Arc<dyn ActiveSpan>> {
    with_slot(|slot| slot.span.replace(span))
}

/// Run `f` with the flow's active span.
///
/// An explicitly bound span wins; otherwise the current `tracing` span is
/// used when it is enabled. `None` means no span is active.
pub fn with_active_span<R>(f: impl FnOnce(Option<&dyn ActiveSpan>) -> R) -> R {
    let bound = with_slot(|slot| slot.span.borrow().clone());
    if let Some(span) = bound {
        return f(Some(span.as_ref()));
    }

    let current = tracing::Span::current();
    if current.is_disabled() {
        f(None)
    } else {
        f(Some(&current))
    }
}

/// Run `future` as a new flow with an empty slot.
pub async fn scope<F: Future>(future: F) -> F::Output {
    FLOW.scope(FlowSlot::default(), future).await
}

/// Run `future` as a new flow bound to `handle`.
pub async fn scope_with<F: Future>(handle: ContextHandle, future: F) -> F::Output {
    FLOW.scope(FlowSlot::new(Some(handle), None), future).await
}

/// Run `future` as the flow of one inbound request.
///
/// Always a fresh flow, even when the caller is already inside one, so
/// requests dispatched in-process from a single flow never share a context.
pub async fn request_scope<F: Future>(future: F) -> F::Output {
    let slot = FlowSlot {
        request: true,
        ..FlowSlot::default()
    };
    FLOW.scope(slot, future).await
}

/// True when the calling flow was opened by [`request_scope`].
pub fn in_request_flow() -> bool {
    FLOW.try_with(|slot| slot.request).unwrap_or(false)
}

/// Join the calling request's flow, or open a fresh one if there is none.
///
/// Layers stacked on one request share its flow; any other caller (a plain
/// task, an outer flow, a spawned child) gets a new request flow.
pub async fn ensure_request_flow<F: Future>(future: F) -> F::Output {
    if in_request_flow() {
        future.await
    } else {
        request_scope(future).await
    }
}

/// Run `future` with `span` as its active span, sharing the caller's context.
pub async fn with_span<F: Future>(span: Arc<dyn ActiveSpan>, future: F) -> F::Output {
    let context = current();
    let slot = FlowSlot {
        request: in_request_flow(),
        ..FlowSlot::new(Some(context), Some(span))
    };
    FLOW.scope(slot, future).await
}

/// Wrap `future` as a child flow of the caller.
///
/// The parent's context is created if needed, so parent and child always
/// share one handle. The active span binding is inherited as well.
pub fn inherit<F: Future>(future: F) -> impl Future<Output = F::Output> {
    let child = with_slot(|slot| {
        FlowSlot::new(Some(slot.context_or_init()), slot.span.borrow().clone())
    });
    FLOW.scope(child, future)
}

/// `tokio::spawn` that carries the caller's context into the new task.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(inherit(future))
}

/// Source of the context for the calling flow.
///
/// Middleware and the log enricher read the context through this seam so a
/// host can supply its own storage.
pub trait ContextAccessor: Send + Sync {
    /// Never fails; creates an empty context when the flow has none.
    fn current(&self) -> ContextHandle;

    /// The flow's context if one is bound, without creating it.
    fn peek(&self) -> Option<ContextHandle> {
        Some(self.current())
    }
}

pub type SharedAccessor = Arc<dyn ContextAccessor>;

/// Accessor backed by the task-local flow slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowContextAccessor;

impl FlowContextAccessor {
    pub fn shared() -> SharedAccessor {
        Arc::new(FlowContextAccessor)
    }
}

impl ContextAccessor for FlowContextAccessor {
    fn current(&self) -> ContextHandle {
        current()
    }

    fn peek(&self) -> Option<ContextHandle> {
        peek()
    }
}
