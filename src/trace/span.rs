//! Scoped span lifecycle management.

use std::error::Error;
use std::marker::PhantomData;
use std::thread;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, ContextGuard, Key, KeyValue};

const EVENT_ERROR: &str = "error";
const ERROR_OBJECT: Key = Key::from_static_str("error.object");
const ERROR_STACK: Key = Key::from_static_str("stack");

/// A server span bound to the extent of one inbound call.
///
/// Opening the scope starts the span and attaches it as the current
/// OpenTelemetry context, so downstream instrumentation parents correctly.
/// Dropping the scope ends the span and detaches the context — on normal
/// return, on error return, and while unwinding from a panic alike. The span
/// itself is never handed out, which keeps "closed exactly once, after all
/// mutation" a structural property rather than a convention.
#[must_use = "the span is closed when the scope is dropped"]
pub struct ScopedSpan {
    cx: Context,
    _guard: ContextGuard,
    _not_send: PhantomData<*const ()>,
}

impl ScopedSpan {
    /// Start a `Server` span named `operation` and make it current.
    ///
    /// The span is a child of `parent` when one was extracted from the call
    /// metadata, and a root span otherwise. `tags` are attached at start
    /// time, in the order given.
    pub fn open(
        tracer: &BoxedTracer,
        operation: &str,
        parent: Option<Context>,
        tags: Vec<KeyValue>,
    ) -> Self {
        let parent_cx = parent.unwrap_or_else(Context::new);
        let builder = tracer
            .span_builder(operation.to_owned())
            .with_kind(SpanKind::Server)
            .with_attributes(tags);
        let span = tracer.build_with_context(builder, &parent_cx);
        let cx = parent_cx.with_span(span);
        let guard = cx.clone().attach();
        ScopedSpan {
            cx,
            _guard: guard,
            _not_send: PhantomData,
        }
    }

    /// Record a failure cause carried by a completed reply.
    ///
    /// This is informational only: the handler did not fail, so the event
    /// carries the message and the span's error state is left untouched.
    /// Causes with an empty message are ignored.
    pub fn log_cause(&self, cause: &(dyn Error + 'static)) {
        let message = cause.to_string();
        if !message.is_empty() {
            self.cx.span().add_event(message, Vec::new());
        }
    }

    /// Record an error that is propagating out of the wrapped call.
    ///
    /// Marks the span status as error and attaches a single structured
    /// `error` event before the span closes. The caller re-propagates the
    /// error itself; this method never consumes or replaces it.
    pub fn record_failure(&self, error: &(dyn Error + Send + Sync + 'static)) {
        let span = self.cx.span();
        span.add_event(
            EVENT_ERROR,
            vec![
                KeyValue::new(ERROR_OBJECT, format!("{error:?}")),
                KeyValue::new(ERROR_STACK, source_chain(error)),
            ],
        );
        span.set_status(Status::error(error.to_string()));
    }
}

impl std::fmt::Debug for ScopedSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSpan")
            .field("span_context", self.cx.span().span_context())
            .finish_non_exhaustive()
    }
}

impl Drop for ScopedSpan {
    fn drop(&mut self) {
        let span = self.cx.span();
        if thread::panicking() {
            span.add_event(
                EVENT_ERROR,
                vec![KeyValue::new(ERROR_OBJECT, "call handler panicked")],
            );
            span.set_status(Status::error("call handler panicked"));
        }
        span.end();
    }
}

/// Render an error and its source chain, the closest analogue of a stack
/// trace an `Error` value offers.
fn source_chain(error: &(dyn Error + Send + Sync + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
