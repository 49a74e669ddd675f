//! Per-call trace sessions and tracer resolution.

use std::marker::PhantomData;

use opentelemetry::global::{self, BoxedTracer};

/// Resolves the tracer bound to a servant.
///
/// TARS configures tracing per servant (the servant name is the trace
/// service name), so the filter asks for a tracer once per traced call.
/// Returning `None` means tracing is not configured for that servant and the
/// call proceeds untraced.
pub trait TracerFactory: Send + Sync {
    /// The tracer for `servant`, if tracing is configured for it.
    fn tracer(&self, servant: &str) -> Option<BoxedTracer>;
}

impl<F> TracerFactory for F
where
    F: Fn(&str) -> Option<BoxedTracer> + Send + Sync,
{
    fn tracer(&self, servant: &str) -> Option<BoxedTracer> {
        self(servant)
    }
}

/// Resolves tracers from the globally installed tracer provider.
///
/// This is the default factory: it always yields a tracer, which is a no-op
/// one until the host installs a real provider via
/// [`opentelemetry::global::set_tracer_provider`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalTracerFactory;

impl TracerFactory for GlobalTracerFactory {
    fn tracer(&self, servant: &str) -> Option<BoxedTracer> {
        Some(global::tracer(servant.to_owned()))
    }
}

/// The tracing state of one inbound call.
///
/// A session is opened after the sampling gate admits a call and owns the
/// tracer handle for exactly the duration of that call. It lives on the
/// handling thread's stack and is deliberately `!Send`: sessions are never
/// shared between concurrent calls, and dropping the session is what
/// releases it, on every exit path.
#[derive(Debug)]
#[must_use = "a trace session is released when it is dropped"]
pub struct TraceSession {
    tracer: Option<BoxedTracer>,
    // Bind the session to the call's thread, like `ContextGuard`.
    _not_send: PhantomData<*const ()>,
}

impl TraceSession {
    /// Open the session for a call addressed to `servant`.
    pub fn open(servant: &str, tracers: &dyn TracerFactory) -> Self {
        TraceSession {
            tracer: tracers.tracer(servant),
            _not_send: PhantomData,
        }
    }

    /// The tracer active for this call, if any.
    pub fn tracer(&self) -> Option<&BoxedTracer> {
        self.tracer.as_ref()
    }
}
