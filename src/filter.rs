//! Contracts between the server's filter pipeline and its filters.
//!
//! A TARS server hands every inbound call through a chain of [`Filter`]s
//! before it reaches the servant implementation. Filters observe the call
//! and its in-progress [`Reply`], then delegate to the [`Next`] stage. The
//! pipeline host implements dispatch; this module only fixes the interface
//! the trace filter is written against.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Errors produced by call handlers further down the pipeline.
///
/// Filters must pass these through unchanged; wrapping or replacing a
/// handler error would change what the remote caller observes.
pub type CallError = Box<dyn Error + Send + Sync + 'static>;

/// String-keyed metadata transmitted alongside a TARS call.
///
/// Keys are case-sensitive. An empty map is the common case and simply means
/// the caller attached no metadata.
pub type StatusMap = HashMap<String, String>;

/// An inbound call as seen by the filter pipeline.
pub trait Call {
    /// The trace-metadata capability of this call.
    ///
    /// Transport-level call kinds (heartbeats, raw frames) return `None`;
    /// filters that need trace metadata degrade to passthrough for them.
    fn trace_support(&self) -> Option<&dyn TraceableCall> {
        None
    }
}

/// Trace metadata exposed by call kinds that can participate in distributed
/// tracing.
pub trait TraceableCall {
    /// Fully qualified name of the servant addressed by this call.
    fn servant(&self) -> &str;

    /// Name of the invoked function; used as the span operation name.
    fn function(&self) -> &str;

    /// The status map carrying upstream trace identifiers. May be empty.
    fn status(&self) -> &StatusMap;
}

/// The in-progress result of an inbound call.
pub trait Reply {
    /// A failure cause carried by an otherwise completed call.
    ///
    /// This is a soft signal: the handler returned normally but marked the
    /// reply as failed (e.g. an application-level error code).
    fn cause(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

/// The remainder of the filter pipeline.
///
/// Consuming `self` in [`run`](Next::run) makes "invoked at most once" a
/// compile-time guarantee; a filter that never runs it has swallowed the
/// call.
pub struct Next<'a> {
    inner: &'a mut dyn FnMut(&dyn Call, &mut dyn Reply) -> Result<(), CallError>,
}

impl<'a> Next<'a> {
    /// Wrap the downstream stages of the pipeline.
    pub fn new(
        inner: &'a mut dyn FnMut(&dyn Call, &mut dyn Reply) -> Result<(), CallError>,
    ) -> Self {
        Next { inner }
    }

    /// Invoke the downstream stages.
    pub fn run(self, call: &dyn Call, reply: &mut dyn Reply) -> Result<(), CallError> {
        (self.inner)(call, reply)
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// A pipeline component invoked once per inbound call.
pub trait Filter: Send + Sync {
    /// Called once at component startup, before any call is handled.
    fn init(&mut self) {}

    /// Handle one inbound call.
    ///
    /// `next` must be run exactly once unless an error makes that
    /// impossible; the returned result must be the downstream result,
    /// unchanged, unless producing a different outcome is the filter's
    /// purpose.
    fn handle(
        &self,
        call: &dyn Call,
        reply: &mut dyn Reply,
        next: Next<'_>,
    ) -> Result<(), CallError>;

    /// Called once at component teardown.
    fn shutdown(&mut self) {}
}

/// A servant invocation: the traceable call kind.
#[derive(Clone, Debug)]
pub struct ServantCall {
    servant: String,
    function: String,
    status: StatusMap,
}

impl ServantCall {
    /// Create a call addressed to `servant`, invoking `function`.
    pub fn new(servant: impl Into<String>, function: impl Into<String>) -> Self {
        ServantCall {
            servant: servant.into(),
            function: function.into(),
            status: StatusMap::new(),
        }
    }

    /// Attach the status map received with the call.
    pub fn with_status(mut self, status: StatusMap) -> Self {
        self.status = status;
        self
    }
}

impl Call for ServantCall {
    fn trace_support(&self) -> Option<&dyn TraceableCall> {
        Some(self)
    }
}

impl TraceableCall for ServantCall {
    fn servant(&self) -> &str {
        &self.servant
    }

    fn function(&self) -> &str {
        &self.function
    }

    fn status(&self) -> &StatusMap {
        &self.status
    }
}

/// The reply produced for a [`ServantCall`].
#[derive(Debug, Default)]
pub struct ServantReply {
    cause: Option<CallError>,
}

impl ServantReply {
    /// An empty, successful reply.
    pub fn new() -> Self {
        ServantReply::default()
    }

    /// Mark the reply as carrying a failure cause without failing the call.
    pub fn set_cause(&mut self, cause: impl Into<CallError>) {
        self.cause = Some(cause.into());
    }
}

impl Reply for ServantReply {
    fn cause(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_ref().map(|e| &**e as &(dyn Error + 'static))
    }
}
