//! The server-side trace filter.

use std::fmt;
use std::sync::Arc;

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::{Key, KeyValue};
use opentelemetry_jaeger_propagator::Propagator as JaegerPropagator;

use crate::config::{SamplingGate, ServerConfig};
use crate::filter::{Call, CallError, Filter, Next, Reply};
use crate::trace::session::{GlobalTracerFactory, TraceSession, TracerFactory};
use crate::trace::span::ScopedSpan;
use crate::trace::extract_parent;

const SERVER_IPV4: Key = Key::from_static_str("server.ipv4");
const SERVER_PORT: Key = Key::from_static_str("server.port");
const TARS_SET_DIVISION: Key = Key::from_static_str("tars.set_division");
const TARS_SERVER_VERSION: Key = Key::from_static_str("tars.server.version");

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Filter that traces inbound servant calls.
///
/// For every call admitted by the sampling gate and carrying trace metadata,
/// the filter opens a per-call [`TraceSession`], extracts the upstream
/// context from the status map, and runs the rest of the pipeline inside a
/// [`ScopedSpan`]. Calls that cannot or should not be traced pass through
/// with no tracing side effects at all, and a handler error always reaches
/// the pipeline caller unchanged.
///
/// All collaborators are fixed at construction: the configuration slice, the
/// tracer factory, and the propagator that owns the wire format. Build a new
/// filter to reconfigure.
pub struct TraceServerFilter {
    config: Arc<ServerConfig>,
    tracers: Box<dyn TracerFactory>,
    propagator: Box<dyn TextMapPropagator + Send + Sync>,
    gate: SamplingGate,
}

impl TraceServerFilter {
    /// Create a filter with the default collaborators: tracers from the
    /// global provider and Jaeger-format propagation.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self::builder(config).build()
    }

    /// Start building a filter with custom collaborators.
    pub fn builder(config: Arc<ServerConfig>) -> TraceServerFilterBuilder {
        TraceServerFilterBuilder {
            config,
            tracers: Box::new(GlobalTracerFactory),
            propagator: Box::new(JaegerPropagator::new()),
        }
    }

    /// Open-time span tags describing this server, in deterministic order.
    ///
    /// The IP tag is always present; port, set division and version are only
    /// attached when the servant's adapter endpoint is resolvable, and the
    /// set division only when non-empty. Unresolvable endpoints are a normal
    /// condition and yield no default-valued tags.
    fn server_tags(&self, servant: &str) -> Vec<KeyValue> {
        let mut tags = vec![KeyValue::new(SERVER_IPV4, self.config.local_ip().to_owned())];
        if let Some(endpoint) = self.config.adapter(servant) {
            tags.push(KeyValue::new(SERVER_PORT, i64::from(endpoint.port())));
            if !endpoint.set_division().is_empty() {
                tags.push(KeyValue::new(
                    TARS_SET_DIVISION,
                    endpoint.set_division().to_owned(),
                ));
            }
            tags.push(KeyValue::new(TARS_SERVER_VERSION, SERVER_VERSION));
        }
        tags
    }
}

impl Filter for TraceServerFilter {
    fn init(&mut self) {
        self.gate = SamplingGate::from_rate(self.config.sample_rate());
    }

    fn handle(
        &self,
        call: &dyn Call,
        reply: &mut dyn Reply,
        next: Next<'_>,
    ) -> Result<(), CallError> {
        if !self.gate.should_trace() {
            return next.run(call, reply);
        }
        let Some(traced) = call.trace_support() else {
            return next.run(call, reply);
        };

        // The session spans the rest of the call; it drops last, after the
        // span guard declared below it.
        let session = TraceSession::open(traced.servant(), self.tracers.as_ref());
        let Some(tracer) = session.tracer() else {
            return next.run(call, reply);
        };
        let status = traced.status();
        if status.is_empty() {
            return next.run(call, reply);
        }

        // A non-empty status that fails to decode still gets a span; it just
        // starts a new trace instead of continuing the caller's.
        let parent = extract_parent(self.propagator.as_ref(), status);
        let span = ScopedSpan::open(
            tracer,
            traced.function(),
            parent,
            self.server_tags(traced.servant()),
        );

        let outcome = next.run(call, reply);
        match &outcome {
            Ok(()) => {
                if let Some(cause) = reply.cause() {
                    span.log_cause(cause);
                }
            }
            Err(error) => span.record_failure(error.as_ref()),
        }
        outcome
    }
}

impl fmt::Debug for TraceServerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceServerFilter")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("propagator", &self.propagator)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TraceServerFilter`].
pub struct TraceServerFilterBuilder {
    config: Arc<ServerConfig>,
    tracers: Box<dyn TracerFactory>,
    propagator: Box<dyn TextMapPropagator + Send + Sync>,
}

impl TraceServerFilterBuilder {
    /// Use a custom tracer factory instead of the global provider.
    pub fn with_tracer_factory(mut self, tracers: impl TracerFactory + 'static) -> Self {
        self.tracers = Box::new(tracers);
        self
    }

    /// Use a custom propagation format for the status map.
    pub fn with_propagator(
        mut self,
        propagator: impl TextMapPropagator + Send + Sync + 'static,
    ) -> Self {
        self.propagator = Box::new(propagator);
        self
    }

    /// Finish the filter. The sampling gate stays closed until
    /// [`Filter::init`] runs.
    pub fn build(self) -> TraceServerFilter {
        TraceServerFilter {
            config: self.config,
            tracers: self.tracers,
            propagator: self.propagator,
            gate: SamplingGate::default(),
        }
    }
}

impl fmt::Debug for TraceServerFilterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceServerFilterBuilder")
            .field("config", &self.config)
            .field("propagator", &self.propagator)
            .finish_non_exhaustive()
    }
}
