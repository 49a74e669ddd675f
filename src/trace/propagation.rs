//! Carrier adapters over the TARS status map.
//!
//! TARS transmits trace context in the call's status map, a string-keyed
//! map with case-sensitive keys. These adapters expose that map to any
//! [`TextMapPropagator`] without copying it; the propagator owns the wire
//! format of the identifiers themselves.

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;

use crate::filter::StatusMap;

/// Read-only [`Extractor`] view of a call's status map.
///
/// Unlike the `HashMap` extractor shipped with `opentelemetry`, this adapter
/// does not fold keys to lowercase: TARS status keys are case-sensitive.
#[derive(Debug)]
pub struct StatusExtractor<'a>(pub &'a StatusMap);

impl Extractor for StatusExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// [`Injector`] writing propagation fields into an outbound status map.
///
/// The server filter only extracts, but client-side filters share the same
/// carrier shape, and round-tripping through both adapters is the easiest
/// way to prove they agree on it.
#[derive(Debug)]
pub struct StatusInjector<'a>(pub &'a mut StatusMap);

impl Injector for StatusInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_owned(), value);
    }
}

/// Extract the upstream trace context from a status map, failing open.
///
/// Returns `None` for an empty map and for maps whose propagation fields do
/// not decode to a valid remote span context; the propagator reports decode
/// failures through the global error handler, never to the caller. The
/// extraction is anchored on a fresh [`Context`] rather than the current one
/// so concurrent calls cannot inherit each other's state.
pub(crate) fn extract_parent(
    propagator: &dyn TextMapPropagator,
    status: &StatusMap,
) -> Option<Context> {
    if status.is_empty() {
        return None;
    }
    let cx = propagator.extract_with_context(&Context::new(), &StatusExtractor(status));
    let has_parent = cx.span().span_context().is_valid();
    has_parent.then_some(cx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::testing::trace::TestSpan;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use opentelemetry_jaeger_propagator::Propagator;

    const TRACE_ID: &str = "000000000000004d0000000000000016";
    const SPAN_ID: &str = "0000000000017c29";

    fn status_with_header(value: &str) -> StatusMap {
        let mut status = StatusMap::new();
        status.insert("uber-trace-id".to_owned(), value.to_owned());
        status
    }

    #[test]
    fn extractor_is_case_sensitive() {
        let mut status = StatusMap::new();
        status.insert("Uber-Trace-Id".to_owned(), "beef".to_owned());
        let extractor = StatusExtractor(&status);
        assert_eq!(extractor.get("Uber-Trace-Id"), Some("beef"));
        assert_eq!(extractor.get("uber-trace-id"), None);
        assert_eq!(extractor.keys(), vec!["Uber-Trace-Id"]);
    }

    #[test]
    fn empty_status_yields_no_parent() {
        let propagator = Propagator::new();
        assert!(extract_parent(&propagator, &StatusMap::new()).is_none());
    }

    #[test]
    fn malformed_status_yields_no_parent() {
        let propagator = Propagator::new();
        let status = status_with_header("not-a-trace-header");
        assert!(extract_parent(&propagator, &status).is_none());

        let mut unrelated = StatusMap::new();
        unrelated.insert("dyeing-key".to_owned(), "value".to_owned());
        assert!(extract_parent(&propagator, &unrelated).is_none());
    }

    #[test]
    fn valid_status_yields_remote_parent() {
        let propagator = Propagator::new();
        let status = status_with_header(&format!("{TRACE_ID}:{SPAN_ID}:0:1"));
        let cx = extract_parent(&propagator, &status).expect("parent context");
        let span_context = cx.span().span_context().clone();
        assert_eq!(span_context.trace_id(), TraceId::from_hex(TRACE_ID).unwrap());
        assert_eq!(span_context.span_id(), SpanId::from_hex(SPAN_ID).unwrap());
        assert!(span_context.is_remote());
        assert!(span_context.is_sampled());
    }

    #[test]
    fn inject_then_extract_round_trips() {
        let propagator = Propagator::new();
        let span_context = SpanContext::new(
            TraceId::from_hex(TRACE_ID).unwrap(),
            SpanId::from_hex(SPAN_ID).unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let cx = Context::new().with_span(TestSpan(span_context.clone()));

        let mut status = StatusMap::new();
        propagator.inject_context(&cx, &mut StatusInjector(&mut status));
        assert!(status.contains_key("uber-trace-id"));

        let extracted = extract_parent(&propagator, &status).expect("parent context");
        let extracted = extracted.span().span_context().clone();
        assert_eq!(extracted.trace_id(), span_context.trace_id());
        assert_eq!(extracted.span_id(), span_context.span_id());
    }
}
