//! End-to-end tests against the OpenTelemetry SDK.
//!
//! These run the filter with a real `TracerProvider` exporting to an
//! in-memory exporter, verifying what a tracing backend would actually
//! receive.

use std::sync::Arc;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanId, SpanKind, Status, TraceId, TracerProvider as _};
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;

use opentelemetry_tars::config::{AdapterEndpoint, ServerConfig};
use opentelemetry_tars::filter::{Call, CallError, Filter, Next, Reply, ServantCall, ServantReply, StatusMap};
use opentelemetry_tars::TraceServerFilter;

const SERVANT: &str = "HelloApp.HelloServer.HelloObj";
const TRACE_ID: &str = "000000000000004d0000000000000016";
const SPAN_ID: &str = "0000000000017c29";

fn test_setup() -> (InMemorySpanExporter, TraceServerFilter) {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();

    let config = Arc::new(
        ServerConfig::builder()
            .with_sample_rate(1.0)
            .with_local_ip("10.0.0.1")
            .with_adapter(
                SERVANT,
                AdapterEndpoint::new("10.0.0.1", 18601).with_set_division("sz"),
            )
            .build(),
    );
    let mut filter = TraceServerFilter::builder(config)
        .with_tracer_factory(move |servant: &str| -> Option<BoxedTracer> {
            Some(BoxedTracer::new(Box::new(provider.tracer(servant.to_owned()))))
        })
        .build();
    filter.init();
    (exporter, filter)
}

fn traced_status() -> StatusMap {
    let mut status = StatusMap::new();
    status.insert(
        "uber-trace-id".to_owned(),
        format!("{TRACE_ID}:{SPAN_ID}:0:1"),
    );
    status
}

fn run_ok(filter: &TraceServerFilter, call: &ServantCall) {
    let mut reply = ServantReply::new();
    let mut next = |_: &dyn Call, _: &mut dyn Reply| -> Result<(), CallError> { Ok(()) };
    filter
        .handle(call, &mut reply, Next::new(&mut next))
        .unwrap();
}

#[test]
fn traced_call_exports_a_server_span_with_upstream_parent() {
    let (exporter, filter) = test_setup();
    let call = ServantCall::new(SERVANT, "greet").with_status(traced_status());
    run_ok(&filter, &call);

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "greet");
    assert_eq!(span.span_kind, SpanKind::Server);
    assert_eq!(
        span.span_context.trace_id(),
        TraceId::from_hex(TRACE_ID).unwrap()
    );
    assert_eq!(span.parent_span_id, SpanId::from_hex(SPAN_ID).unwrap());
    assert_eq!(span.status, Status::Unset);

    let get = |key: &str| {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.to_string())
    };
    assert_eq!(get("server.ipv4").as_deref(), Some("10.0.0.1"));
    assert_eq!(get("server.port").as_deref(), Some("18601"));
    assert_eq!(get("tars.set_division").as_deref(), Some("sz"));
    assert!(get("tars.server.version").is_some());
}

#[test]
fn failed_call_exports_an_error_span_and_returns_the_error() {
    let (exporter, filter) = test_setup();
    let call = ServantCall::new(SERVANT, "greet").with_status(traced_status());

    let mut reply = ServantReply::new();
    let mut next = |_: &dyn Call, _: &mut dyn Reply| -> Result<(), CallError> {
        Err("backend down".into())
    };
    let error = filter
        .handle(&call, &mut reply, Next::new(&mut next))
        .unwrap_err();
    assert_eq!(error.to_string(), "backend down");

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert!(matches!(span.status, Status::Error { .. }));
    let events: Vec<_> = span.events.iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "error");
}

#[test]
fn untraced_calls_export_nothing() {
    let (exporter, filter) = test_setup();

    // Empty status map: pass through untraced.
    run_ok(&filter, &ServantCall::new(SERVANT, "greet"));
    assert!(exporter.get_finished_spans().unwrap().is_empty());
}
