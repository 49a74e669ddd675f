//! Server-side distributed tracing for [TARS] RPC services.
//!
//! TARS servers process inbound calls through a chain of filters. This crate
//! provides [`TraceServerFilter`], a filter that opens one OpenTelemetry span
//! per traced call: it reads the upstream trace context out of the call's
//! string-keyed status map, starts a `Server` span as a child of it, tags the
//! span with the local endpoint configuration, and guarantees the span is
//! closed with the correct error state on every exit path of the call.
//!
//! Tracing is strictly transparent. A traced call and an untraced call return
//! identical results and identical errors; malformed or missing trace
//! metadata degrades to untraced passthrough instead of failing the call.
//!
//! The wire format of the propagated context is pluggable. By default the
//! filter understands the Jaeger text-map format (`uber-trace-id`), which is
//! what TARS runtimes emit, but any
//! [`TextMapPropagator`](opentelemetry::propagation::TextMapPropagator) can
//! be supplied instead.
//!
//! # Getting started
//!
//! ```no_run
//! use std::sync::Arc;
//! use opentelemetry_tars::config::ServerConfig;
//! use opentelemetry_tars::filter::Filter;
//! use opentelemetry_tars::TraceServerFilter;
//!
//! let config = Arc::new(
//!     ServerConfig::builder()
//!         .with_sample_rate(1.0)
//!         .with_local_ip("10.0.0.1")
//!         .with_adapter(
//!             "HelloApp.HelloServer.HelloObj",
//!             "tcp -h 10.0.0.1 -p 18601 -s gray".parse().unwrap(),
//!         )
//!         .build(),
//! );
//!
//! let mut filter = TraceServerFilter::new(config);
//! filter.init();
//! // register `filter` with the server's filter pipeline
//! ```
//!
//! [TARS]: https://github.com/TarsCloud
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]

pub mod config;
pub mod filter;
pub mod trace;

pub use config::{AdapterEndpoint, SamplingGate, ServerConfig};
pub use trace::TraceServerFilter;
