//! Trace-context lifecycle for inbound TARS calls.
//!
//! The pieces compose in call order: [`TraceServerFilter`] decides whether a
//! call is traced, opens a [`TraceSession`] bound to the call, extracts the
//! upstream context from the status map through a
//! [`StatusExtractor`], and wraps the downstream invocation in a
//! [`ScopedSpan`] that closes the span on every exit path.

mod propagation;
mod server;
mod session;
mod span;

pub use propagation::{StatusExtractor, StatusInjector};
pub use server::{TraceServerFilter, TraceServerFilterBuilder};
pub use session::{GlobalTracerFactory, TraceSession, TracerFactory};
pub use span::ScopedSpan;

pub(crate) use propagation::extract_parent;
