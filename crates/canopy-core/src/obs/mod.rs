//! Observability boundary.
//!
//! Execution logic reports through `tracing` events and, when the caller
//! installs one, a `ScanTraceSink`. Neither path feeds back into execution.

mod fingerprint;
mod trace;

pub use fingerprint::PlanFingerprint;
pub use trace::{
    CountingTraceSink, CoverageLoss, ScanTraceEvent, ScanTraceSink, TraceCounts, TraceSinkHandle,
};

pub(crate) use trace::emit;
