//! Scan tracing boundary.
//!
//! Tracing is optional, injected by the caller, and must not affect execution semantics.

use crate::obs::PlanFingerprint;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

///
/// ScanTraceSink
///

pub trait ScanTraceSink: Send + Sync {
    fn on_event(&self, event: ScanTraceEvent);
}

pub type TraceSinkHandle = Arc<dyn ScanTraceSink>;

///
/// CoverageLoss
///
/// Why a predicate contributed no index coverage to a plan.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoverageLoss {
    NullValue,
    FieldNotAllowed,
    EmptyComposite,
}

///
/// ScanTraceEvent
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScanTraceEvent {
    PlanCompiled {
        fingerprint: PlanFingerprint,
        includes: u32,
        excludes: u32,
        index_satisfied: bool,
    },
    CoverageDropped {
        field: String,
        reason: CoverageLoss,
    },
    Seek {
        fingerprint: PlanFingerprint,
        rewritten: bool,
    },
    DocumentEmitted {
        fingerprint: PlanFingerprint,
    },
    UidsCollected {
        uids: u64,
        collapsed: bool,
    },
    Finish {
        fingerprint: PlanFingerprint,
        documents: u64,
    },
}

/// Deliver `event` when a sink is installed.
pub(crate) fn emit(sink: Option<&TraceSinkHandle>, event: impl FnOnce() -> ScanTraceEvent) {
    if let Some(sink) = sink {
        sink.on_event(event());
    }
}

///
/// TraceCounts
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TraceCounts {
    pub plans: u64,
    pub coverage_drops: u64,
    pub seeks: u64,
    pub documents: u64,
    pub uid_groups: u64,
    pub collapsed_groups: u64,
    pub finishes: u64,
}

///
/// CountingTraceSink
///
/// Lock-free counters over every event kind.
///

#[derive(Debug, Default)]
pub struct CountingTraceSink {
    plans: AtomicU64,
    coverage_drops: AtomicU64,
    seeks: AtomicU64,
    documents: AtomicU64,
    uid_groups: AtomicU64,
    collapsed_groups: AtomicU64,
    finishes: AtomicU64,
}

impl CountingTraceSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> TraceCounts {
        TraceCounts {
            plans: self.plans.load(Ordering::Relaxed),
            coverage_drops: self.coverage_drops.load(Ordering::Relaxed),
            seeks: self.seeks.load(Ordering::Relaxed),
            documents: self.documents.load(Ordering::Relaxed),
            uid_groups: self.uid_groups.load(Ordering::Relaxed),
            collapsed_groups: self.collapsed_groups.load(Ordering::Relaxed),
            finishes: self.finishes.load(Ordering::Relaxed),
        }
    }
}

impl ScanTraceSink for CountingTraceSink {
    fn on_event(&self, event: ScanTraceEvent) {
        let counter = match event {
            ScanTraceEvent::PlanCompiled { .. } => &self.plans,
            ScanTraceEvent::CoverageDropped { .. } => &self.coverage_drops,
            ScanTraceEvent::Seek { .. } => &self.seeks,
            ScanTraceEvent::DocumentEmitted { .. } => &self.documents,
            ScanTraceEvent::UidsCollected { collapsed, .. } => {
                if collapsed {
                    self.collapsed_groups.fetch_add(1, Ordering::Relaxed);
                }
                &self.uid_groups
            }
            ScanTraceEvent::Finish { .. } => &self.finishes,
        };

        counter.fetch_add(1, Ordering::Relaxed);
    }
}
