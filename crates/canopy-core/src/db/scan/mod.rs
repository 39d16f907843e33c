//! Module: db::scan
//! Responsibility: drive compiled plans over a shard, load matched documents,
//! and collect per-shard uids from the global index.
//! Does not own: plan compilation or cursor semantics.
//! Boundary: seeks are resumed on document boundaries before reaching the plan.

mod scanner;
mod uids;


pub use scanner::{DocumentScanner, resume_range};
pub use uids::{IndexInfo, UidCollector, UidList};
