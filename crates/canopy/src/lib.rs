//! ## Crate layout
//! - `core`: document keys, sorted-store cursors, plan compilation, scan
//!   drivers, configuration, and observability.
//!
//! The `prelude` module mirrors the surface needed to configure and drive a
//! scan over one shard.

pub use canopy_core as core;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::core::{config, db, error::InternalError as Error, obs};

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::core::{
        db::{filter::EventDataFilter, scan::UidCollector, store::MemoryStore},
        obs::{CountingTraceSink, TraceSinkHandle},
    };
}
