//! Core runtime for Canopy: document keys, sorted-store cursors, hierarchy
//! aware plan compilation, scan drivers, and the ergonomics exported via the
//! `prelude`.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod obs;
pub mod serialize;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only scan vocabulary.
/// No errors, stores, serializers, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        config::ScanOptions,
        db::{
            cursor::{DocumentCursor as _, DocumentMatch},
            document::{Attribute, Document},
            key::{Key, PartialKey, Range},
            plan::{BuilderKind, QueryNode},
            scan::DocumentScanner,
            store::{KeySource as _, SortedKeyCursor as _},
        },
    };
}
