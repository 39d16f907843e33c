//! Module: db::cursor
//! Responsibility: document-level predicate cursors and their composition.
//! Does not own: AST compilation or scan-range policy at the query boundary.
//! Boundary: every cursor yields document matches in (row, column family) order.

mod composite;
mod field_index;
mod top_level;


use crate::{
    db::{
        document::Document,
        key::{Key, PartialKey, Range},
    },
    error::InternalError,
};
use std::cmp::Ordering;

pub use composite::{CompositeCursor, Join};
pub use field_index::FieldIndexCursor;
pub use top_level::{TopLevelIndexCursor, document_bounded_range};

///
/// DocumentMatch
///
/// One emitted document: its result key plus the attributes gathered for it.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DocumentMatch {
    pub key: Key,
    pub document: Document,
}

///
/// DocumentCursor
///
/// Pull-based cursor over document matches.
///
/// After `seek`, the cursor is positioned on its first match (if any).
/// `next` returns the current match and advances; `move_to` advances until
/// the current match is at or after `pointer` in document order.
///

pub trait DocumentCursor: Send {
    fn seek(&mut self, range: &Range) -> Result<(), InternalError>;

    fn has_next(&self) -> bool {
        self.peek().is_some()
    }

    fn peek(&self) -> Option<&Key>;

    fn next(&mut self) -> Result<Option<DocumentMatch>, InternalError>;

    fn move_to(&mut self, pointer: &Key) -> Result<(), InternalError>;

    fn deep_copy(&self) -> Box<dyn DocumentCursor>;

    /// Human-readable predicate shape, used for explain output and plan fingerprints.
    fn describe(&self) -> String;
}

pub type DocumentCursorBox = Box<dyn DocumentCursor>;

/// Document order: row, then column family (the document pointer).
#[must_use]
pub fn document_order(left: &Key, right: &Key) -> Ordering {
    left.compare_prefix(right, PartialKey::RowFamily)
}
