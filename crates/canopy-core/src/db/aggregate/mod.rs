//! Module: db::aggregate
//! Responsibility: collapse runs of adjacent field-index entries into one
//! synthetic parent result.
//! Does not own: cursor positioning, seek ranges, or predicate matching.
//! Boundary: consumes exactly one run from a positioned `KeySource` per call.

#[cfg(test)]
mod tests;

use crate::{
    db::{
        document::Document,
        key::{
            Key, build_parent_key, field_and_value_from_field_index,
            field_index_document_pointer, field_index_document_root, field_index_value,
            field_name_from_family, is_field_index_family,
        },
        store::KeySource,
    },
    error::InternalError,
};
use serde::Deserialize;
use std::{collections::BTreeSet, fmt, sync::Arc};
use tracing::trace;

///
/// AttributeFilter
///
/// Caller-supplied predicate deciding whether an index attribute is kept.
///

pub trait AttributeFilter: Send + Sync {
    fn keep(&self, key: &Key) -> bool;
}

impl<F> AttributeFilter for F
where
    F: Fn(&Key) -> bool + Send + Sync,
{
    fn keep(&self, key: &Key) -> bool {
        self(key)
    }
}

///
/// FieldIndexAggregator
///
/// Merge one run of field-index entries into a parent key.
/// Both methods consume the same run and return byte-identical keys;
/// `None` means the source was already exhausted.
///

pub trait FieldIndexAggregator {
    fn aggregate(
        &self,
        source: &mut dyn KeySource,
        document: &mut Document,
    ) -> Result<Option<Key>, InternalError>;

    fn aggregate_key_only(&self, source: &mut dyn KeySource) -> Result<Option<Key>, InternalError>;
}

///
/// AggregatorKind
///
/// Statically registered run scopes, selected by configuration key.
///
/// - `Identity`: one run per exact document (datatype + full id).
/// - `TopLevel`: one run per top-level document; children fold into their root.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AggregatorKind {
    Identity,
    #[default]
    TopLevel,
}

impl AggregatorKind {
    // Document pointer that identifies the run an entry belongs to.
    fn run_pointer(self, cq: &[u8]) -> Result<Vec<u8>, InternalError> {
        let pointer = match self {
            Self::Identity => field_index_document_pointer(cq)?.to_vec(),
            Self::TopLevel => field_index_document_root(cq)?,
        };

        Ok(pointer)
    }
}

///
/// Aggregator
///
/// Run aggregator for one scope. Cheap to clone; the requested field set and
/// the attribute filter are shared immutable data.
///

#[derive(Clone, Default)]
pub struct Aggregator {
    kind: AggregatorKind,
    fields_to_keep: Option<Arc<BTreeSet<String>>>,
    filter: Option<Arc<dyn AttributeFilter>>,
}

impl Aggregator {
    #[must_use]
    pub fn new(kind: AggregatorKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn identity() -> Self {
        Self::new(AggregatorKind::Identity)
    }

    #[must_use]
    pub fn top_level() -> Self {
        Self::new(AggregatorKind::TopLevel)
    }

    /// Restrict kept attributes to `fields`.
    #[must_use]
    pub fn with_fields_to_keep(mut self, fields: BTreeSet<String>) -> Self {
        self.fields_to_keep = Some(Arc::new(fields));
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn AttributeFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub const fn kind(&self) -> AggregatorKind {
        self.kind
    }

    fn keeps(&self, field: &[u8], key: &Key) -> bool {
        let requested = self.fields_to_keep.as_ref().is_none_or(|fields| {
            std::str::from_utf8(field).is_ok_and(|field| fields.contains(field))
        });

        requested && self.filter.as_ref().is_none_or(|filter| filter.keep(key))
    }

    // Record the attributes of one consumed entry.
    fn record(
        &self,
        key: &Key,
        document: &mut Document,
        last_child: &mut Option<Vec<u8>>,
    ) -> Result<(), InternalError> {
        let cq = key.column_qualifier();
        let field = field_name_from_family(key.column_family())?;
        let value = field_index_value(cq)?;
        let keep = self.keeps(field, key);
        document.push_field(field, value, true, keep);

        let child = field_index_document_pointer(cq)?;
        if last_child.as_deref() != Some(child) {
            let child_key = Key::new(key.row(), child, Vec::new())
                .with_visibility(key.visibility())
                .with_timestamp(key.timestamp());
            document.push_document_key(child_key, true);
            *last_child = Some(child.to_vec());
        }

        Ok(())
    }

    fn scan_run(
        &self,
        source: &mut dyn KeySource,
        mut document: Option<&mut Document>,
    ) -> Result<Option<Key>, InternalError> {
        let Some(first) = source.peek_key() else {
            return Ok(None);
        };
        let run = self.kind.run_pointer(first.column_qualifier())?;

        let mut last_child = None;
        let mut entries = 0_u64;
        let last = loop {
            let key = source
                .peek_key()
                .cloned()
                .ok_or_else(|| InternalError::aggregate_invariant("run lost its current entry"))?;
            if let Some(document) = document.as_deref_mut() {
                self.record(&key, document, &mut last_child)?;
            }
            source.next()?;
            entries += 1;

            let continues = match source.peek_key() {
                Some(next) if is_field_index_family(next.column_family()) => {
                    self.kind.run_pointer(next.column_qualifier())? == run
                }
                _ => false,
            };
            if !continues {
                break key;
            }
        };

        let field_and_value =
            field_and_value_from_field_index(last.column_family(), last.column_qualifier())?;
        trace!(entries, kind = ?self.kind, "aggregated field-index run");

        Ok(Some(build_parent_key(
            last.row(),
            &run,
            &field_and_value,
            last.visibility(),
            last.timestamp(),
        )))
    }
}

impl FieldIndexAggregator for Aggregator {
    fn aggregate(
        &self,
        source: &mut dyn KeySource,
        document: &mut Document,
    ) -> Result<Option<Key>, InternalError> {
        self.scan_run(source, Some(document))
    }

    fn aggregate_key_only(&self, source: &mut dyn KeySource) -> Result<Option<Key>, InternalError> {
        self.scan_run(source, None)
    }
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("kind", &self.kind)
            .field("fields_to_keep", &self.fields_to_keep)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}
