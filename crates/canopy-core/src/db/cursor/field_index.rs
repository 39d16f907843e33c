use crate::{
    db::{
        aggregate::{Aggregator, FieldIndexAggregator},
        cursor::{DocumentCursor, DocumentMatch, document_order},
        document::Document,
        key::{
            Key, MAX_BYTE_STRING, NULL_BYTE, PartialKey, Range, field_index_datatype,
            field_index_family, printable,
        },
        store::{FilteredCursor, LimitedCursor, SortedKeyCursor},
    },
    error::InternalError,
};
use std::{cmp::Ordering, collections::BTreeSet, ops::Bound, ops::RangeInclusive, sync::Arc};
use tracing::trace;

///
/// FieldIndexCursor
///
/// `field == value` predicate cursor over field-index entries.
///
/// Seek ranges are expressed in document space (row + document column
/// family) and permuted into field-index space
/// (`fi NUL field` / `value NUL documentFamily`). Each emitted match is one
/// aggregated run; the aggregator decides whether runs are per document or
/// per top-level document.
///

pub struct FieldIndexCursor {
    field: String,
    value: Vec<u8>,
    column_family: Vec<u8>,
    value_prefix: Vec<u8>,
    source: Box<dyn SortedKeyCursor>,
    aggregator: Aggregator,
    build_document: bool,
    entries: EntryFilter,
    scan_range: Range,
    top: Option<Key>,
    document: Document,
}

impl FieldIndexCursor {
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        value: impl Into<Vec<u8>>,
        source: Box<dyn SortedKeyCursor>,
        aggregator: Aggregator,
    ) -> Self {
        let field = field.into();
        let value = value.into();
        let column_family = field_index_family(&field);
        let mut value_prefix = value.clone();
        value_prefix.push(NULL_BYTE);

        Self {
            field,
            value,
            column_family,
            value_prefix,
            source,
            aggregator,
            build_document: true,
            entries: EntryFilter::default(),
            scan_range: Range::all(),
            top: None,
            document: Document::new(),
        }
    }

    /// Skip attribute collection and only produce match keys.
    #[must_use]
    pub const fn keys_only(mut self) -> Self {
        self.build_document = false;
        self
    }

    #[must_use]
    pub fn with_datatypes(mut self, datatypes: Arc<BTreeSet<Vec<u8>>>) -> Self {
        self.entries.datatypes = Some(datatypes);
        self
    }

    #[must_use]
    pub fn with_time_range(mut self, time_range: RangeInclusive<i64>) -> Self {
        self.entries.time_range = Some(time_range);
        self
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The field-index range used by the last seek.
    #[must_use]
    pub const fn scan_range(&self) -> &Range {
        &self.scan_range
    }

    /// Independent copy with its own deep copy of the source cursor.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            field: self.field.clone(),
            value: self.value.clone(),
            column_family: self.column_family.clone(),
            value_prefix: self.value_prefix.clone(),
            source: self.source.deep_copy(),
            aggregator: self.aggregator.clone(),
            build_document: self.build_document,
            entries: self.entries.clone(),
            scan_range: self.scan_range.clone(),
            top: self.top.clone(),
            document: self.document.clone(),
        }
    }

    /// Permute a document-space range into this predicate's field-index range.
    #[must_use]
    pub fn index_range(&self, range: &Range) -> Range {
        Range::new(
            self.permute_bound(range.start()),
            self.permute_bound(range.end()),
        )
    }

    fn permute_bound(&self, bound: &Bound<Key>) -> Bound<Key> {
        match bound {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(key) => Bound::Included(self.index_key(key, false)),
            // a trailing NUL moves past every entry of the excluded document
            Bound::Excluded(key) => Bound::Excluded(self.index_key(key, true)),
        }
    }

    fn index_key(&self, key: &Key, exclusive: bool) -> Key {
        let mut cq = self.value_prefix.clone();
        cq.extend_from_slice(key.column_family());
        if exclusive {
            cq.push(NULL_BYTE);
        }

        Key::new(key.row(), self.column_family.clone(), cq)
    }

    // Reposition the source at `start`, keeping the scan end.
    // Returns false when `start` already lies past the end.
    fn reseek(&mut self, start: Key) -> Result<bool, InternalError> {
        if self.scan_range.after_end(&start) {
            return Ok(false);
        }

        let range = self.scan_range.with_start(Bound::Included(start));
        self.source.seek(&range)?;

        Ok(true)
    }

    // Move to the next aggregated match, or exhaust.
    fn advance(&mut self) -> Result<(), InternalError> {
        self.top = None;
        self.document.clear();

        while self.top.is_none() {
            let Some(key) = self.source.peek_key().cloned() else {
                return Ok(());
            };

            // wrong column family: jump to this field in this row or the next row
            match self.column_family.as_slice().cmp(key.column_family()) {
                Ordering::Greater => {
                    let start = Key::new(
                        key.row(),
                        self.column_family.clone(),
                        self.value_prefix.clone(),
                    );
                    if !self.reseek(start)? {
                        return Ok(());
                    }
                    continue;
                }
                Ordering::Less => {
                    if !self.reseek_next_row(&key)? {
                        return Ok(());
                    }
                    continue;
                }
                Ordering::Equal => {}
            }

            // wrong value: jump forward to this value or to the next row
            let cq = key.column_qualifier();
            if !cq.starts_with(&self.value_prefix) {
                let moved = if self.value_prefix.as_slice() > cq {
                    let start = Key::new(
                        key.row(),
                        self.column_family.clone(),
                        self.value_prefix.clone(),
                    );
                    self.reseek(start)?
                } else {
                    self.reseek_next_row(&key)?
                };
                if !moved {
                    return Ok(());
                }
                continue;
            }

            if self.scan_range.before_start(&key) || !self.entries.accepts(&key)? {
                trace!(key = %key, "field-index entry skipped");
                self.source.next()?;
                continue;
            }

            let mut limit = self.value_prefix.clone();
            limit.extend_from_slice(MAX_BYTE_STRING);
            let limit = Key::new(key.row(), self.column_family.clone(), limit);
            let entries = &self.entries;
            let limited = LimitedCursor::new(self.source.as_mut(), limit);
            let mut run = FilteredCursor::new(limited, |key: &Key| entries.accepts(key))?;

            self.top = if self.build_document {
                self.aggregator.aggregate(&mut run, &mut self.document)?
            } else {
                self.aggregator.aggregate_key_only(&mut run)?
            };
        }

        Ok(())
    }

    fn reseek_next_row(&mut self, key: &Key) -> Result<bool, InternalError> {
        let next_row = key.following(PartialKey::Row);
        let start = Key::new(
            next_row.row(),
            self.column_family.clone(),
            self.value_prefix.clone(),
        );

        self.reseek(start)
    }
}

///
/// EntryFilter
///
/// Datatype and timestamp screen applied to every field-index entry,
/// including those inside an aggregated run.
///

#[derive(Clone, Debug, Default)]
struct EntryFilter {
    datatypes: Option<Arc<BTreeSet<Vec<u8>>>>,
    time_range: Option<RangeInclusive<i64>>,
}

impl EntryFilter {
    fn accepts(&self, key: &Key) -> Result<bool, InternalError> {
        if self
            .time_range
            .as_ref()
            .is_some_and(|range| !range.contains(&key.timestamp()))
        {
            return Ok(false);
        }

        if let Some(datatypes) = &self.datatypes {
            let datatype = field_index_datatype(key.column_qualifier())?;
            return Ok(datatypes.contains(datatype));
        }

        Ok(true)
    }
}

impl DocumentCursor for FieldIndexCursor {
    fn seek(&mut self, range: &Range) -> Result<(), InternalError> {
        self.scan_range = self.index_range(range);
        trace!(field = %self.field, range = %self.scan_range, "field-index seek");
        self.source.seek(&self.scan_range)?;

        self.advance()
    }

    fn peek(&self) -> Option<&Key> {
        self.top.as_ref()
    }

    fn next(&mut self) -> Result<Option<DocumentMatch>, InternalError> {
        let Some(key) = self.top.take() else {
            return Ok(None);
        };
        let document = std::mem::take(&mut self.document);
        self.advance()?;

        Ok(Some(DocumentMatch { key, document }))
    }

    fn move_to(&mut self, pointer: &Key) -> Result<(), InternalError> {
        // exhausted cursors stay exhausted
        match &self.top {
            None => return Ok(()),
            Some(top) if document_order(top, pointer).is_ge() => return Ok(()),
            Some(_) => {}
        }

        if !self.reseek(self.index_key(pointer, false))? {
            self.top = None;
            self.document.clear();
            return Ok(());
        }

        self.advance()
    }

    fn deep_copy(&self) -> Box<dyn DocumentCursor> {
        Box::new(self.copy())
    }

    fn describe(&self) -> String {
        format!("{} == '{}'", self.field, printable(&self.value))
    }
}
