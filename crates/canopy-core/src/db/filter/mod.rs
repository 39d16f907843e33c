//! Module: db::filter
//! Responsibility: decide which stored cells of a matched document are loaded
//! and returned, and where the loader may seek past rejected cells.
//! Does not own: predicate matching or document aggregation.
//! Boundary: stateful per document; callers reset it with `start_document`.


use crate::{
    config::EventFilterOptions,
    db::key::{
        DOCUMENT_ID_SEPARATOR, Key, KeyError, MAX_BYTE_STRING, NULL_BYTE, PartialKey, Range,
        TERM_FREQUENCY_FAMILY, document_uid, field_index_pointer, field_name_from_family,
        is_field_index_family, is_root, join_field_value, term_frequency_pointer,
    },
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::Arc,
};

/// Limit key applying to every field.
pub const ANY_FIELD: &str = "_ANYFIELD_";

///
/// CellInfo
///
/// What the filter needs to know about one stored cell.
///

#[derive(Clone, Debug, Eq, PartialEq)]
struct CellInfo {
    root: bool,
    field: String,
}

impl CellInfo {
    fn parse(key: &Key) -> Result<Self, KeyError> {
        let cf = key.column_family();
        let cq = key.column_qualifier();

        let (uid, field) = if is_field_index_family(cf) {
            (field_index_pointer(cq)?, field_name_from_family(cf)?)
        } else if cf == TERM_FREQUENCY_FAMILY {
            let field = cq
                .iter()
                .rposition(|&byte| byte == NULL_BYTE)
                .map(|nul| &cq[nul + 1..])
                .ok_or_else(|| KeyError::malformed("term-frequency qualifier has no field", cq))?;
            (term_frequency_pointer(cq)?, field)
        } else {
            let uid = document_uid(cf)
                .ok_or_else(|| KeyError::malformed("event family has no document id", cf))?;
            (uid, event_field(cq))
        };

        Ok(Self {
            root: is_root(uid),
            field: String::from_utf8_lossy(field).into_owned(),
        })
    }
}

// Event qualifiers are `FIELD[.grouping] NUL value`.
fn event_field(cq: &[u8]) -> &[u8] {
    let end = cq
        .iter()
        .position(|&byte| byte == NULL_BYTE || byte == DOCUMENT_ID_SEPARATOR)
        .unwrap_or(cq.len());

    &cq[..end]
}

///
/// EventDataFilter
///
/// Hierarchy-aware filter over the event, field-index and term-frequency
/// cells of a matched document.
///
/// Cells of the top-level document are kept subject to the allow/deny lists
/// and per-field limits; cells of child documents are kept only for query
/// fields. Once enough consecutive fields or rejected cells have been seen
/// the filter proposes seek ranges that skip ahead. Cloning yields an
/// independent copy of the filter's state.
///

#[derive(Clone, Debug)]
pub struct EventDataFilter {
    query_fields: Arc<[String]>,
    allow: Option<Arc<[String]>>,
    deny: Option<Arc<[String]>>,
    non_event_fields: Arc<BTreeSet<String>>,
    limits: Arc<BTreeMap<String, u64>>,
    any_field_limit: Option<u64>,
    limit_fields_field: Option<String>,
    max_fields_before_seek: Option<u64>,
    max_keys_before_seek: Option<u64>,

    last_field: Option<String>,
    field_count: u64,
    key_miss_count: u64,
    list_seek_index: Option<usize>,
}

impl EventDataFilter {
    /// Build a filter for a query referencing `query_fields`.
    ///
    /// Query fields are always added to a non-empty allow list and removed
    /// from the deny list.
    #[must_use]
    pub fn new(
        options: &EventFilterOptions,
        query_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let query_fields: BTreeSet<String> = query_fields.into_iter().map(Into::into).collect();

        let allow = options
            .allow_fields
            .as_ref()
            .filter(|allow| !allow.is_empty())
            .map(|allow| sorted(allow.union(&query_fields)));
        let deny = options
            .deny_fields
            .as_ref()
            .map(|deny| sorted(deny.difference(&query_fields)))
            .filter(|deny| !deny.is_empty());

        Self {
            query_fields: sorted(query_fields.iter()),
            allow,
            deny,
            non_event_fields: Arc::new(options.non_event_fields.clone()),
            limits: Arc::new(options.limit_fields.clone()),
            any_field_limit: options.limit_fields.get(ANY_FIELD).copied(),
            limit_fields_field: options.limit_fields_field.clone(),
            max_fields_before_seek: options.max_fields_before_seek,
            max_keys_before_seek: options.max_keys_before_seek,
            last_field: None,
            field_count: 0,
            key_miss_count: 0,
            list_seek_index: None,
        }
    }

    /// Reset per-document seek state.
    pub const fn start_document(&mut self) {
        self.list_seek_index = None;
    }

    /// Whether `key` participates in evaluation, updating field and miss counters.
    pub fn apply(&mut self, key: &Key) -> Result<bool, KeyError> {
        let info = CellInfo::parse(key)?;

        Ok(self.keep_field(&info, true))
    }

    /// Like [`Self::apply`] but without counting the cell.
    pub fn peek(&mut self, key: &Key) -> Result<bool, KeyError> {
        let info = CellInfo::parse(key)?;

        Ok(self.keep_field(&info, false))
    }

    /// Whether `key` is returned to the caller.
    ///
    /// Child cells are returned only for query fields stored outside the event.
    pub fn keep(&mut self, key: &Key) -> Result<bool, KeyError> {
        let info = CellInfo::parse(key)?;

        if info.root {
            return Ok(key.column_qualifier().is_empty() || self.keep_field(&info, false));
        }

        Ok(self.non_event_fields.contains(&info.field) && self.keep_field(&info, false))
    }

    /// Range to seek to instead of stepping past `current`, if any.
    ///
    /// `end` is the end bound of the range currently being read.
    pub fn seek_range(&mut self, current: &Key, end: &Bound<Key>) -> Result<Option<Range>, KeyError> {
        let info = CellInfo::parse(current)?;
        if self.bypass_seek() {
            return Ok(None);
        }

        if !info.root {
            // children only ever yield query fields
            let (range, _) = allow_seek(current, &info.field, end, &self.query_fields, None);
            return Ok(range);
        }

        if self.is_field_limited(&info.field) {
            let mut cq = info.field.into_bytes();
            cq.push(0x01);
            let start = Key::new(current.row(), current.column_family(), cq);

            return Ok(Some(Range::new(Bound::Included(start), end.clone())));
        }

        if let Some(allow) = &self.allow {
            let (range, index) =
                allow_seek(current, &info.field, end, allow, self.list_seek_index);
            self.list_seek_index = index;
            return Ok(range);
        }

        if let Some(deny) = self.deny.clone() {
            return Ok(self.deny_seek(current, &info.field, end, &deny));
        }

        Ok(None)
    }

    /// Marker cell recording that `key`'s field hit its limit.
    pub fn transform(&self, key: &Key) -> Result<Option<Key>, KeyError> {
        let Some(limit_field) = &self.limit_fields_field else {
            return Ok(None);
        };
        let info = CellInfo::parse(key)?;
        if !self.is_field_limited(&info.field) {
            return Ok(None);
        }

        let cq = join_field_value(limit_field.as_bytes(), info.field.as_bytes());

        Ok(Some(Key::new(key.row(), key.column_family(), cq)))
    }

    fn keep_field(&mut self, info: &CellInfo, count: bool) -> bool {
        let same_field = self.last_field.as_deref() == Some(info.field.as_str());
        if count {
            if same_field {
                self.field_count += 1;
            } else {
                self.last_field = Some(info.field.clone());
                self.field_count = 1;
            }
        } else if !same_field {
            self.last_field = Some(info.field.clone());
            self.field_count = 0;
        }

        let keep = self.keeps(&info.field, info.root);
        if count {
            if keep {
                self.key_miss_count = 0;
            } else {
                self.key_miss_count += 1;
            }
        }

        keep
    }

    fn keeps(&self, field: &str, root: bool) -> bool {
        if self.is_field_limited(field) {
            return false;
        }
        if !root {
            return self.is_query_field(field);
        }

        match (&self.allow, &self.deny) {
            (Some(allow), _) => contains(allow, field),
            (None, Some(deny)) => !contains(deny, field),
            (None, None) => true,
        }
    }

    fn is_query_field(&self, field: &str) -> bool {
        contains(&self.query_fields, field)
    }

    fn is_field_limited(&self, field: &str) -> bool {
        let over = |limit: u64| self.field_count > limit;
        let limited = self.any_field_limit.is_some_and(over)
            || self.limits.get(field).copied().is_some_and(over);

        limited && !self.is_query_field(field)
    }

    // Seeking stays off until a configured threshold has been reached.
    fn bypass_seek(&self) -> bool {
        let fields = self
            .max_fields_before_seek
            .is_none_or(|max| self.field_count < max);
        let keys = self
            .max_keys_before_seek
            .is_none_or(|max| self.key_miss_count < max);

        fields && keys
    }

    fn deny_seek(
        &mut self,
        current: &Key,
        field: &str,
        end: &Bound<Key>,
        deny: &[String],
    ) -> Option<Range> {
        // wrapped to a new document
        if self
            .list_seek_index
            .is_some_and(|index| field < deny[index].as_str())
        {
            self.list_seek_index = None;
        }

        let from = self.list_seek_index.map_or(0, |index| index + 1);
        for (index, denied) in deny.iter().enumerate().skip(from) {
            match field.cmp(denied.as_str()) {
                Ordering::Equal => {
                    self.list_seek_index = Some(index);

                    let mut cq = field.as_bytes().to_vec();
                    cq.extend_from_slice(MAX_BYTE_STRING);
                    let start = Key::new(current.row(), current.column_family(), cq);
                    if before_end(&start, end) {
                        return Some(Range::new(Bound::Excluded(start), end.clone()));
                    }
                    return Some(empty_at(end, &start));
                }
                Ordering::Greater => self.list_seek_index = Some(index),
                Ordering::Less => break,
            }
        }

        None
    }
}

// Seek to the next listed field after `field` in this document, or roll
// over to the next document. Returns the range and the new list position.
fn allow_seek(
    current: &Key,
    field: &str,
    end: &Bound<Key>,
    list: &[String],
    last_hit: Option<usize>,
) -> (Option<Range>, Option<usize>) {
    let from = last_hit.map_or(0, |index| index + 1);
    for (index, next) in list.iter().enumerate().skip(from) {
        match field.cmp(next.as_str()) {
            Ordering::Equal => return (None, last_hit),
            Ordering::Less => {
                let cq = join_field_value(next.as_bytes(), &[]);
                let start = Key::new(current.row(), current.column_family(), cq);

                return (
                    Some(Range::new(Bound::Included(start), end.clone())),
                    Some(index),
                );
            }
            Ordering::Greater => {}
        }
    }

    (Some(rollover(current, end)), None)
}

// Range starting at the next document, or an empty range past `end`.
fn rollover(current: &Key, end: &Bound<Key>) -> Range {
    let start = current.following(PartialKey::RowFamily);
    if before_end(&start, end) {
        return Range::new(Bound::Included(start), end.clone());
    }

    empty_at(end, &start)
}

fn before_end(start: &Key, end: &Bound<Key>) -> bool {
    match end {
        Bound::Included(end) | Bound::Excluded(end) => start < end,
        Bound::Unbounded => true,
    }
}

fn empty_at(end: &Bound<Key>, fallback: &Key) -> Range {
    match end {
        Bound::Included(end) | Bound::Excluded(end) => Range::empty_after(end),
        Bound::Unbounded => Range::empty_after(fallback),
    }
}

fn sorted<'a>(fields: impl Iterator<Item = &'a String>) -> Arc<[String]> {
    // BTreeSet iteration is already ordered
    fields.cloned().collect()
}

fn contains(list: &[String], field: &str) -> bool {
    list.binary_search_by(|probe| probe.as_str().cmp(field))
        .is_ok()
}
