use crate::{
    db::{
        key::{
            Key, MAX_BYTE_STRING, NULL_BYTE, PartialKey, Range, join_field_value, printable,
            root_pointer,
        },
        store::{KeySource, SortedKeyCursor},
    },
    error::InternalError,
    obs::{self, ScanTraceEvent, TraceSinkHandle},
    serialize::{deserialize, serialize},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, ops::Bound};
use tracing::{debug, trace};

///
/// UidList
///
/// Stored value of one global-index cell: the documents of one datatype in
/// one shard holding the indexed term. `ignore` marks a list whose uids were
/// dropped at ingest because there were too many; only `count` remains.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UidList {
    pub count: u64,
    pub ignore: bool,
    pub uids: Vec<String>,
}

impl UidList {
    #[must_use]
    pub fn new(uids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let uids: Vec<String> = uids.into_iter().map(Into::into).collect();

        Self {
            count: uids.len() as u64,
            ignore: false,
            uids,
        }
    }

    /// List carrying only a count.
    #[must_use]
    pub const fn ignored(count: u64) -> Self {
        Self {
            count,
            ignore: true,
            uids: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, InternalError> {
        Ok(serialize(self)?)
    }
}

///
/// IndexInfo
///
/// Per-shard result of uid collection. An empty `uids` with a non-zero
/// `count` means the shard must be scanned as a whole.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexInfo {
    pub count: u64,

    /// Sorted `datatype NUL uid` matches.
    pub uids: Vec<String>,
}

impl IndexInfo {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InternalError> {
        Ok(deserialize(bytes)?)
    }

    #[must_use]
    pub const fn is_shard_level(&self) -> bool {
        self.uids.is_empty() && self.count > 0
    }
}

///
/// UidCollector
///
/// Cursor over global-index cells (`row = term`, `cf = field`,
/// `cq = shard NUL datatype`) that folds every datatype of one shard into a
/// single `IndexInfo` entry keyed `term / field / shard`.
///
/// With `parse_tld_uids` child uids are replaced by their root pointer so
/// each top-level document is reported once.
///

pub struct UidCollector {
    source: Box<dyn SortedKeyCursor>,
    parse_tld_uids: bool,
    collapse: bool,
    threshold: Option<usize>,
    trace: Option<TraceSinkHandle>,
    top: Option<(Key, Vec<u8>)>,
}

impl UidCollector {
    #[must_use]
    pub fn new(source: Box<dyn SortedKeyCursor>) -> Self {
        Self {
            source,
            parse_tld_uids: false,
            collapse: false,
            threshold: None,
            trace: None,
            top: None,
        }
    }

    #[must_use]
    pub const fn parse_tld_uids(mut self, parse: bool) -> Self {
        self.parse_tld_uids = parse;
        self
    }

    /// Always report counts only.
    #[must_use]
    pub const fn collapse(mut self, collapse: bool) -> Self {
        self.collapse = collapse;
        self
    }

    /// Report counts only once a shard holds more than `threshold` uids.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: Option<usize>) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: Option<TraceSinkHandle>) -> Self {
        self.trace = trace;
        self
    }

    /// Decoded value of the current entry.
    pub fn peek_info(&self) -> Result<Option<IndexInfo>, InternalError> {
        self.top
            .as_ref()
            .map(|(_, value)| IndexInfo::from_bytes(value))
            .transpose()
    }

    // Fold every cell of the shard group at the source position.
    fn advance(&mut self) -> Result<(), InternalError> {
        self.top = None;
        let Some(first) = self.source.peek_key() else {
            return Ok(());
        };
        let group = group_key(first)?;

        let mut uids = BTreeSet::new();
        let mut count = 0_u64;
        let mut ignored = false;
        while let Some(key) = self.source.peek_key() {
            if !same_group(&group, key) {
                break;
            }
            let datatype = datatype(key.column_qualifier())?;
            let value = self
                .source
                .peek_value()
                .ok_or_else(|| InternalError::scan_invariant("global index cell has no value"))?;
            let list: UidList = deserialize(value)?;
            trace!(key = %key, count = list.count, ignore = list.ignore, "uid list");

            count = count.checked_add(list.count).ok_or_else(|| {
                InternalError::serialize_corruption(format!(
                    "uid list counts overflow for shard group {group}"
                ))
            })?;
            if list.ignore {
                ignored = true;
            } else if !ignored {
                for uid in &list.uids {
                    let uid = if self.parse_tld_uids {
                        root_pointer(uid.as_bytes())
                    } else {
                        uid.as_bytes()
                    };
                    uids.insert(join_field_value(datatype, uid));
                }
            }

            self.source.next()?;
        }

        let over_threshold = self.threshold.is_some_and(|max| uids.len() > max);
        let collapsed = ignored || self.collapse || over_threshold;
        let info = if collapsed {
            IndexInfo {
                count,
                uids: Vec::new(),
            }
        } else {
            IndexInfo {
                count: uids.len() as u64,
                uids: uids
                    .into_iter()
                    .map(|uid| String::from_utf8_lossy(&uid).into_owned())
                    .collect(),
            }
        };

        debug!(group = %group, count = info.count, collapsed, "uids collected");
        obs::emit(self.trace.as_ref(), || ScanTraceEvent::UidsCollected {
            uids: info.count,
            collapsed,
        });

        self.top = Some((group, serialize(&info)?));

        Ok(())
    }
}

impl KeySource for UidCollector {
    fn has_next(&self) -> bool {
        self.top.is_some()
    }

    fn peek_key(&self) -> Option<&Key> {
        self.top.as_ref().map(|(key, _)| key)
    }

    fn peek_value(&self) -> Option<&[u8]> {
        self.top.as_ref().map(|(_, value)| value.as_slice())
    }

    fn next(&mut self) -> Result<(), InternalError> {
        if self.top.is_none() {
            return Err(InternalError::cursor_invariant(
                "next called on an exhausted uid collector",
            ));
        }

        self.advance()
    }
}

impl SortedKeyCursor for UidCollector {
    fn seek(&mut self, range: &Range) -> Result<(), InternalError> {
        // an exclusive start names an already reported shard group
        let range = match range.start() {
            Bound::Excluded(start) => {
                let mut cq = start.column_qualifier().to_vec();
                cq.push(NULL_BYTE);
                cq.extend_from_slice(MAX_BYTE_STRING);
                let skip = Key::new(start.row(), start.column_family(), cq);

                range.with_start(Bound::Included(skip))
            }
            _ => range.clone(),
        };

        self.source.seek(&range)?;
        self.advance()
    }

    fn deep_copy(&self) -> Box<dyn SortedKeyCursor> {
        Box::new(Self {
            source: self.source.deep_copy(),
            parse_tld_uids: self.parse_tld_uids,
            collapse: self.collapse,
            threshold: self.threshold,
            trace: self.trace.clone(),
            top: self.top.clone(),
        })
    }
}

// `term / field / shard` for a `shard NUL datatype` qualifier.
fn group_key(key: &Key) -> Result<Key, InternalError> {
    let cq = key.column_qualifier();
    let nul = last_nul(cq)?;

    Ok(Key::new(key.row(), key.column_family(), &cq[..nul]))
}

fn same_group(group: &Key, key: &Key) -> bool {
    group.compare_prefix(key, PartialKey::RowFamily).is_eq()
        && last_nul(key.column_qualifier())
            .is_ok_and(|nul| &key.column_qualifier()[..nul] == group.column_qualifier())
}

fn datatype(cq: &[u8]) -> Result<&[u8], InternalError> {
    Ok(&cq[last_nul(cq)? + 1..])
}

fn last_nul(cq: &[u8]) -> Result<usize, InternalError> {
    cq.iter().rposition(|&byte| byte == NULL_BYTE).ok_or_else(|| {
        InternalError::serialize_corruption(format!(
            "global index qualifier has no datatype: '{}'",
            printable(cq)
        ))
    })
}
