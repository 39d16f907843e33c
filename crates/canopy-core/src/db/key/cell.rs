use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

///
/// Key
///
/// Sorted-store cell key: row, column family, column qualifier, visibility
/// label and timestamp. Ordering is byte-lexicographic on the four byte
/// components followed by timestamp descending, so the newest version of a
/// cell sorts first.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Key {
    row: Vec<u8>,
    column_family: Vec<u8>,
    column_qualifier: Vec<u8>,
    visibility: Vec<u8>,
    timestamp: i64,
}

impl Key {
    /// Build the smallest key for `(row, column_family, column_qualifier)`.
    ///
    /// Visibility is empty and the timestamp is `i64::MAX`, so every stored
    /// cell sharing the three components sorts at or after this key.
    #[must_use]
    pub fn new(
        row: impl Into<Vec<u8>>,
        column_family: impl Into<Vec<u8>>,
        column_qualifier: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            row: row.into(),
            column_family: column_family.into(),
            column_qualifier: column_qualifier.into(),
            visibility: Vec::new(),
            timestamp: i64::MAX,
        }
    }

    #[must_use]
    pub fn row_only(row: impl Into<Vec<u8>>) -> Self {
        Self::new(row, Vec::new(), Vec::new())
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: impl Into<Vec<u8>>) -> Self {
        self.visibility = visibility.into();
        self
    }

    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn row(&self) -> &[u8] {
        &self.row
    }

    #[must_use]
    pub fn column_family(&self) -> &[u8] {
        &self.column_family
    }

    #[must_use]
    pub fn column_qualifier(&self) -> &[u8] {
        &self.column_qualifier
    }

    #[must_use]
    pub fn visibility(&self) -> &[u8] {
        &self.visibility
    }

    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Compare only the leading components named by `part`.
    #[must_use]
    pub fn compare_prefix(&self, other: &Self, part: PartialKey) -> Ordering {
        let mut ordering = self.row.cmp(&other.row);
        if ordering.is_ne() || part == PartialKey::Row {
            return ordering;
        }

        ordering = self.column_family.cmp(&other.column_family);
        if ordering.is_ne() || part == PartialKey::RowFamily {
            return ordering;
        }

        ordering = self.column_qualifier.cmp(&other.column_qualifier);
        if ordering.is_ne() || part == PartialKey::RowFamilyQualifier {
            return ordering;
        }

        ordering = self.visibility.cmp(&other.visibility);
        if ordering.is_ne() || part == PartialKey::RowFamilyQualifierVisibility {
            return ordering;
        }

        other.timestamp.cmp(&self.timestamp)
    }

    /// Return the smallest key strictly greater than every key sharing this
    /// key's `part` prefix.
    #[must_use]
    pub fn following(&self, part: PartialKey) -> Self {
        match part {
            PartialKey::Row => Self::row_only(with_trailing_nul(&self.row)),
            PartialKey::RowFamily => Self::new(
                self.row.clone(),
                with_trailing_nul(&self.column_family),
                Vec::new(),
            ),
            PartialKey::RowFamilyQualifier => Self::new(
                self.row.clone(),
                self.column_family.clone(),
                with_trailing_nul(&self.column_qualifier),
            ),
            PartialKey::RowFamilyQualifierVisibility => Self {
                visibility: with_trailing_nul(&self.visibility),
                timestamp: i64::MAX,
                ..self.clone()
            },
            PartialKey::Full => {
                if self.timestamp == i64::MIN {
                    self.following(PartialKey::RowFamilyQualifierVisibility)
                } else {
                    Self {
                        timestamp: self.timestamp - 1,
                        ..self.clone()
                    }
                }
            }
        }
    }

    /// Replace the column family, keeping every other component.
    #[must_use]
    pub fn with_column_family(&self, column_family: impl Into<Vec<u8>>) -> Self {
        Self {
            column_family: column_family.into(),
            ..self.clone()
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_prefix(other, PartialKey::Full)
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} [{}] {}",
            printable(&self.row),
            printable(&self.column_family),
            printable(&self.column_qualifier),
            printable(&self.visibility),
            self.timestamp
        )
    }
}

///
/// PartialKey
///
/// Leading-component selector used for prefix comparison and successor keys.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PartialKey {
    Row,
    RowFamily,
    RowFamilyQualifier,
    RowFamilyQualifierVisibility,
    Full,
}

fn with_trailing_nul(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.extend_from_slice(bytes);
    out.push(0x00);
    out
}

/// Render bytes for diagnostics, escaping anything outside printable ASCII.
#[must_use]
pub fn printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if byte.is_ascii_graphic() || byte == b' ' {
            out.push(char::from(byte));
        } else {
            use std::fmt::Write as _;
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
    out
}
