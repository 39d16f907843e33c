use crate::db::key::{Key, printable};
use derive_more::{Deref, IntoIterator};

///
/// Attribute
///
/// One attribute of a matched document. `keep` marks attributes the caller
/// asked to return; unkept attributes still participate in evaluation.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Attribute {
    Field {
        name: String,
        value: Vec<u8>,
        index_only: bool,
        keep: bool,
    },
    DocumentKey {
        key: Key,
        keep: bool,
    },
}

impl Attribute {
    #[must_use]
    pub const fn keep(&self) -> bool {
        match self {
            Self::Field { keep, .. } | Self::DocumentKey { keep, .. } => *keep,
        }
    }

    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field { name, .. } => Some(name),
            Self::DocumentKey { .. } => None,
        }
    }
}

///
/// Document
///
/// Ordered attribute set accumulated for one document match.
///

#[derive(Clone, Debug, Default, Deref, Eq, IntoIterator, PartialEq)]
pub struct Document(#[into_iterator(owned, ref)] Vec<Attribute>);

impl Document {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.0.push(attribute);
    }

    pub(crate) fn push_field(&mut self, name: &[u8], value: &[u8], index_only: bool, keep: bool) {
        self.0.push(Attribute::Field {
            name: String::from_utf8_lossy(name).into_owned(),
            value: value.to_vec(),
            index_only,
            keep,
        });
    }

    pub(crate) fn push_document_key(&mut self, key: Key, keep: bool) {
        self.0.push(Attribute::DocumentKey { key, keep });
    }

    /// Move every attribute of `other` into this document.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Field attributes flagged to be returned.
    pub fn kept_fields(&self) -> impl Iterator<Item = &Attribute> {
        self.0
            .iter()
            .filter(|attr| matches!(attr, Attribute::Field { keep: true, .. }))
    }

    /// Document-key attributes, one per distinct child document.
    pub fn document_keys(&self) -> impl Iterator<Item = &Key> {
        self.0.iter().filter_map(|attr| match attr {
            Attribute::DocumentKey { key, .. } => Some(key),
            Attribute::Field { .. } => None,
        })
    }

    /// Values recorded for one field name, in insertion order.
    pub fn values_of<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.0.iter().filter_map(move |attr| match attr {
            Attribute::Field { name, value, .. } if name == field => Some(value.as_slice()),
            _ => None,
        })
    }

    /// Render a compact diagnostic line.
    #[must_use]
    pub fn describe(&self) -> String {
        self.0
            .iter()
            .map(|attr| match attr {
                Attribute::Field { name, value, .. } => format!("{name}={}", printable(value)),
                Attribute::DocumentKey { key, .. } => {
                    format!("@{}", printable(key.column_family()))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
