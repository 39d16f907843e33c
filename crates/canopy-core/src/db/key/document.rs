//! Module: db::key::document
//! Responsibility: pure byte algebra over document ids and index cell layouts.
//! Does not own: key ordering or range construction.
//! Boundary: every hierarchy decision (root, child, sentinel) is derived here.

use crate::db::key::{Key, KeyError};

///
/// CONSTANTS
///

/// Separator between document-id segments.
pub const DOCUMENT_ID_SEPARATOR: u8 = b'.';

/// Separator between components of column families and qualifiers.
pub const NULL_BYTE: u8 = 0x00;

/// Suffix that sorts after any byte a stored document id may contain.
pub const MAX_BYTE_STRING: &[u8] = &[0xFF];

/// Canonical byte width of a root document id.
pub const BASE_ID_WIDTH: usize = 21;

/// Column-family tag of field-index entries (`fi NUL field`).
pub const FIELD_INDEX_TAG: &[u8] = b"fi";

/// Column family of term-frequency entries.
pub const TERM_FREQUENCY_FAMILY: &[u8] = b"tf";

// Number of id segments making up a root id.
const ROOT_SEGMENTS: usize = 3;

///
/// Document ids
///

/// Return the root (top-level) prefix of a document id.
///
/// The root keeps the first three dot-separated segments; a root id is its
/// own root.
#[must_use]
pub fn root_pointer(id: &[u8]) -> &[u8] {
    match separator_positions(id).nth(ROOT_SEGMENTS - 1) {
        Some(end) => &id[..end],
        None => id,
    }
}

/// Whether `id` names a top-level document (at most two separators).
#[must_use]
pub fn is_root(id: &[u8]) -> bool {
    separator_positions(id).nth(ROOT_SEGMENTS - 1).is_none()
}

/// Return the id one level up from `id`.
///
/// Exact only for roots and first-level children; deeper ids resolve to
/// their immediate parent, not to their root.
#[must_use]
pub fn parent_pointer(id: &[u8]) -> &[u8] {
    if is_root(id) {
        return id;
    }

    match id.iter().rposition(|&byte| byte == DOCUMENT_ID_SEPARATOR) {
        Some(end) => &id[..end],
        None => id,
    }
}

/// Cheap root estimate for ids built on a canonical-width root.
///
/// Ids longer than [`BASE_ID_WIDTH`] are cut at the first separator at or
/// after that width; shorter ids fall back to [`parent_pointer`].
#[must_use]
pub fn estimated_root_pointer(id: &[u8]) -> &[u8] {
    if id.len() <= BASE_ID_WIDTH {
        return parent_pointer(id);
    }

    match id[BASE_ID_WIDTH..]
        .iter()
        .position(|&byte| byte == DOCUMENT_ID_SEPARATOR)
    {
        Some(offset) => &id[..BASE_ID_WIDTH + offset],
        None => id,
    }
}

///
/// Field-index cells
///
/// Layout: column family `fi NUL field`, qualifier `value NUL datatype NUL id`.
///

/// Return the document id of a field-index qualifier (bytes after the last NUL).
pub fn field_index_pointer(cq: &[u8]) -> Result<&[u8], KeyError> {
    let (_, last) = last_two_nuls(cq)?;

    Ok(&cq[last + 1..])
}

/// Return `datatype NUL id` of a field-index qualifier.
pub fn field_index_document_pointer(cq: &[u8]) -> Result<&[u8], KeyError> {
    let (second_last, _) = last_two_nuls(cq)?;

    Ok(&cq[second_last + 1..])
}

/// Return the root pointer of the document named by a field-index qualifier.
pub fn field_index_root_pointer(cq: &[u8]) -> Result<&[u8], KeyError> {
    field_index_pointer(cq).map(root_pointer)
}

/// Return `datatype NUL rootId` for the document named by a field-index qualifier.
pub fn field_index_document_root(cq: &[u8]) -> Result<Vec<u8>, KeyError> {
    let (second_last, last) = last_two_nuls(cq)?;
    let root = root_pointer(&cq[last + 1..]);

    let mut out = Vec::with_capacity(last - second_last + root.len());
    out.extend_from_slice(&cq[second_last + 1..=last]);
    out.extend_from_slice(root);

    Ok(out)
}

/// Return the datatype segment of a field-index qualifier.
pub fn field_index_datatype(cq: &[u8]) -> Result<&[u8], KeyError> {
    let (second_last, last) = last_two_nuls(cq)?;

    Ok(&cq[second_last + 1..last])
}

/// Return the field value of a field-index qualifier (bytes before the
/// second-to-last NUL; values may themselves contain NULs).
pub fn field_index_value(cq: &[u8]) -> Result<&[u8], KeyError> {
    let (second_last, _) = last_two_nuls(cq)?;

    Ok(&cq[..second_last])
}

/// Return the field name of a `tag NUL field` column family.
pub fn field_name_from_family(cf: &[u8]) -> Result<&[u8], KeyError> {
    match cf.iter().position(|&byte| byte == NULL_BYTE) {
        Some(nul) => Ok(&cf[nul + 1..]),
        None => Err(KeyError::malformed(
            "column family has no field separator",
            cf,
        )),
    }
}

/// Return `field NUL value` for a field-index cell.
pub fn field_and_value_from_field_index(cf: &[u8], cq: &[u8]) -> Result<Vec<u8>, KeyError> {
    let field = field_name_from_family(cf)?;
    let value = field_index_value(cq)?;

    Ok(join_field_value(field, value))
}

///
/// Term-frequency cells
///
/// Layout: column family `tf`, qualifier `datatype NUL id NUL value NUL field`.
///

/// Return `field NUL value` for a term-frequency qualifier.
pub fn field_and_value_from_term_frequency(cq: &[u8]) -> Result<Vec<u8>, KeyError> {
    let (_, second) = first_two_nuls(cq)?;
    let last = cq
        .iter()
        .rposition(|&byte| byte == NULL_BYTE)
        .filter(|&last| last > second)
        .ok_or_else(|| KeyError::malformed("term-frequency qualifier has no field name", cq))?;

    Ok(join_field_value(&cq[last + 1..], &cq[second + 1..last]))
}

/// Return the document id of a term-frequency qualifier.
pub fn term_frequency_pointer(cq: &[u8]) -> Result<&[u8], KeyError> {
    let (first, second) = first_two_nuls(cq)?;

    Ok(&cq[first + 1..second])
}

///
/// Document keys
///

/// Return the document id carried by a column family, if any.
///
/// Event families are `datatype NUL id [NUL ...]`; a family without a NUL
/// that contains a separator is read as a bare document id.
#[must_use]
pub fn document_uid(cf: &[u8]) -> Option<&[u8]> {
    split_document_family(cf).map(|(_, uid)| uid)
}

/// Build a synthetic parent result key.
#[must_use]
pub fn build_parent_key(
    shard: &[u8],
    id: &[u8],
    field_and_value: &[u8],
    visibility: &[u8],
    timestamp: i64,
) -> Key {
    Key::new(shard, id, field_and_value)
        .with_visibility(visibility)
        .with_timestamp(timestamp)
}

/// Return the sentinel key sorting after every entry of the document (and
/// all of its children) named by `doc_key`'s column family.
///
/// Keys whose column family carries no document id are returned unchanged.
#[must_use]
pub fn next_document_key(doc_key: &Key) -> Key {
    let Some((prefix, uid)) = split_document_family(doc_key.column_family()) else {
        return doc_key.clone();
    };
    let root = root_pointer(uid);

    let mut family = Vec::with_capacity(prefix.len() + root.len() + 1 + MAX_BYTE_STRING.len());
    family.extend_from_slice(prefix);
    family.extend_from_slice(root);
    family.push(DOCUMENT_ID_SEPARATOR);
    family.extend_from_slice(MAX_BYTE_STRING);

    doc_key.with_column_family(family)
}

/// Whether a column family starts with the field-index tag.
#[must_use]
pub fn is_field_index_family(cf: &[u8]) -> bool {
    cf.len() > FIELD_INDEX_TAG.len()
        && cf.starts_with(FIELD_INDEX_TAG)
        && cf[FIELD_INDEX_TAG.len()] == NULL_BYTE
}

/// Build the `fi NUL field` column family.
#[must_use]
pub fn field_index_family(field: &str) -> Vec<u8> {
    join_field_value(FIELD_INDEX_TAG, field.as_bytes())
}

/// Join `field NUL value`.
#[must_use]
pub fn join_field_value(field: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(field.len() + 1 + value.len());
    out.extend_from_slice(field);
    out.push(NULL_BYTE);
    out.extend_from_slice(value);
    out
}

///
/// Helpers
///

fn separator_positions(id: &[u8]) -> impl Iterator<Item = usize> + '_ {
    id.iter()
        .enumerate()
        .filter(|(_, byte)| **byte == DOCUMENT_ID_SEPARATOR)
        .map(|(index, _)| index)
}

// Split a document column family into (prefix through its NUL, id).
fn split_document_family(cf: &[u8]) -> Option<(&[u8], &[u8])> {
    let Some(nul) = cf.iter().position(|&byte| byte == NULL_BYTE) else {
        return cf
            .contains(&DOCUMENT_ID_SEPARATOR)
            .then_some((&cf[..0], cf));
    };

    let rest = &cf[nul + 1..];
    let uid = match rest.iter().position(|&byte| byte == NULL_BYTE) {
        Some(end) => &rest[..end],
        None => rest,
    };

    (!uid.is_empty()).then_some((&cf[..=nul], uid))
}

fn last_two_nuls(cq: &[u8]) -> Result<(usize, usize), KeyError> {
    let mut positions = cq
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, byte)| **byte == NULL_BYTE)
        .map(|(index, _)| index);

    match (positions.next(), positions.next()) {
        (Some(last), Some(second_last)) => Ok((second_last, last)),
        _ => Err(KeyError::malformed(
            "field-index qualifier needs two separators",
            cq,
        )),
    }
}

fn first_two_nuls(cq: &[u8]) -> Result<(usize, usize), KeyError> {
    let mut positions = cq
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == NULL_BYTE)
        .map(|(index, _)| index);

    match (positions.next(), positions.next()) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(KeyError::malformed(
            "term-frequency qualifier needs three separators",
            cq,
        )),
    }
}
