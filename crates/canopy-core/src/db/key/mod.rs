//! Module: db::key
//! Responsibility: sorted-store key model, key ranges, and the document key algebra.
//! Does not own: cursor movement or plan semantics.
//! Boundary: all byte-level parsing of stored cells goes through this module.

mod cell;
mod document;
mod error;
mod range;


pub use cell::{Key, PartialKey, printable};
pub use document::{
    BASE_ID_WIDTH, DOCUMENT_ID_SEPARATOR, FIELD_INDEX_TAG, MAX_BYTE_STRING, NULL_BYTE,
    TERM_FREQUENCY_FAMILY, build_parent_key, document_uid, estimated_root_pointer,
    field_and_value_from_field_index, field_and_value_from_term_frequency, field_index_datatype,
    field_index_document_pointer, field_index_document_root, field_index_family,
    field_index_pointer, field_index_root_pointer, field_index_value, field_name_from_family,
    is_field_index_family, is_root, join_field_value, next_document_key, parent_pointer,
    root_pointer, term_frequency_pointer,
};
pub use error::KeyError;
pub use range::{Range, bounds_are_empty};
