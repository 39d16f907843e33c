pub mod aggregate;
pub mod cursor;
pub mod document;
pub mod filter;
pub mod key;
pub mod plan;
pub mod scan;
pub mod store;
