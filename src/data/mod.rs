//! Data module: typed per-entity tags
#![warn(missing_docs)]

pub mod tag;

pub use tag::{ScalarType, Tag, TagData, TagValue, TransferPolicy};
