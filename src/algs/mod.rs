//! Communication and distributed algorithms.

pub mod array;
pub mod communicator;
pub mod completion;
pub mod field_transfer;
pub mod indset;
pub mod renumber;
pub mod wire;

pub use completion::sync_array;
pub use indset::find_indset;
