//! Input handling: expanding command-line inputs and cutting them into blocks.

pub mod discovery;
pub mod source;

pub use discovery::{expand_inputs, is_excluded};
pub use source::{BlockGroup, BlockGroups, BlockSource};
