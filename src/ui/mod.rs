//! Terminal output that is not part of the report stream.
//!
//! Both components draw on stderr so stdout stays machine-readable.

pub mod display;
pub mod progress;

pub use display::{show_worker_table, worker_table};
pub use progress::Bar;
