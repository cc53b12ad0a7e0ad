//! blockbench - compression and hashing throughput over fixed-size blocks.
//!
//! Inputs are cut into blocks, a pool of workers compresses every block and
//! hashes it either inline or through a single offload thread, and each
//! worker's timings are merged into one run-wide throughput figure.

pub mod app;
pub mod compression;
pub mod config;
pub mod driver;
pub mod file;
pub mod hashing;
pub mod offload;
pub mod report;
pub mod throughput;
pub mod ui;
pub mod worker;
