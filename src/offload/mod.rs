//! Hash offloading.
//!
//! Workers hand whole hash-groups to one dedicated thread and collect the
//! digests later, so hashing overlaps with compression instead of running
//! inline.

pub mod request;
pub mod stage;

pub use request::{OffloadRequest, OffloadState, OnComplete};
pub use stage::{OffloadHandle, OffloadStage, OffloadStats, Submitter};
