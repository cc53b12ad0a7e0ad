//! Global allocator.
//!
//! Every block-group read and every offloaded request allocates, across all
//! worker threads at once; mimalloc keeps those allocations off a shared
//! lock so the harness measures the codecs rather than the heap.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
