//! A single hash-offload job and its state machine.
//!
//! A request moves strictly through `Init -> Queued -> Offloaded -> Complete`.
//! Every transition asserts the state it leaves; a misuse is a programming
//! error and takes the process down. [`OffloadRequest::reset`] is the only
//! way back to `Init` and is refused while the request is in flight.

use std::fmt;
use std::sync::Arc;

use anyhow::Error;
use strum::Display;

use crate::hashing::BlockHasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OffloadState {
    Init,
    Queued,
    Offloaded,
    Complete,
}

/// Invoked exactly once, on the offload thread, when a request completes.
///
/// The request is handed back by value, which returns ownership of the
/// digest buffer to whoever submitted it.
pub type OnComplete = Box<dyn FnOnce(OffloadRequest) + Send>;

pub struct OffloadRequest {
    state: OffloadState,
    data: Option<Arc<[u8]>>,
    block_size: usize,
    digests: Vec<u8>,
    error: Option<Error>,
    on_complete: Option<OnComplete>,
}

impl OffloadRequest {
    #[must_use]
    pub fn new() -> Self {
        Self { state: OffloadState::Init, data: None, block_size: 0, digests: Vec::new(), error: None, on_complete: None }
    }

    /// Arms the request for a new job.
    ///
    /// `data` is shared with the submitter, who keeps reading it while the
    /// hash runs but must not change it. The digest buffer is resized to
    /// `digest_len` and its allocation is reused across resets.
    ///
    /// # Panics
    ///
    /// Panics if the request is queued or offloaded.
    pub fn reset(&mut self, data: Arc<[u8]>, block_size: usize, digest_len: usize, on_complete: OnComplete) {
        assert!(matches!(self.state, OffloadState::Init | OffloadState::Complete), "offload request reset while {}", self.state);

        self.data = Some(data);
        self.block_size = block_size;
        self.digests.clear();
        self.digests.resize(digest_len, 0);
        self.error = None;
        self.on_complete = Some(on_complete);
        self.state = OffloadState::Init;
    }

    /// Marks the request as sitting in the offload queue.
    pub fn enqueue(&mut self) {
        assert_eq!(self.state, OffloadState::Init, "offload request enqueued out of order");
        self.state = OffloadState::Queued;
    }

    /// Marks the request as picked up by the offload thread.
    pub fn start(&mut self) {
        assert_eq!(self.state, OffloadState::Queued, "offload request started out of order");
        self.state = OffloadState::Offloaded;
    }

    /// Finishes the request and fires its completion callback.
    ///
    /// The shared input is released before the callback runs.
    pub fn complete(mut self) {
        assert_eq!(self.state, OffloadState::Offloaded, "offload request completed out of order");
        self.state = OffloadState::Complete;
        self.data = None;

        let on_complete = self.on_complete.take().expect("offload request completed without a callback");
        on_complete(self);
    }

    /// Runs the whole offloaded half of the protocol: start, hash, complete.
    ///
    /// A hashing failure does not stop the transition to `Complete`; it is
    /// carried back to the submitter in [`take_error`](Self::take_error).
    pub fn offload(mut self, hasher: &dyn BlockHasher) {
        self.start();

        if let Some(data) = self.data.as_deref()
            && let Err(e) = hasher.hash(data, self.block_size, &mut self.digests)
        {
            self.error = Some(e.context(format!("offloaded {} hash failed", hasher.name())));
        }

        self.complete();
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> OffloadState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == OffloadState::Complete
    }

    /// Blocks covered by the current job.
    #[must_use]
    pub fn block_count(&self) -> usize {
        match (&self.data, self.block_size) {
            (Some(data), size) if size > 0 => data.len() / size,
            _ => 0,
        }
    }

    #[must_use]
    pub fn digests(&self) -> &[u8] {
        &self.digests
    }

    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }
}

impl Default for OffloadRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OffloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffloadRequest").field("state", &self.state).field("block_count", &self.block_count()).field("digest_len", &self.digests.len()).finish_non_exhaustive()
    }
}
