//! The dedicated offload thread and the submission side of its queue.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use flume::Receiver;
use tracing::debug;

use crate::hashing::BlockHasher;
use crate::offload::request::OffloadRequest;

/// Work done by the offload thread over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffloadStats {
    pub requests: u64,
    pub blocks: u64,
}

struct QueueState {
    pending: VecDeque<OffloadRequest>,
    finished: bool,
}

struct OffloadQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

/// Cloneable submission side of the offload queue.
#[derive(Clone)]
pub struct OffloadHandle {
    queue: Arc<OffloadQueue>,
}

impl OffloadHandle {
    /// Queues an armed request and wakes the offload thread.
    pub fn enqueue(&self, mut request: OffloadRequest) {
        {
            let mut state = self.queue.state.lock().expect("offload queue poisoned");
            assert!(!state.finished, "offload request submitted after shutdown");
            request.enqueue();
            state.pending.push_back(request);
        }
        self.queue.available.notify_one();
    }

    /// Requests waiting to be picked up.
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.queue.state.lock().expect("offload queue poisoned").pending.len()
    }
}

/// A single thread that executes queued hash requests in submission order.
pub struct OffloadStage {
    queue: Arc<OffloadQueue>,
    thread: Option<JoinHandle<OffloadStats>>,
}

impl OffloadStage {
    /// Starts the offload thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(hasher: Arc<dyn BlockHasher>) -> Result<Self> {
        let queue = Arc::new(OffloadQueue { state: Mutex::new(QueueState { pending: VecDeque::new(), finished: false }), available: Condvar::new() });

        let thread_queue = Arc::clone(&queue);
        let thread = thread::Builder::new()
            .name("hash-offload".to_owned())
            .spawn(move || run(&thread_queue, hasher.as_ref()))
            .context("failed to spawn offload thread")?;

        Ok(Self { queue, thread: Some(thread) })
    }

    #[must_use]
    pub fn handle(&self) -> OffloadHandle {
        OffloadHandle { queue: Arc::clone(&self.queue) }
    }

    /// Stops the offload thread and returns what it did.
    ///
    /// Every submitter must already have collected its last completion.
    ///
    /// # Panics
    ///
    /// Panics if requests are still queued: shutting down underneath a
    /// pending request means a submitter was never answered.
    ///
    /// # Errors
    ///
    /// Returns an error if the offload thread panicked.
    pub fn shutdown(mut self) -> Result<OffloadStats> {
        {
            let mut state = self.queue.state.lock().expect("offload queue poisoned");
            assert!(state.pending.is_empty(), "offload shutdown with {} request(s) still queued", state.pending.len());
            state.finished = true;
        }
        self.queue.available.notify_one();

        let thread = self.thread.take().expect("offload thread already joined");
        thread.join().map_err(|_| anyhow!("offload thread panicked"))
    }
}

impl Drop for OffloadStage {
    fn drop(&mut self) {
        // Unwinding past a live stage: let the thread exit instead of leaking it.
        if self.thread.is_some() {
            if let Ok(mut state) = self.queue.state.lock() {
                state.finished = true;
            }
            self.queue.available.notify_one();
        }
    }
}

fn run(queue: &OffloadQueue, hasher: &dyn BlockHasher) -> OffloadStats {
    let mut stats = OffloadStats::default();
    let mut state = queue.state.lock().expect("offload queue poisoned");

    loop {
        if state.finished {
            break;
        }

        let Some(request) = state.pending.pop_front() else {
            state = queue.available.wait(state).expect("offload queue poisoned");
            continue;
        };
        drop(state);

        stats.requests += 1;
        stats.blocks += request.block_count() as u64;
        request.offload(hasher);

        state = queue.state.lock().expect("offload queue poisoned");
    }

    debug!(requests = stats.requests, blocks = stats.blocks, "offload stage stopped");
    stats
}

/// One worker's private connection to the offload stage.
///
/// Owns the worker's single reusable [`OffloadRequest`]. Each submission
/// gets a fresh one-shot completion channel that no other worker shares.
/// While a request is in flight the submitter does not hold it, so a second
/// submission before [`wait`](Self::wait) is impossible to miss.
pub struct Submitter {
    handle: OffloadHandle,
    request: Option<OffloadRequest>,
    done: Option<Receiver<OffloadRequest>>,
}

impl Submitter {
    #[must_use]
    pub fn new(handle: OffloadHandle) -> Self {
        Self { handle, request: Some(OffloadRequest::new()), done: None }
    }

    /// Hands `data` to the offload thread for hashing.
    ///
    /// # Panics
    ///
    /// Panics if the previous request has not been waited for.
    pub fn submit(&mut self, data: Arc<[u8]>, block_size: usize, digest_len: usize) {
        let mut request = self.request.take().expect("offload request submitted while another is in flight");

        let (done_tx, done_rx) = flume::bounded::<OffloadRequest>(1);
        request.reset(
            data,
            block_size,
            digest_len,
            Box::new(move |request| {
                // A submitter that unwound away no longer wants the result.
                let _ = done_tx.send(request);
            }),
        );

        self.done = Some(done_rx);
        self.handle.enqueue(request);
    }

    #[cfg(test)]
    fn in_flight(&self) -> bool {
        self.request.is_none()
    }

    /// Blocks until the in-flight request completes and returns its digests.
    ///
    /// There is no timeout. A request the offload thread abandons without
    /// completing surfaces as an error once its callback is dropped.
    ///
    /// # Errors
    ///
    /// Returns the hashing error carried back by the request, or an error if
    /// the offload thread dropped the request without completing it.
    pub fn wait(&mut self) -> Result<&[u8]> {
        let done = self.done.take().expect("waited on an offload request that was never submitted");

        let mut request = done.recv().map_err(|_| anyhow!("offload stage dropped a request"))?;
        assert!(request.is_complete(), "offload request returned in state {}", request.state());

        let error = request.take_error();
        let request = self.request.insert(request);

        match error {
            Some(e) => Err(e),
            None => Ok(request.digests()),
        }
    }
}
