//! Job handles and the communicator mailbox shared between a background
//! call and its foreground owner.
//!
//! A [`Communicator`] is created per submitted call on the real-time
//! protocols: the background worker writes status updates and outputs
//! into it, the foreground [`Job`] reads them. All shared state sits
//! behind one mutex held only for the read/update itself, never across
//! network I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::types::{Status, StatusUpdate};

// ============================================================================
// Communicator
// ============================================================================

/// Mutable state of one in-flight call.
#[derive(Debug)]
pub(crate) struct JobState {
    /// Latest status heard from the server.
    pub latest_status: StatusUpdate,
    /// Accumulated outputs, in server-emission order. Append-only.
    pub outputs: Vec<Value>,
    /// Cooperative cancellation flag, checked between events.
    pub should_cancel: bool,
    /// Whether a partial (generator) output has been appended. Governs
    /// the final-output append so single-shot and generator endpoints
    /// agree on the outputs list.
    pub emitted_partial: bool,
}

/// Thread-safe mailbox between a background call and its [`Job`] handle.
pub struct Communicator {
    state: Mutex<JobState>,
    /// Woken on every state change; iterators and waiters re-check after.
    changed: Notify,
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator").finish_non_exhaustive()
    }
}

impl Default for Communicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Communicator {
    /// Create a fresh mailbox in the `Starting` state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(JobState {
                latest_status: StatusUpdate::starting(),
                outputs: Vec::new(),
                should_cancel: false,
                emitted_partial: false,
            }),
            changed: Notify::new(),
        }
    }

    /// Record a new status snapshot.
    pub fn update_status(&self, update: StatusUpdate) {
        {
            let mut state = self.state.lock().expect("communicator lock");
            state.latest_status = update;
        }
        self.changed.notify_waiters();
    }

    /// Append a partial output produced by a generator endpoint.
    pub fn push_partial_output(&self, value: Value) {
        {
            let mut state = self.state.lock().expect("communicator lock");
            state.outputs.push(value);
            state.emitted_partial = true;
        }
        self.changed.notify_waiters();
    }

    /// Append the final processed output, unless a partial output was
    /// already emitted for this call (in which case the final result is
    /// already the last list entry).
    pub fn push_final_output(&self, value: Value) {
        {
            let mut state = self.state.lock().expect("communicator lock");
            if state.emitted_partial {
                return;
            }
            state.outputs.push(value);
        }
        self.changed.notify_waiters();
    }

    /// Set the cancellation flag.
    pub fn request_cancel(&self) {
        {
            let mut state = self.state.lock().expect("communicator lock");
            state.should_cancel = true;
        }
        self.changed.notify_waiters();
        debug!("cancellation requested");
    }

    /// Whether cancellation has been requested.
    pub fn should_cancel(&self) -> bool {
        self.state.lock().expect("communicator lock").should_cancel
    }

    /// Resolve once cancellation is requested. Used by the streaming
    /// transports to stop reading between events.
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.changed.notified();
            if self.should_cancel() {
                return;
            }
            notified.await;
        }
    }

    /// Latest status snapshot.
    pub fn latest_status(&self) -> StatusUpdate {
        self.state
            .lock()
            .expect("communicator lock")
            .latest_status
            .clone()
    }

    /// Snapshot of the accumulated outputs.
    pub fn outputs(&self) -> Vec<Value> {
        self.state.lock().expect("communicator lock").outputs.clone()
    }

    fn outputs_len(&self) -> usize {
        self.state.lock().expect("communicator lock").outputs.len()
    }

    fn output_at(&self, index: usize) -> Option<Value> {
        self.state
            .lock()
            .expect("communicator lock")
            .outputs
            .get(index)
            .cloned()
    }
}

// ============================================================================
// Result slot
// ============================================================================

/// Terminal-result slot written exactly once by the background worker.
pub(crate) struct ResultSlot {
    value: Mutex<Option<ClientResult<Value>>>,
    done: Notify,
}

impl ResultSlot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(None),
            done: Notify::new(),
        })
    }

    /// Store the terminal result. First write wins.
    pub(crate) fn set(&self, result: ClientResult<Value>) {
        {
            let mut slot = self.value.lock().expect("result slot lock");
            if slot.is_some() {
                return;
            }
            *slot = Some(result);
        }
        self.done.notify_waiters();
    }

    fn get(&self) -> Option<ClientResult<Value>> {
        self.value.lock().expect("result slot lock").clone()
    }

    fn is_done(&self) -> bool {
        self.value.lock().expect("result slot lock").is_some()
    }

    async fn wait(&self) -> ClientResult<Value> {
        loop {
            let notified = self.done.notified();
            if let Some(result) = self.get() {
                return result;
            }
            notified.await;
        }
    }
}

// ============================================================================
// Job
// ============================================================================

/// Handle over one submitted call.
///
/// Created by [`AppClient::submit`]; becomes terminal (finished, failed,
/// or cancelled) exactly once. Offers blocking result retrieval, a
/// non-blocking status snapshot, forward-only iteration over streamed
/// outputs, and best-effort cancellation.
///
/// # Example
///
/// ```no_run
/// # async fn example(client: appcall_rs::client::AppClient) -> appcall_rs::error::ClientResult<()> {
/// use serde_json::json;
///
/// let mut job = client.submit("/count", vec![json!(3)])?;
/// while let Some(output) = job.next_output().await {
///     println!("partial: {output}");
/// }
/// let final_result = job.result().await?;
/// # Ok(())
/// # }
/// ```
///
/// [`AppClient::submit`]: crate::client::AppClient::submit
pub struct Job {
    handle: JoinHandle<()>,
    result: Arc<ResultSlot>,
    communicator: Option<Arc<Communicator>>,
    started: Arc<AtomicBool>,
    /// Iteration cursor: index of the next unseen output.
    cursor: usize,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("done", &self.result.is_done())
            .field("iterable", &self.communicator.is_some())
            .finish_non_exhaustive()
    }
}

impl Job {
    pub(crate) fn new(
        handle: JoinHandle<()>,
        result: Arc<ResultSlot>,
        communicator: Option<Arc<Communicator>>,
        started: Arc<AtomicBool>,
    ) -> Self {
        Self {
            handle,
            result,
            communicator,
            started,
            cursor: 0,
        }
    }

    /// Wait for the call to reach a terminal state and return its result,
    /// re-raising the underlying failure. For generator endpoints this is
    /// the final iteration's value.
    pub async fn result(&self) -> ClientResult<Value> {
        self.result.wait().await
    }

    /// Like [`result`](Self::result), but give up waiting after
    /// `timeout`. A timeout only stops the wait — the background call
    /// keeps running and can still be awaited again.
    pub async fn result_timeout(&self, timeout: Duration) -> ClientResult<Value> {
        tokio::time::timeout(timeout, self.result.wait())
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "no result within {:.1}s (the call is still running)",
                    timeout.as_secs_f64()
                ))
            })?
    }

    /// Whether the call has reached a terminal state.
    pub fn done(&self) -> bool {
        self.result.is_done()
    }

    /// Latest known status, without blocking.
    ///
    /// Synthesizes `Cancelled` when cancellation has been requested (even
    /// if the background call has not observed the flag yet), `Finished`
    /// when the call is terminal, `Processing` for running calls without
    /// a communicator, and otherwise returns the communicator's live
    /// snapshot unchanged.
    pub fn status(&self) -> StatusUpdate {
        if let Some(comm) = &self.communicator {
            if comm.should_cancel() {
                let mut update = StatusUpdate::with_code(Status::Cancelled);
                update.success = Some(false);
                return update;
            }
        }

        if let Some(result) = self.result.get() {
            let mut update = StatusUpdate::with_code(Status::Finished);
            update.success = Some(result.is_ok());
            return update;
        }

        match &self.communicator {
            None => StatusUpdate::with_code(Status::Processing),
            Some(comm) => comm.latest_status(),
        }
    }

    /// Snapshot of the outputs accumulated so far (final output included
    /// once terminal). Jobs without a communicator have no output list.
    pub fn outputs(&self) -> Vec<Value> {
        match &self.communicator {
            Some(comm) => comm.outputs(),
            None => Vec::new(),
        }
    }

    /// Yield the next unseen output, waiting until one arrives or the
    /// call turns terminal. Returns `None` once exhausted — and keeps
    /// returning `None` thereafter. Jobs without a communicator are not
    /// iterable.
    ///
    /// Outputs are observed in server-emission order with no index
    /// skipped.
    pub async fn next_output(&mut self) -> Option<Value> {
        let comm = self.communicator.clone()?;

        loop {
            let changed = comm.changed.notified();
            let finished = self.result.done.notified();

            // Read the terminal flag before scanning outputs: the final
            // output is appended before the result slot is set, so a
            // done-then-empty scan means real exhaustion.
            let was_done = self.result.is_done();

            if comm.outputs_len() > self.cursor {
                let value = comm.output_at(self.cursor)?;
                self.cursor += 1;
                return Some(value);
            }

            if was_done {
                return None;
            }

            tokio::select! {
                _ = changed => {}
                _ = finished => {}
            }
        }
    }

    /// Request cancellation, best effort.
    ///
    /// With a communicator, sets the cancellation flag and returns `true`
    /// immediately; the background call observes the flag between events
    /// and stops. This does not guarantee server-side termination beyond
    /// removing a queued call or letting the current generation step
    /// finish. Without a communicator, aborts the underlying task only if
    /// it has not started yet.
    pub fn cancel(&self) -> bool {
        if let Some(comm) = &self.communicator {
            comm.request_cancel();
            return true;
        }

        if !self.started.load(Ordering::SeqCst) {
            self.handle.abort();
            self.result.set(Err(ClientError::Cancelled));
            return true;
        }

        false
    }
}
