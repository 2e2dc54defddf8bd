//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use clinic_sync_protocol::{DataPullResponse, DataPushResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Network calls for one entity type.
///
/// This trait abstracts the network layer, allowing for different implementations
/// (HTTP, loopback, mock for testing, etc.).
pub trait SyncTransport<T, P>: Send + Sync {
    /// Uploads one batch of local records.
    fn push(&self, records: &[T]) -> SyncResult<DataPushResponse>;

    /// Downloads the page after `process_token` (the first page when `None`).
    fn pull(&self, process_token: Option<&str>, limit: u32) -> SyncResult<DataPullResponse<P>>;
}

/// A scripted in-process server for testing.
///
/// Pulls page through `server_records` using the record index as the
/// process token. Pushes are recorded and answered from a queue of scripted
/// responses, accepting everything once the queue is empty.
pub struct MockTransport<T, P> {
    connected: AtomicBool,
    server_records: Mutex<Vec<P>>,
    push_responses: Mutex<VecDeque<SyncResult<DataPushResponse>>>,
    pull_failures: Mutex<VecDeque<(usize, SyncError)>>,
    pushed: Mutex<Vec<Vec<T>>>,
    pull_requests: Mutex<Vec<(Option<String>, u32)>>,
}

impl<T: Clone, P: Clone> MockTransport<T, P> {
    /// Creates a connected transport with no server data.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            server_records: Mutex::new(Vec::new()),
            push_responses: Mutex::new(VecDeque::new()),
            pull_failures: Mutex::new(VecDeque::new()),
            pushed: Mutex::new(Vec::new()),
            pull_requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the records the server will hand out on pull.
    pub fn set_server_records(&self, records: Vec<P>) {
        *self.server_records.lock() = records;
    }

    /// Queues the response to the next push.
    pub fn enqueue_push_response(&self, response: SyncResult<DataPushResponse>) {
        self.push_responses.lock().push_back(response);
    }

    /// Fails the pull of the page that starts at record `offset`.
    pub fn fail_pull_at(&self, offset: usize, error: SyncError) {
        self.pull_failures.lock().push_back((offset, error));
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Batches received by push, in order.
    pub fn pushed_batches(&self) -> Vec<Vec<T>> {
        self.pushed.lock().clone()
    }

    /// Number of push calls made.
    pub fn push_count(&self) -> usize {
        self.pushed.lock().len()
    }

    /// `(process_token, limit)` of every pull call, in order.
    pub fn pull_requests(&self) -> Vec<(Option<String>, u32)> {
        self.pull_requests.lock().clone()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock transport disconnected",
            )))
        }
    }
}

impl<T: Clone, P: Clone> Default for MockTransport<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, P> SyncTransport<T, P> for MockTransport<T, P>
where
    T: Clone + Send + Sync,
    P: Clone + Send + Sync,
{
    fn push(&self, records: &[T]) -> SyncResult<DataPushResponse> {
        self.check_connected()?;
        self.pushed.lock().push(records.to_vec());
        self.push_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(DataPushResponse::accepted()))
    }

    fn pull(&self, process_token: Option<&str>, limit: u32) -> SyncResult<DataPullResponse<P>> {
        self.check_connected()?;
        self.pull_requests
            .lock()
            .push((process_token.map(str::to_string), limit));

        let offset = match process_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| SyncError::http(400, format!("bad process token {token}")))?,
            None => 0,
        };

        {
            let mut failures = self.pull_failures.lock();
            if let Some(index) = failures.iter().position(|(at, _)| *at == offset) {
                if let Some((_, error)) = failures.remove(index) {
                    return Err(error);
                }
            }
        }

        let records = self.server_records.lock();
        let end = offset.saturating_add(limit as usize).min(records.len());
        let start = offset.min(end);
        Ok(DataPullResponse::new(
            records[start..end].to_vec(),
            end.to_string(),
        ))
    }
}
