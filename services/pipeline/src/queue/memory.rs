use super::{BlockingQueue, Popped, QueueError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// In-process blocking queue with the same pop semantics as a Redis list
#[derive(Default)]
pub struct MemoryQueue {
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    notify: Notify,
    closed: AtomicBool,
    failing: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload to the tail of `queue` and wake waiting consumers
    pub fn push(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.lists
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.into());
        self.notify.notify_waiters();
    }

    /// Pending items on `queue`
    pub fn len(&self, queue: &str) -> usize {
        self.lists.lock().get(queue).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Make every pop fail as if the connection were down
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn try_pop(&self, queue: &str) -> Option<Vec<u8>> {
        self.lists.lock().get_mut(queue).and_then(VecDeque::pop_front)
    }

    fn next(&self, queue: &str) -> Result<Option<Popped>, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::Pop {
                queue: queue.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self.try_pop(queue).map(|payload| Popped {
            queue: queue.to_string(),
            payload,
        }))
    }

    /// Park until `queue` yields; `None` once `deadline` passes
    async fn wait(
        &self,
        queue: &str,
        deadline: Option<Instant>,
    ) -> Result<Option<Popped>, QueueError> {
        loop {
            // Register interest before checking so a concurrent push is not missed
            let notified = self.notify.notified();

            if let Some(popped) = self.next(queue)? {
                return Ok(Some(popped));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }
}

#[async_trait]
impl BlockingQueue for MemoryQueue {
    async fn blocking_pop(&self, queue: &str) -> Result<Popped, QueueError> {
        // Without a deadline the wait only ends with an item or an error
        self.wait(queue, None).await?.ok_or(QueueError::Closed)
    }

    async fn pop_timeout(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Popped>, QueueError> {
        self.wait(queue, Some(Instant::now() + timeout)).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
