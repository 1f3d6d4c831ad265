//! Blocking FIFO queue seam used by the ingestion worker.

mod memory;
mod redis_queue;

pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur talking to the queue
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to connect to queue: {0}")]
    Connect(String),

    #[error("Failed to pop from {queue}: {message}")]
    Pop { queue: String, message: String },

    #[error("Failed to push to {queue}: {message}")]
    Push { queue: String, message: String },

    #[error("Queue closed")]
    Closed,
}

/// Result of a blocking pop: the list it came from and the raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popped {
    pub queue: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait BlockingQueue: Send + Sync {
    /// Wait, without timeout, for the next item on `queue` and remove it.
    ///
    /// Dropping the returned future can lose an item the server has already
    /// removed; loops that stop on a signal use [`pop_timeout`](Self::pop_timeout).
    async fn blocking_pop(&self, queue: &str) -> Result<Popped, QueueError>;

    /// Wait at most `timeout` for the next item on `queue`.
    ///
    /// `Ok(None)` means nothing arrived in time. Callers that must not lose
    /// items let this future complete instead of dropping it.
    async fn pop_timeout(&self, queue: &str, timeout: Duration)
        -> Result<Option<Popped>, QueueError>;

    /// Release the connection
    async fn close(&self);
}
