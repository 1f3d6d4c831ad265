use super::{BlockingQueue, Popped, QueueError};
use crate::config::RedisConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Redis list used as a FIFO queue (`RPUSH` to produce, `BLPOP` to consume)
pub struct RedisQueue {
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisQueue {
    /// Connect and verify the server answers `PING`
    pub async fn connect(config: &RedisConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.uri.as_str())
            .map_err(|e| QueueError::Connect(e.to_string()))?;

        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;

        info!(queue = %config.queue, "Connected to Redis");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
        })
    }

    fn conn(&self) -> Result<ConnectionManager, QueueError> {
        self.conn.read().clone().ok_or(QueueError::Closed)
    }

    /// Append a payload to the tail of `queue`, returning the new length
    pub async fn push(&self, queue: &str, payload: &[u8]) -> Result<usize, QueueError> {
        let mut conn = self.conn()?;

        redis::cmd("RPUSH")
            .arg(queue)
            .arg(payload)
            .query_async::<_, usize>(&mut conn)
            .await
            .map_err(|e| QueueError::Push {
                queue: queue.to_string(),
                message: e.to_string(),
            })
    }

    /// `BLPOP queue timeout_secs`; a nil reply means the timeout elapsed
    async fn blpop(&self, queue: &str, timeout_secs: u64) -> Result<Option<Popped>, QueueError> {
        let mut conn = self.conn()?;

        let reply: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Pop {
                queue: queue.to_string(),
                message: e.to_string(),
            })?;

        Ok(reply.map(|(queue, payload)| {
            debug!(size_bytes = payload.len(), "Popped payload");
            Popped { queue, payload }
        }))
    }
}

#[async_trait]
impl BlockingQueue for RedisQueue {
    #[instrument(skip(self))]
    async fn blocking_pop(&self, queue: &str) -> Result<Popped, QueueError> {
        // Timeout 0 blocks until an element arrives
        self.blpop(queue, 0).await?.ok_or_else(|| QueueError::Pop {
            queue: queue.to_string(),
            message: "BLPOP returned nil".to_string(),
        })
    }

    /// Redis counts the timeout in whole seconds, so anything shorter waits one second
    #[instrument(skip(self))]
    async fn pop_timeout(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Popped>, QueueError> {
        self.blpop(queue, timeout.as_secs().max(1)).await
    }

    async fn close(&self) {
        // The socket closes once in-flight commands drop their handles
        if self.conn.write().take().is_some() {
            info!("Redis queue connection released");
        }
    }
}
