use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use blog_pipeline::bson::{Bson, Document};
use blog_pipeline::{
    BlockingQueue, DecodeError, DocumentStore, Namespace, Popped, Post, QueueError, StoreError,
    WorkerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Fatal worker errors. Data and store errors never end the loop.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Queue unavailable after {attempts} failed attempts: {source}")]
    QueueUnavailable {
        attempts: u32,
        #[source]
        source: QueueError,
    },
}

/// What happened to a single popped payload
#[derive(Debug)]
pub enum Outcome {
    /// Decoded and written to the posts collection
    Persisted { id: Bson },
    /// Payload did not decode; nothing was written
    Skipped(DecodeError),
    /// Decoded, but the insert failed and the payload is lost
    InsertFailed(StoreError),
}

/// Where and how the worker moves posts
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// List key to pop from
    pub queue: String,
    /// Collection posts are inserted into
    pub posts: Namespace,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_max_elapsed: Duration,
    /// Longest single pop; bounds how long shutdown waits
    pub poll_timeout: Duration,
}

impl WorkerSettings {
    pub fn new(queue: impl Into<String>, posts: Namespace, retry: &WorkerConfig) -> Self {
        Self {
            queue: queue.into(),
            posts,
            backoff_initial: retry.backoff_initial(),
            backoff_max: retry.backoff_max(),
            backoff_max_elapsed: retry.backoff_max_elapsed(),
            poll_timeout: retry.poll_timeout(),
        }
    }
}

/// Sequential queue-to-store ingestion loop
pub struct PostWorker {
    queue: Arc<dyn BlockingQueue>,
    store: Arc<dyn DocumentStore>,
    settings: WorkerSettings,
}

impl PostWorker {
    pub fn new(
        queue: Arc<dyn BlockingQueue>,
        store: Arc<dyn DocumentStore>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    fn new_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.backoff_initial,
            max_interval: self.settings.backoff_max,
            max_elapsed_time: Some(self.settings.backoff_max_elapsed),
            ..Default::default()
        }
    }

    /// Drain the queue until `shutdown` fires or the queue stays down.
    ///
    /// One pop and at most one insert are in flight at any time, so posts
    /// are written in pop order. Pops are bounded by the poll timeout and
    /// always run to completion: a payload the queue hands over after
    /// `shutdown` fires is still persisted before the loop exits.
    #[instrument(skip(self, shutdown), fields(queue = %self.settings.queue))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        info!(posts = %self.settings.posts, "Starting post ingestion loop");

        let mut backoff = self.new_backoff();
        let mut attempts = 0u32;

        loop {
            if shutdown.is_cancelled() {
                info!("Received shutdown signal");
                break;
            }

            let popped = self
                .queue
                .pop_timeout(&self.settings.queue, self.settings.poll_timeout)
                .await;

            match popped {
                Ok(None) => continue,
                Ok(Some(popped)) => {
                    if attempts > 0 {
                        info!(attempts, "Queue recovered");
                        attempts = 0;
                    }
                    self.process(popped).await;
                }
                Err(QueueError::Closed) => {
                    info!("Queue closed");
                    break;
                }
                Err(e) => {
                    // Elapsed time counts from the first failure of this streak
                    if attempts == 0 {
                        backoff.reset();
                    }
                    attempts += 1;
                    metrics::counter!("worker.queue.errors").increment(1);

                    let Some(delay) = backoff.next_backoff() else {
                        error!(error = %e, attempts, "Giving up on queue");
                        return Err(WorkerError::QueueUnavailable {
                            attempts,
                            source: e,
                        });
                    };

                    warn!(
                        error = %e,
                        attempt = attempts,
                        ?delay,
                        "Queue pop failed, retrying"
                    );

                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!("Received shutdown signal during backoff");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("Post ingestion loop stopped");
        Ok(())
    }

    /// Wait for one payload and process it
    pub async fn run_once(&self) -> Result<Outcome, QueueError> {
        let popped = self.queue.blocking_pop(&self.settings.queue).await?;
        Ok(self.process(popped).await)
    }

    /// Decode a popped payload and persist it. Failures are logged and returned, never raised.
    #[instrument(skip(self, popped), fields(queue = %popped.queue, size_bytes = popped.payload.len()))]
    pub async fn process(&self, popped: Popped) -> Outcome {
        let post = match Post::from_payload(&popped.payload) {
            Ok(post) => post,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable post payload");
                metrics::counter!("worker.posts.decode_failed").increment(1);
                return Outcome::Skipped(e);
            }
        };

        debug!(title = %post.title, author = %post.author, "Decoded post");

        match self
            .store
            .insert_one(&self.settings.posts, Document::from(&post))
            .await
        {
            Ok(id) => {
                info!(title = %post.title, id = %id, "Post persisted");
                metrics::counter!("worker.posts.persisted").increment(1);
                Outcome::Persisted { id }
            }
            Err(e) => {
                error!(error = %e, title = %post.title, "Failed to insert post");
                metrics::counter!("worker.posts.insert_failed").increment(1);
                Outcome::InsertFailed(e)
            }
        }
    }
}
