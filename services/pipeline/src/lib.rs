//! Blog Pipeline - shared building blocks for the blog services
//!
//! New posts travel from a Redis list into MongoDB; view analytics are read
//! back out of MongoDB over HTTP. This crate holds what both halves share:
//!
//! - Layered configuration (files + `BLOG__*` environment variables)
//! - The [`Post`] event and its JSON payload codec
//! - The [`DocumentStore`] and [`BlockingQueue`] seams, with MongoDB/Redis
//!   adapters and in-memory implementations for tests
//! - Tracing, metrics and shutdown-signal setup for the binaries
//!
//! ```text
//! publisher ──RPUSH──▶ queue:new-post ──BLPOP──▶ db-worker ──insert──▶ blog.posts
//!
//!                      blog.views ──find──▶ analytics ──JSON──▶ GET /views[/:title]
//! ```

pub mod config;
pub mod post;
pub mod queue;
pub mod store;
pub mod telemetry;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use mongodb::bson;

// Re-export main types
pub use crate::config::{
    ApiConfig, Config, ConfigError, LogFormat, MongoConfig, RedisConfig, ServiceConfig,
    WorkerConfig,
};
pub use crate::post::{DecodeError, Post};
pub use crate::queue::{BlockingQueue, MemoryQueue, Popped, QueueError, RedisQueue};
pub use crate::store::{DocumentStore, MemoryStore, MongoStore, Namespace, StoreError};
