//! Blog DB Worker
//!
//! Pops "new post" events from a Redis list and inserts them into the posts
//! collection, one at a time and in pop order. Undecodable payloads are
//! skipped, failed inserts are logged and dropped, and only a queue that
//! stays unreachable past the backoff budget stops the worker.

pub mod worker;

pub use worker::{Outcome, PostWorker, WorkerError, WorkerSettings};
