//! Document store seam.
//!
//! Both services talk to the store through [`DocumentStore`]; the worker
//! writes posts, the analytics API reads view records. Documents are untyped
//! [`Document`] maps since the views collection has no fixed shape.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::fmt;
use thiserror::Error;

/// Errors returned by document store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to document store: {0}")]
    Connect(String),

    #[error("Failed to insert into {namespace}: {message}")]
    Insert { namespace: String, message: String },

    #[error("Failed to query {namespace}: {message}")]
    Query { namespace: String, message: String },

    #[error("Document store unavailable")]
    Unavailable,
}

/// A `database.collection` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Shared, concurrently usable document store client
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document, returning its `_id`
    async fn insert_one(&self, ns: &Namespace, document: Document) -> Result<Bson, StoreError>;

    /// First document matching `filter`, if any
    async fn find_one(&self, ns: &Namespace, filter: Document)
        -> Result<Option<Document>, StoreError>;

    /// Every document matching `filter`; an empty filter scans the collection
    async fn find_all(&self, ns: &Namespace, filter: Document) -> Result<Vec<Document>, StoreError>;

    /// Round trip to the server
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release the underlying connections
    async fn close(&self);
}
