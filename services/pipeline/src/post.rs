//! The "new blog post" event carried on the queue.

use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A payload that could not be decoded into a [`Post`]
#[derive(Error, Debug)]
#[error("Invalid post payload ({len} bytes): {source}")]
pub struct DecodeError {
    len: usize,
    #[source]
    source: serde_json::Error,
}

impl DecodeError {
    /// Size of the rejected payload
    pub fn payload_len(&self) -> usize {
        self.len
    }
}

/// Blog post published by an external producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    pub author: String,
    pub body: String,
}

impl Post {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            body: body.into(),
        }
    }

    /// Decode a queue payload. All three fields are required; unknown fields are ignored.
    pub fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(payload).map_err(|source| DecodeError {
            len: payload.len(),
            source,
        })
    }

    /// Encode as a queue payload
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl From<&Post> for Document {
    fn from(post: &Post) -> Self {
        doc! {
            "title": post.title.as_str(),
            "author": post.author.as_str(),
            "body": post.body.as_str(),
        }
    }
}
