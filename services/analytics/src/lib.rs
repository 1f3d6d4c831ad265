//! Blog Analytics Service
//!
//! Read-only HTTP API over the `views` collection. The records are written
//! by something else entirely; this service only looks them up.
//!
//! | Route               | Response                                    |
//! |---------------------|---------------------------------------------|
//! | `GET /views/:title` | `{"Data": <record or null>}`                |
//! | `GET /views`        | `{"Data": [<record>, ...]}`                 |
//! | `GET /health`       | liveness                                    |
//! | `GET /ready`        | store connectivity                          |
//!
//! Store failures on the `/views` routes answer 500 with
//! `{"error": "Failed to get analytics data"}`.

pub mod api;
pub mod error;

pub use api::{create_router, document_to_json, start_api_server, AppState, DataResponse};
pub use error::{ApiError, ErrorResponse};
