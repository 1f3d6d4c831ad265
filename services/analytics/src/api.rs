use crate::error::ApiError;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use blog_pipeline::bson::{doc, Bson, Document};
use blog_pipeline::{ApiConfig, DocumentStore, Namespace};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    /// Collection view records are read from
    pub views: Namespace,
    pub service_name: String,
}

/// Success envelope: `{"Data": ...}`
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    #[serde(rename = "Data")]
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Render a stored document as relaxed extended JSON
pub fn document_to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

/// CORS for a read-only API: `GET` from the configured origins, or from
/// anywhere when none are listed
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if !config.cors_enabled {
        return CorsLayer::new();
    }

    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if config.cors_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/views", get(list_views))
        .route("/views/:title", get(get_views_by_title))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "store": "connected"
            })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "store": "disconnected"
            })),
        ),
    }
}

/// `GET /views/:title`
///
/// Exact, case-sensitive match on `title`. A missing record is `{"Data": null}`
/// with 200, not an error.
#[instrument(skip(state))]
async fn get_views_by_title(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> Result<Json<DataResponse<Option<Value>>>, ApiError> {
    metrics::counter!("analytics.requests", "route" => "views_by_title").increment(1);

    let document = state
        .store
        .find_one(&state.views, doc! { "title": title.as_str() })
        .await?;

    debug!(found = document.is_some(), "Looked up view record");

    Ok(Json(DataResponse::new(document.map(document_to_json))))
}

/// `GET /views`
///
/// Full collection scan, unpaginated.
#[instrument(skip(state))]
async fn list_views(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<Value>>>, ApiError> {
    metrics::counter!("analytics.requests", "route" => "views").increment(1);

    let documents = state.store.find_all(&state.views, Document::new()).await?;

    debug!(count = documents.len(), "Scanned view records");

    Ok(Json(DataResponse::new(
        documents.into_iter().map(document_to_json).collect(),
    )))
}

/// Serve the analytics API until `shutdown` fires
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting analytics API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ANALYTICS_ERROR;
    use async_trait::async_trait;
    use axum::response::Response;
    use blog_pipeline::StoreError;
    use mockall::mock;

    mock! {
        pub Store {}

        #[async_trait]
        impl DocumentStore for Store {
            async fn insert_one(&self, ns: &Namespace, document: Document) -> Result<Bson, StoreError>;
            async fn find_one(&self, ns: &Namespace, filter: Document) -> Result<Option<Document>, StoreError>;
            async fn find_all(&self, ns: &Namespace, filter: Document) -> Result<Vec<Document>, StoreError>;
            async fn ping(&self) -> Result<(), StoreError>;
            async fn close(&self);
        }
    }

    fn state(store: MockStore) -> AppState {
        AppState {
            store: Arc::new(store),
            views: Namespace::new("blog", "views"),
            service_name: "analytics".to_string(),
        }
    }

    fn query_error() -> StoreError {
        StoreError::Query {
            namespace: "blog.views".to_string(),
            message: "connection reset by 10.0.0.7".to_string(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_by_title_filters_views_collection() {
        let mut store = MockStore::new();
        store
            .expect_find_one()
            .withf(|ns, filter| {
                ns.to_string() == "blog.views" && *filter == doc! { "title": "hello" }
            })
            .times(1)
            .returning(|_, _| Ok(Some(doc! { "title": "hello", "views": 42_i64 })));

        let Json(response) = get_views_by_title(State(state(store)), Path("hello".to_string()))
            .await
            .unwrap();

        assert_eq!(
            response.data,
            Some(serde_json::json!({ "title": "hello", "views": 42 }))
        );
    }

    #[tokio::test]
    async fn test_get_by_title_not_found_is_null() {
        let mut store = MockStore::new();
        store.expect_find_one().returning(|_, _| Ok(None));

        let response = get_views_by_title(State(state(store)), Path("nope".to_string()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({ "Data": null }));
    }

    #[tokio::test]
    async fn test_store_error_hides_detail() {
        let mut store = MockStore::new();
        store.expect_find_one().returning(|_, _| Err(query_error()));

        let response = get_views_by_title(State(state(store)), Path("hello".to_string()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({ "error": ANALYTICS_ERROR }));
        assert!(!body.to_string().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_list_views_uses_empty_filter() {
        let mut store = MockStore::new();
        store
            .expect_find_all()
            .withf(|_, filter| filter.is_empty())
            .times(1)
            .returning(|_, _| Ok(vec![doc! { "title": "a" }, doc! { "title": "b" }]));

        let response = list_views(State(state(store))).await.into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "Data": [{ "title": "a" }, { "title": "b" }] })
        );
    }

    #[tokio::test]
    async fn test_list_views_store_error() {
        let mut store = MockStore::new();
        store.expect_find_all().returning(|_, _| Err(StoreError::Unavailable));

        let response = list_views(State(state(store))).await.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": ANALYTICS_ERROR })
        );
    }

    #[tokio::test]
    async fn test_readiness_reports_store_down() {
        let mut store = MockStore::new();
        store
            .expect_ping()
            .returning(|| Err(StoreError::Connect("timed out".to_string())));

        let response = readiness_check(State(state(store))).await.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["status"], "not_ready");
    }

    #[test]
    fn test_object_id_renders_as_extended_json() {
        let id = blog_pipeline::bson::oid::ObjectId::new();
        let value = document_to_json(doc! { "_id": id, "title": "t" });

        assert_eq!(value["_id"]["$oid"], id.to_hex());
        assert_eq!(value["title"], "t");
    }
}
