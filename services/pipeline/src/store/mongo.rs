use super::{DocumentStore, Namespace, StoreError};
use crate::config::MongoConfig;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use tracing::{debug, info, instrument};

/// MongoDB-backed document store
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Connect and verify the server is reachable
    pub async fn connect(config: &MongoConfig) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        options.app_name = config.app_name.clone();
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.connect_timeout());

        let client =
            Client::with_options(options).map_err(|e| StoreError::Connect(e.to_string()))?;

        let store = Self { client };
        store.ping().await?;

        info!(database = %config.database, "Connected to MongoDB");

        Ok(store)
    }

    fn collection(&self, ns: &Namespace) -> Collection<Document> {
        self.client
            .database(&ns.database)
            .collection::<Document>(&ns.collection)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    #[instrument(skip(self, document), fields(namespace = %ns))]
    async fn insert_one(&self, ns: &Namespace, document: Document) -> Result<Bson, StoreError> {
        let result = self
            .collection(ns)
            .insert_one(document, None)
            .await
            .map_err(|e| StoreError::Insert {
                namespace: ns.to_string(),
                message: e.to_string(),
            })?;

        debug!(inserted_id = %result.inserted_id, "Document inserted");

        Ok(result.inserted_id)
    }

    #[instrument(skip(self), fields(namespace = %ns))]
    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.collection(ns)
            .find_one(filter, None)
            .await
            .map_err(|e| StoreError::Query {
                namespace: ns.to_string(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self), fields(namespace = %ns))]
    async fn find_all(&self, ns: &Namespace, filter: Document) -> Result<Vec<Document>, StoreError> {
        let query_error = |e: mongodb::error::Error| StoreError::Query {
            namespace: ns.to_string(),
            message: e.to_string(),
        };

        let cursor = self
            .collection(ns)
            .find(filter, None)
            .await
            .map_err(query_error)?;

        let documents: Vec<Document> = cursor.try_collect().await.map_err(query_error)?;

        debug!(count = documents.len(), "Collection scanned");

        Ok(documents)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Connect(e.to_string()))
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        info!("MongoDB client shut down");
    }
}
