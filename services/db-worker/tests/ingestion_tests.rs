//! End-to-end ingestion loop tests against the in-memory queue and store.

use blog_db_worker::{PostWorker, WorkerSettings};
use blog_pipeline::{MemoryQueue, MemoryStore, Namespace, Post, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const QUEUE: &str = "queue:new-post";

fn posts() -> Namespace {
    Namespace::new("blog", "posts")
}

fn start_worker() -> (
    Arc<MemoryQueue>,
    Arc<MemoryStore>,
    CancellationToken,
    tokio::task::JoinHandle<Result<(), blog_db_worker::WorkerError>>,
) {
    let queue = Arc::new(MemoryQueue::new());
    let store = Arc::new(MemoryStore::new());
    let settings = WorkerSettings::new(QUEUE, posts(), &WorkerConfig::default());
    let worker = PostWorker::new(queue.clone(), store.clone(), settings);

    let token = CancellationToken::new();
    let handle = {
        let token = token.clone();
        tokio::spawn(async move { worker.run(token).await })
    };

    (queue, store, token, handle)
}

async fn wait_for_posts(store: &MemoryStore, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.len(&posts()) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker did not persist posts in time");
}

#[tokio::test]
async fn test_posts_are_persisted_in_pop_order() {
    let (queue, store, token, handle) = start_worker();

    let published: Vec<Post> = (0..10)
        .map(|i| Post::new(format!("post-{i}"), "author", format!("body {i}")))
        .collect();
    for post in &published {
        queue.push(QUEUE, post.to_payload().unwrap());
    }

    wait_for_posts(&store, published.len()).await;
    token.cancel();
    handle.await.unwrap().unwrap();

    let titles: Vec<String> = store
        .documents(&posts())
        .iter()
        .map(|d| d.get_str("title").unwrap().to_string())
        .collect();
    let expected: Vec<String> = published.iter().map(|p| p.title.clone()).collect();
    assert_eq!(titles, expected);
}

#[tokio::test]
async fn test_malformed_payload_does_not_stop_loop() {
    let (queue, store, token, handle) = start_worker();

    queue.push(QUEUE, Post::new("before", "a", "b").to_payload().unwrap());
    queue.push(QUEUE, "{not json");
    queue.push(QUEUE, r#"{"title":1,"author":"a","body":"b"}"#);
    queue.push(QUEUE, Post::new("after", "a", "b").to_payload().unwrap());

    wait_for_posts(&store, 2).await;
    // Give the loop a chance to write anything it should not have
    tokio::time::sleep(Duration::from_millis(20)).await;

    token.cancel();
    handle.await.unwrap().unwrap();

    let documents = store.documents(&posts());
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].get_str("title").unwrap(), "before");
    assert_eq!(documents[1].get_str("title").unwrap(), "after");
    assert!(queue.is_empty(QUEUE));
}

#[tokio::test]
async fn test_store_outage_drops_payload_and_continues() {
    let (queue, store, token, handle) = start_worker();

    store.set_unavailable(true);
    queue.push(QUEUE, Post::new("dropped", "a", "b").to_payload().unwrap());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !queue.is_empty(QUEUE) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    // The pop has happened; let the failed insert complete before recovering
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.set_unavailable(false);

    queue.push(QUEUE, Post::new("kept", "a", "b").to_payload().unwrap());
    wait_for_posts(&store, 1).await;

    token.cancel();
    handle.await.unwrap().unwrap();

    let documents = store.documents(&posts());
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].get_str("title").unwrap(), "kept");
}

#[tokio::test]
async fn test_stored_document_matches_payload() {
    let (queue, store, token, handle) = start_worker();

    queue.push(QUEUE, r#"{"title":"hello","author":"a","body":"b"}"#);
    wait_for_posts(&store, 1).await;

    token.cancel();
    handle.await.unwrap().unwrap();

    let document = &store.documents(&posts())[0];
    let fields: Vec<&str> = document.keys().map(String::as_str).collect();
    assert_eq!(fields, ["_id", "title", "author", "body"]);
    assert_eq!(document.get_str("author").unwrap(), "a");
    assert_eq!(document.get_str("body").unwrap(), "b");
}
