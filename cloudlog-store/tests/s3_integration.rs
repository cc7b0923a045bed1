//! `LocalStack` integration tests for `S3Store`.
//!
//! These tests require `LocalStack` to be running. Start it with:
//!
//! ```bash
//! docker run --rm -p 4566:4566 localstack/localstack
//! ```
//!
//! Create the test bucket:
//!
//! ```bash
//! aws --endpoint-url=http://localhost:4566 s3 mb s3://cloudlog-test
//! ```
//!
//! Run tests with:
//!
//! ```bash
//! cargo test -p cloudlog-store --features s3 --test s3_integration -- --ignored
//! ```

#![cfg(feature = "s3")]

use bytes::Bytes;
use cloudlog_store::{Namespace, S3Config, S3Store, Store, StoreError};

const TEST_BUCKET: &str = "cloudlog-test";
const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

fn localstack_config() -> S3Config {
    S3Config::new(TEST_BUCKET)
        .with_endpoint(LOCALSTACK_ENDPOINT)
        .with_path_style()
        .with_region("us-east-1")
}

async fn create_store() -> S3Store {
    S3Store::new(localstack_config())
        .await
        .expect("Failed to create S3 store")
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_put_get_roundtrip() {
    let store = create_store().await;
    let key = Namespace::new("integration").key_for("roundtrip.log");
    let data = Bytes::from_static(b"Hello, S3!");

    store.put(&key, data.clone()).await.expect("put failed");

    let retrieved = store.get(&key).await.expect("get failed");
    assert_eq!(retrieved, data);
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_overwrite() {
    let store = create_store().await;
    let key = Namespace::new("integration").key_for("overwrite.log");

    store
        .put(&key, Bytes::from_static(b"version 1"))
        .await
        .expect("put v1 failed");
    store
        .put(&key, Bytes::from_static(b"version 2 - longer"))
        .await
        .expect("put v2 failed");

    let retrieved = store.get(&key).await.expect("get failed");
    assert_eq!(retrieved, Bytes::from_static(b"version 2 - longer"));
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_get_not_found() {
    let store = create_store().await;
    let key = Namespace::new("integration").key_for("nonexistent-key.log");

    match store.get(&key).await {
        Err(StoreError::NotFound { key }) => assert!(key.contains("nonexistent-key.log")),
        other => panic!("Expected NotFound error, got: {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_missing_bucket_is_rejection() {
    let store = S3Store::new(S3Config {
        bucket: "cloudlog-bucket-that-does-not-exist".to_string(),
        ..localstack_config()
    })
    .await
    .expect("Failed to create S3 store");
    let key = Namespace::new("integration").key_for("a.log");

    let err = store
        .put(&key, Bytes::from_static(b"x"))
        .await
        .expect_err("put into a missing bucket should fail");
    assert!(err.is_rejection(), "unexpected error: {err:?}");
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_unreachable_endpoint_is_transport_failure() {
    let store = S3Store::new(
        S3Config::new(TEST_BUCKET)
            .with_endpoint("http://127.0.0.1:1")
            .with_path_style()
            .with_region("us-east-1")
            .with_timeout_secs(5),
    )
    .await
    .expect("Failed to create S3 store");
    let key = Namespace::new("integration").key_for("a.log");

    let err = store
        .put(&key, Bytes::from_static(b"x"))
        .await
        .expect_err("put to a closed port should fail");
    assert!(
        matches!(err, StoreError::Transport { .. } | StoreError::Interrupted { .. }),
        "unexpected error: {err:?}"
    );
}
