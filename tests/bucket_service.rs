/// Integration tests for bucket deletion
///
/// Covers the lookup-then-delete sequence of the bucket service:
/// 1. Wiring and configuration
/// 2. Organization resolution from the metadata record
/// 3. Missing and already-deleted buckets
/// 4. Failure propagation
use gorilla_readservice::config::DeletionConfig;
use gorilla_readservice::engine::stubs::{InMemoryBucketStore, InMemoryViewer, RecordingDeleter};
use gorilla_readservice::engine::Bucket;
use gorilla_readservice::error::{MetadataError, StorageError};
use gorilla_readservice::types::Id;
use gorilla_readservice::{BucketService, Error, ErrorKind, RequestContext};
use std::sync::Arc;
use std::time::Duration;

const ORG: Id = Id(0x1111111111111111);
const OTHER_ORG: Id = Id(0x4444444444444444);

fn service() -> (Arc<InMemoryBucketStore>, Arc<RecordingDeleter>, BucketService) {
    let store = Arc::new(InMemoryBucketStore::new());
    let deleter = Arc::new(RecordingDeleter::new());
    let service = BucketService::new(Some(store.clone()), Some(deleter.clone()));
    (store, deleter, service)
}

// ============================================================================
// CATEGORY 1: WIRING
// ============================================================================

/// Test: A service without a metadata store fails every call
#[tokio::test]
async fn test_unwired_service_fails() {
    let service = BucketService::new(None, None);
    let err = service
        .delete_bucket(&RequestContext::new(), Id(0x2222222222222222))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

/// Test: Deletion can be switched off through configuration
#[tokio::test]
async fn test_deletion_disabled_by_config() {
    let store = Arc::new(InMemoryBucketStore::new());
    let deleter = Arc::new(RecordingDeleter::new());
    let bucket = store.create_bucket(ORG, "telegraf");

    let service = BucketService::from_config(
        Some(store.clone()),
        Some(deleter.clone()),
        &DeletionConfig { delete_data: false },
    );
    service
        .delete_bucket(&RequestContext::new(), bucket.id)
        .await
        .unwrap();
    assert!(deleter.calls().is_empty());

    let service = BucketService::from_config(
        Some(store),
        Some(deleter.clone()),
        &DeletionConfig::default(),
    );
    assert!(service.deletes_data());
}

// ============================================================================
// CATEGORY 2: ORGANIZATION RESOLUTION
// ============================================================================

/// Test: The deleter receives the organization from the bucket record
#[tokio::test]
async fn test_delete_uses_record_org() {
    let (store, deleter, service) = service();
    let bucket = store.create_bucket(ORG, "telegraf");

    service
        .delete_bucket(&RequestContext::new(), bucket.id)
        .await
        .unwrap();
    assert_eq!(deleter.calls(), vec![(ORG, bucket.id)]);
}

/// Test: Buckets of different organizations are deleted under their own org
#[tokio::test]
async fn test_delete_across_orgs() {
    let (store, deleter, service) = service();
    let first = store.create_bucket(ORG, "telegraf");
    let second = store.create_bucket(OTHER_ORG, "telegraf");
    let ctx = RequestContext::new();

    service.delete_bucket(&ctx, second.id).await.unwrap();
    service.delete_bucket(&ctx, first.id).await.unwrap();
    assert_eq!(
        deleter.calls(),
        vec![(OTHER_ORG, second.id), (ORG, first.id)]
    );
}

/// Test: A record inserted with explicit fields is honored as is
#[tokio::test]
async fn test_inserted_record() {
    let (store, deleter, service) = service();
    store.insert(Bucket {
        id: Id(0x0b00000000000042),
        org_id: OTHER_ORG,
        name: "_monitoring".into(),
        retention_period: Some(Duration::from_secs(7 * 24 * 3600)),
    });

    service
        .delete_bucket(&RequestContext::new(), Id(0x0b00000000000042))
        .await
        .unwrap();
    assert_eq!(deleter.last_call(), Some((OTHER_ORG, Id(0x0b00000000000042))));
}

/// Test: Only the deleted bucket's series leave the engine
#[tokio::test]
async fn test_engine_data_removed() {
    let store = Arc::new(InMemoryBucketStore::new());
    let engine = InMemoryViewer::new();
    let doomed = store.create_bucket(ORG, "telegraf");
    let kept = store.create_bucket(ORG, "_monitoring");
    engine.add_series(ORG, doomed.id, "cpu", "usage", &[("host", "a")], vec![(1, 1.0)]);
    engine.add_series(ORG, doomed.id, "cpu", "usage", &[("host", "b")], vec![(1, 2.0)]);
    engine.add_series(ORG, kept.id, "cpu", "usage", &[("host", "a")], vec![(1, 3.0)]);

    let service = BucketService::new(Some(store), Some(Arc::new(engine.clone())));
    service
        .delete_bucket(&RequestContext::new(), doomed.id)
        .await
        .unwrap();
    assert_eq!(engine.series_count(), 1);

    // Nothing left to drop the second time
    assert!(!engine.drop_bucket(ORG, doomed.id));
    assert!(engine.drop_bucket(ORG, kept.id));
}

// ============================================================================
// CATEGORY 3: MISSING BUCKETS
// ============================================================================

/// Test: An unknown bucket is NotFound and nothing is deleted
#[tokio::test]
async fn test_unknown_bucket() {
    let (_store, deleter, service) = service();
    let err = service
        .delete_bucket(&RequestContext::new(), Id(0x2222222222222222))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(id) if id == Id(0x2222222222222222)));
    assert!(deleter.calls().is_empty());
}

/// Test: Deleting a bucket whose record is already gone is NotFound
#[tokio::test]
async fn test_already_deleted_bucket() {
    let (store, deleter, service) = service();
    let bucket = store.create_bucket(ORG, "telegraf");
    store.remove_bucket(bucket.id).unwrap();
    assert!(store.is_empty());

    let err = service
        .delete_bucket(&RequestContext::new(), bucket.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(deleter.calls().is_empty());
}

/// Test: The metadata record survives data deletion
#[tokio::test]
async fn test_record_is_left_in_place() {
    let (store, _deleter, service) = service();
    let bucket = store.create_bucket(ORG, "telegraf");
    let ctx = RequestContext::new();

    service.delete_bucket(&ctx, bucket.id).await.unwrap();
    assert_eq!(store.len(), 1);
    let found = service.find_bucket_by_id(&ctx, bucket.id).await.unwrap();
    assert_eq!(found, bucket);
}

// ============================================================================
// CATEGORY 4: FAILURES
// ============================================================================

/// Test: Metadata store failures are passed through
#[tokio::test]
async fn test_metadata_failure() {
    let (store, deleter, service) = service();
    let bucket = store.create_bucket(ORG, "telegraf");
    store.set_failure(Some("metadata store offline"));

    let err = service
        .delete_bucket(&RequestContext::new(), bucket.id)
        .await
        .unwrap_err();
    match err {
        Error::Metadata(MetadataError::Unavailable(msg)) => {
            assert_eq!(msg, "metadata store offline")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(deleter.calls().is_empty());
}

/// Test: A failed data deletion can be retried once the engine recovers
#[tokio::test]
async fn test_failed_delete_is_retryable() {
    let store = Arc::new(InMemoryBucketStore::new());
    let bucket = store.create_bucket(ORG, "telegraf");
    let ctx = RequestContext::new();

    let failing = BucketService::new(
        Some(store.clone()),
        Some(Arc::new(RecordingDeleter::failing("shard busy"))),
    );
    let err = failing.delete_bucket(&ctx, bucket.id).await.unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::Internal(_))));

    let deleter = Arc::new(RecordingDeleter::new());
    let healthy = BucketService::new(Some(store), Some(deleter.clone()));
    healthy.delete_bucket(&ctx, bucket.id).await.unwrap();
    assert_eq!(deleter.calls(), vec![(ORG, bucket.id)]);
}

/// Test: A cancelled request does not reach the deleter
#[tokio::test]
async fn test_cancelled_request() {
    let (store, deleter, service) = service();
    let bucket = store.create_bucket(ORG, "telegraf");
    let ctx = RequestContext::new();
    ctx.cancel();

    let err = service.delete_bucket(&ctx, bucket.id).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(deleter.calls().is_empty());
}
