//! Integration tests driving the end-to-end scenarios of spec.md §8 against
//! `InMemoryRemoteStorage` and a tempdir-backed `LocalFileStorage`.

use std::sync::Arc;
use std::time::Duration;

use filesync_core::config::ExecutorConfig;
use filesync_core::db::local_state::TransferStatus;
use filesync_core::db::DbManager;
use filesync_core::file_storage::FileStorage;
use filesync_core::input_file::InputFile;
use filesync_core::local_storage::{stored_path, LocalFileStorage};
use filesync_core::metadata::in_memory::InMemoryMetadataStore;
use filesync_core::metadata::{FileCreated, FileUpdated};
use filesync_core::remote::{InMemoryRemoteStorage, RemoteStorage};
use filesync_core::state::LocalFileStateManager;
use filesync_core::sync::{FileSync, SyncExecutor};

struct Harness {
    storage: FileStorage<InMemoryMetadataStore>,
    sync: Arc<FileSync<InMemoryMetadataStore>>,
    metadata: Arc<InMemoryMetadataStore>,
    local: Arc<LocalFileStorage>,
    remote: Arc<RemoteStorage>,
    state: Arc<LocalFileStateManager>,
    _dir: tempfile::TempDir,
}

fn in_memory_remote(remote: &RemoteStorage) -> &InMemoryRemoteStorage {
    match remote {
        RemoteStorage::InMemory(r) => r,
        _ => panic!("expected in-memory remote in tests"),
    }
}

fn build(is_leader: bool, config: ExecutorConfig) -> Harness {
    let _ = env_logger::try_init();

    let dir = tempfile::tempdir().unwrap();
    let local = Arc::new(LocalFileStorage::new(dir.path().join("files")));
    let db = DbManager::open(&dir.path().join("state.db")).unwrap();
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let remote = Arc::new(RemoteStorage::InMemory(InMemoryRemoteStorage::new()));
    let state = Arc::new(LocalFileStateManager::new(db.clone(), Arc::clone(&local)));
    let executor = Arc::new(SyncExecutor::new(
        config,
        Arc::clone(&remote),
        Arc::clone(&local),
        Arc::clone(&metadata),
        Arc::clone(&state),
        None,
    ));
    let storage = FileStorage::new(
        "test",
        Arc::clone(&local),
        Arc::clone(&metadata),
        db,
        Arc::clone(&executor),
    );
    let sync = Arc::new(FileSync::new(Arc::clone(&metadata), Arc::clone(&state), executor, is_leader));

    Harness {
        storage,
        sync,
        metadata,
        local,
        remote,
        state,
        _dir: dir,
    }
}

const HELLO_HASH: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

/// Scenario 1: local save -> remote upload.
#[tokio::test]
async fn local_save_then_remote_upload() {
    let h = build(true, ExecutorConfig::default());

    let saved = h
        .storage
        .save_file(&InputFile::from_bytes("h.txt", b"hello".to_vec()))
        .await
        .unwrap();

    assert_eq!(saved.content_hash, HELLO_HASH);
    assert_eq!(saved.path, format!("livestore-filesync-files/test/{HELLO_HASH}"));

    h.sync.reconcile_once().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let row = h.metadata.get(&saved.file_id).await.unwrap().unwrap();
    let remote_key = format!("test/{HELLO_HASH}");
    assert_eq!(row.remote_key.as_deref(), Some(remote_key.as_str()));
    assert!(in_memory_remote(&h.remote).contains(&remote_key));

    let state = h.state.get(&saved.file_id).unwrap().unwrap();
    assert_eq!(state.upload_status, TransferStatus::Done);
}

/// Scenario 2: a row seeded remotely (local empty) downloads the bytes.
#[tokio::test]
async fn remote_first_download() {
    let h = build(true, ExecutorConfig::default());
    let path = stored_path("test", "abc");
    let remote_key = "test/abc";

    in_memory_remote(&h.remote)
        .upload(
            &[1, 2, 3],
            remote_key,
            Default::default(),
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        .unwrap();

    h.metadata
        .commit_created(FileCreated {
            id: "A".into(),
            path: path.clone(),
            content_hash: "abc".into(),
            size: 3,
            mime_type: None,
            created_at: 1,
            updated_at: 1,
        })
        .await
        .unwrap();
    // The row arrives already carrying a remoteKey, as if replicated from the
    // client that performed the original upload.
    h.metadata
        .commit_updated(FileUpdated {
            id: "A".into(),
            path: path.clone(),
            remote_key: Some(remote_key.to_string()),
            content_hash: "abc".into(),
            size: Some(3),
            updated_at: 1,
        })
        .await
        .unwrap();

    h.sync.reconcile_once().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.local.read(&path).await.unwrap(), vec![1, 2, 3]);
    let state = h.state.get("A").unwrap().unwrap();
    assert_eq!(state.download_status, TransferStatus::Done);
}

/// Scenario 3: `updateFile` cleans up the old path unless still referenced.
#[tokio::test]
async fn update_cleans_old_path() {
    let h = build(true, ExecutorConfig::default());
    let a = h
        .storage
        .save_file(&InputFile::from_bytes("a.txt", b"a".to_vec()))
        .await
        .unwrap();
    let old_path = a.path.clone();

    let updated = h
        .storage
        .update_file(&a.file_id, &InputFile::from_bytes("a.txt", b"b".to_vec()))
        .await
        .unwrap();

    assert!(!h.local.exists(&old_path).await);
    assert!(h.local.exists(&updated.path).await);
    let row = h.metadata.get(&a.file_id).await.unwrap().unwrap();
    assert_eq!(
        row.content_hash,
        "3e23e8160039594a33894f6564e1b1348bbd7a0088d42c4acb73eeaed59c009d"
    );
}

/// Scenario 4: soft-deleting one of two fileIds sharing content preserves the path.
#[tokio::test]
async fn soft_delete_preserves_shared_content() {
    let h = build(true, ExecutorConfig::default());
    let a = h
        .storage
        .save_file(&InputFile::from_bytes("a.txt", b"x".to_vec()))
        .await
        .unwrap();
    let b = h
        .storage
        .save_file(&InputFile::from_bytes("b.txt", b"x".to_vec()))
        .await
        .unwrap();
    assert_eq!(a.path, b.path);

    h.storage.delete_file(&a.file_id).await.unwrap();

    assert!(h.local.exists(&a.path).await, "shared path must survive one deletion");
    let row_b = h.metadata.get(&b.file_id).await.unwrap().unwrap();
    assert!(!row_b.is_deleted());
}

/// Scenario 5: transient 5xx failures retry then succeed, clearing lastSyncError.
#[tokio::test]
async fn retry_then_succeed() {
    let h = build(
        true,
        ExecutorConfig {
            base_delay_ms: 5,
            max_delay_ms: 20,
            jitter_ms: 1,
            ..ExecutorConfig::default()
        },
    );
    let path = stored_path("test", "h1");
    let remote_key = "test/h1";
    in_memory_remote(&h.remote).fail_next_uploads(remote_key, 503, 2);

    h.local.write(&path, b"x").await.unwrap();
    h.metadata
        .commit_created(FileCreated {
            id: "f1".into(),
            path: path.clone(),
            content_hash: "h1".into(),
            size: 1,
            mime_type: None,
            created_at: 1,
            updated_at: 1,
        })
        .await
        .unwrap();

    h.sync.reconcile_once().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let row = h.metadata.get("f1").await.unwrap().unwrap();
    assert_eq!(row.remote_key.as_deref(), Some(remote_key));

    let state = h.state.get("f1").unwrap().unwrap();
    assert_eq!(state.upload_status, TransferStatus::Done);
    assert_eq!(state.last_sync_error, "");
}

/// Scenario 6: a non-retryable 403 surfaces as a terminal error after one attempt.
#[tokio::test]
async fn non_retryable_failure_is_terminal() {
    let h = build(true, ExecutorConfig::default());
    let path = stored_path("test", "h1");
    let remote_key = "test/h1";
    in_memory_remote(&h.remote).fail_next_uploads(remote_key, 403, 1);

    h.local.write(&path, b"x").await.unwrap();
    h.metadata
        .commit_created(FileCreated {
            id: "f1".into(),
            path: path.clone(),
            content_hash: "h1".into(),
            size: 1,
            mime_type: None,
            created_at: 1,
            updated_at: 1,
        })
        .await
        .unwrap();

    h.sync.reconcile_once().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = h.state.get("f1").unwrap().unwrap();
    assert_eq!(state.upload_status, TransferStatus::Error);
    assert!(!state.last_sync_error.is_empty());
    assert!(!in_memory_remote(&h.remote).contains(remote_key));
}
