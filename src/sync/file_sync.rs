//! `FileSync` (spec §2 item 8): the lifecycle owner. Subscribes to the
//! metadata store's change feed, reconciles `LocalFileState` against it, and
//! dispatches newly-pending transfers to the `SyncExecutor`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::local_storage::remote_key_for;
use crate::metadata::MetadataStore;
use crate::state::{LocalFileStateManager, TransferKind};
use crate::sync::executor::SyncExecutor;

pub struct FileSync<M: MetadataStore> {
    metadata: Arc<M>,
    state: Arc<LocalFileStateManager>,
    executor: Arc<SyncExecutor<M>>,
    is_leader: AtomicBool,
    watch_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<M: MetadataStore> FileSync<M> {
    pub fn new(metadata: Arc<M>, state: Arc<LocalFileStateManager>, executor: Arc<SyncExecutor<M>>, is_leader: bool) -> Self {
        Self {
            metadata,
            state,
            executor,
            is_leader: AtomicBool::new(is_leader),
            watch_task: Mutex::new(None),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Leadership is consumed from the metadata store's client-session lock
    /// status on platforms that have one; single-client hosts stay leader
    /// always (spec §4.3, §9).
    pub fn set_leader(&self, leader: bool) {
        self.is_leader.store(leader, Ordering::SeqCst);
    }

    /// One reconciliation pass: re-derive status for the current table
    /// snapshot and submit any newly-pending transfer to the executor.
    pub async fn reconcile_once(&self) -> Result<()> {
        let rows = self.metadata.list().await?;
        let pending = self.state.reconcile(&rows, self.is_leader()).await?;

        for job in pending {
            let Some(row) = rows.iter().find(|r| r.id == job.file_id) else {
                continue;
            };

            match job.kind {
                TransferKind::Upload => {
                    if let Some(remote_key) = remote_key_for(&row.path) {
                        self.executor
                            .submit_upload(row.id.clone(), row.path.clone(), remote_key.to_string());
                    }
                }
                TransferKind::Download => {
                    if let Some(remote_key) = row.remote_key.clone() {
                        self.executor.submit_download(row.id.clone(), row.path.clone(), remote_key);
                    }
                }
            }
        }

        Ok(())
    }

    /// Subscribe to the metadata store's change feed and reconcile on every
    /// change, until [`dispose`](Self::dispose) is called (spec §9: subscribe
    /// -> diff -> submit, in place of the source's reactive effect runtime).
    pub fn start(self: &Arc<Self>) {
        let mut rx = self.metadata.subscribe();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if this.reconcile_once().await.is_err() {
                    // Transient errors (e.g. a metadata commit race) are retried
                    // on the next change notification; nothing to propagate here.
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        *self.watch_task.lock().unwrap() = Some(handle);
    }

    /// Cancel all in-flight transfers, stop reconciling, and release
    /// leadership. Never fails; in-flight failures after dispose are
    /// swallowed (spec §7).
    pub fn dispose(&self) {
        if let Some(handle) = self.watch_task.lock().unwrap().take() {
            handle.abort();
        }
        self.executor.cancel_all();
        self.set_leader(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::db::DbManager;
    use crate::local_storage::{stored_path, LocalFileStorage};
    use crate::metadata::in_memory::InMemoryMetadataStore;
    use crate::metadata::FileCreated;
    use crate::remote::{InMemoryRemoteStorage, RemoteStorage};
    use std::time::Duration;

    fn executor(dir: &std::path::Path) -> (Arc<SyncExecutor<InMemoryMetadataStore>>, Arc<InMemoryMetadataStore>, Arc<LocalFileStorage>) {
        let db = DbManager::open(&dir.join("state.db")).unwrap();
        let local = Arc::new(LocalFileStorage::new(dir.join("files")));
        let state = Arc::new(LocalFileStateManager::new(db, Arc::clone(&local)));
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let remote = Arc::new(RemoteStorage::InMemory(InMemoryRemoteStorage::new()));
        let executor = Arc::new(SyncExecutor::new(
            ExecutorConfig::default(),
            remote,
            Arc::clone(&local),
            Arc::clone(&metadata),
            state,
            None,
        ));
        (executor, metadata, local)
    }

    #[tokio::test]
    async fn leader_reconcile_enqueues_and_completes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, metadata, local) = executor(dir.path());

        let path = stored_path("acct", "h1");
        local.write(&path, b"hello").await.unwrap();
        metadata
            .commit_created(FileCreated {
                id: "f1".into(),
                path: path.clone(),
                content_hash: "h1".into(),
                size: 5,
                mime_type: None,
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();

        let sync = Arc::new(FileSync::new(
            Arc::clone(&metadata),
            Arc::new(LocalFileStateManager::new(
                DbManager::open(&dir.path().join("state2.db")).unwrap(),
                Arc::clone(&local),
            )),
            Arc::clone(&executor),
            true,
        ));
        sync.reconcile_once().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let row = metadata.get("f1").await.unwrap().unwrap();
        assert_eq!(row.remote_key.as_deref(), Some("acct/h1"));
    }

    #[tokio::test]
    async fn dispose_cancels_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, metadata, local) = executor(dir.path());
        let sync = Arc::new(FileSync::new(
            Arc::clone(&metadata),
            Arc::new(LocalFileStateManager::new(
                DbManager::open(&dir.path().join("state2.db")).unwrap(),
                local,
            )),
            executor,
            true,
        ));
        sync.start();
        sync.dispose();
        assert!(!sync.is_leader());
    }
}
