//! Reference [`MetadataStore`](super::MetadataStore) implementation: a single
//! process's view of the `files` table, held in memory. Sufficient for tests
//! and for embedding this crate in a host that has not yet wired up its own
//! replicated store.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;

use super::{FileCreated, FileDeleted, FileRow, FileUpdated, MetadataStore};
use crate::error::Result;

pub struct InMemoryMetadataStore {
    rows: Mutex<HashMap<String, FileRow>>,
    tx: watch::Sender<Vec<FileRow>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            rows: Mutex::new(HashMap::new()),
            tx,
        }
    }

    fn publish(&self, rows: &HashMap<String, FileRow>) {
        let mut snapshot: Vec<FileRow> = rows.values().cloned().collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        // No active subscriber is not an error; the table still updated.
        let _ = self.tx.send(snapshot);
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    async fn commit_created(&self, event: FileCreated) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.insert(
            event.id.clone(),
            FileRow {
                id: event.id,
                path: event.path,
                remote_key: None,
                content_hash: event.content_hash,
                size: event.size,
                mime_type: event.mime_type,
                created_at: event.created_at,
                updated_at: event.updated_at,
                deleted_at: None,
            },
        );
        self.publish(&rows);
        Ok(())
    }

    async fn commit_updated(&self, event: FileUpdated) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&event.id) {
            row.path = event.path;
            row.remote_key = event.remote_key;
            row.content_hash = event.content_hash;
            if let Some(size) = event.size {
                row.size = size;
            }
            row.updated_at = event.updated_at;
        }
        self.publish(&rows);
        Ok(())
    }

    async fn commit_deleted(&self, event: FileDeleted) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&event.id) {
            row.deleted_at = Some(event.deleted_at);
        }
        self.publish(&rows);
        Ok(())
    }

    async fn get(&self, file_id: &str) -> Result<Option<FileRow>> {
        Ok(self.rows.lock().unwrap().get(file_id).cloned())
    }

    async fn list(&self) -> Result<Vec<FileRow>> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    fn subscribe(&self) -> watch::Receiver<Vec<FileRow>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_row_is_visible_and_not_deleted() {
        let store = InMemoryMetadataStore::new();
        store
            .commit_created(FileCreated {
                id: "f1".into(),
                path: "livestore-filesync-files/acct/h1".into(),
                content_hash: "h1".into(),
                size: 5,
                mime_type: None,
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();

        let row = store.get("f1").await.unwrap().unwrap();
        assert!(!row.is_deleted());
        assert_eq!(row.content_hash, "h1");
    }

    #[tokio::test]
    async fn update_then_delete() {
        let store = InMemoryMetadataStore::new();
        store
            .commit_created(FileCreated {
                id: "f1".into(),
                path: "livestore-filesync-files/acct/h1".into(),
                content_hash: "h1".into(),
                size: 5,
                mime_type: None,
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();
        store
            .commit_updated(FileUpdated {
                id: "f1".into(),
                path: "livestore-filesync-files/acct/h2".into(),
                remote_key: Some("acct/h2".into()),
                content_hash: "h2".into(),
                size: Some(6),
                updated_at: 2,
            })
            .await
            .unwrap();

        let row = store.get("f1").await.unwrap().unwrap();
        assert_eq!(row.content_hash, "h2");
        assert_eq!(row.remote_key.as_deref(), Some("acct/h2"));

        store
            .commit_deleted(FileDeleted {
                id: "f1".into(),
                deleted_at: 3,
            })
            .await
            .unwrap();
        let row = store.get("f1").await.unwrap().unwrap();
        assert!(row.is_deleted());
    }

    #[tokio::test]
    async fn subscribe_fires_on_change() {
        let store = InMemoryMetadataStore::new();
        let mut rx = store.subscribe();
        store
            .commit_created(FileCreated {
                id: "f1".into(),
                path: "p".into(),
                content_hash: "h".into(),
                size: 0,
                mime_type: None,
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
