//! Reactive bridge between an event-sourced metadata store and two
//! byte-stores: a content-addressed local pool and a remote object store.
//!
//! A host application hands this crate a [`MetadataStore`](metadata::MetadataStore)
//! implementation (or uses the bundled [`InMemoryMetadataStore`](metadata::InMemoryMetadataStore)
//! reference one) and wires the pieces together roughly as:
//!
//! ```ignore
//! let local = Arc::new(LocalFileStorage::new(base_dir));
//! let metadata = Arc::new(InMemoryMetadataStore::new());
//! let remote = Arc::new(RemoteStorage::InMemory(InMemoryRemoteStorage::new()));
//! let db = DbManager::open(&db_path)?;
//! let state = Arc::new(LocalFileStateManager::new(db.clone(), Arc::clone(&local)));
//! let executor = Arc::new(SyncExecutor::new(ExecutorConfig::default(), remote, Arc::clone(&local), Arc::clone(&metadata), Arc::clone(&state), None));
//! let storage = FileStorage::new("my-store", Arc::clone(&local), Arc::clone(&metadata), db, Arc::clone(&executor));
//! let sync = Arc::new(FileSync::new(metadata, state, executor, /* is_leader */ true));
//! sync.start();
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod file_storage;
pub mod hash;
pub mod input_file;
pub mod local_storage;
pub mod metadata;
pub mod read_path;
pub mod remote;
pub mod state;
pub mod sync;

pub use config::ExecutorConfig;
pub use db::DbManager;
pub use error::{FileSyncError, Result};
pub use file_storage::{FileStorage, SavedFile, UpdatedFile};
pub use input_file::InputFile;
pub use local_storage::LocalFileStorage;
pub use metadata::{FileCreated, FileDeleted, FileEvent, FileRow, FileUpdated, MetadataStore};
pub use read_path::{ReadPath, ReadPathConfig, ReadResponse};
pub use remote::{InMemoryRemoteStorage, RemoteStorage, SignerClientRemoteStorage};
pub use state::{LocalFileStateManager, TransferKind};
pub use sync::{FileSync, SyncExecutor};
