pub mod executor;
pub mod file_sync;

pub use executor::{SyncExecutor, SyncProgressSink, TransferProgress};
pub use file_sync::FileSync;
