//! Advisory per-document locks
//!
//! One async mutex per `(project_id, file_path)`. Entries nobody holds or
//! waits on are pruned whenever a new lock is handed out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Key = (String, String);

#[derive(Default)]
pub(crate) struct DocumentLocks {
    table: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl DocumentLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one document path
    pub(crate) async fn acquire(&self, project_id: &str, file_path: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            table
                .entry((project_id.to_string(), file_path.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of paths currently tracked
    pub(crate) fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
