//! Keyed mutual exclusion.
//!
//! One async mutex per entity id: settlements of the same fixture serialize,
//! rank recomputes of the same pool serialize, while unrelated ids proceed
//! in parallel. Guards are owned, so they can be held across await points.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct EntityLocks {
    // Cells are never reclaimed; the id universe is fixtures and pools,
    // which stays small.
    cells: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `id`, waiting until any current holder releases it.
    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let cell = {
            let mut cells = self.cells.lock();
            cells
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        cell.lock_owned().await
    }
}
