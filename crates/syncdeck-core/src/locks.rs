//! Per-session mutual exclusion for lifecycle operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async lock per session name.
///
/// Guards are owned, so they can be held across `.await` and are released
/// on drop even when the guarded operation errors or times out.
#[derive(Debug, Default, Clone)]
pub struct SessionLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, session_name: &str) -> Arc<AsyncMutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Drop entries nobody holds or waits on.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            map.entry(session_name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Wait for exclusive access to `session_name`.
    pub async fn acquire(&self, session_name: &str) -> OwnedMutexGuard<()> {
        self.lock_for(session_name).lock_owned().await
    }

    #[cfg(test)]
    fn try_acquire(&self, session_name: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(session_name).try_lock_owned().ok()
    }
}
