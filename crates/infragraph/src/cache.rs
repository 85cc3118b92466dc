//! Found-state cache
//!
//! Per-run memoization of provider lookups. The first task asking for a
//! resource identity performs the lookup; every later query in the same run
//! reuses the result. Failed lookups are not cached, so a transient error
//! can be retried.

use crate::error::TaskError;
use crate::provider::{ActualState, CloudProvider};
use crate::task::ResourceId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Option<ActualState>>>;

pub struct FoundStateCache {
    provider: Option<Arc<dyn CloudProvider>>,
    entries: Mutex<HashMap<ResourceId, Slot>>,
    lookups: AtomicUsize,
}

impl FoundStateCache {
    pub fn new(provider: Option<Arc<dyn CloudProvider>>) -> Self {
        Self {
            provider,
            entries: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    pub async fn find(&self, id: &ResourceId) -> Result<Option<ActualState>, TaskError> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };

        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(id.clone()).or_default().clone()
        };

        if let Some(found) = slot.get() {
            tracing::debug!(resource = %id, "found-state cache hit");
            return Ok(found.clone());
        }

        let found = slot
            .get_or_try_init(|| async {
                self.lookups.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(resource = %id, provider = provider.name(), "looking up actual state");
                provider.find(id).await
            })
            .await?;
        Ok(found.clone())
    }

    /// Number of provider lookups performed so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}
