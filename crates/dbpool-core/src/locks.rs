//! Resource Lock Registry: one mutual-exclusion lock per database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::domain::ResourceId;

/// Exactly one lock object per resource for the registry's lifetime.
///
/// The outer map is guarded by a synchronous mutex so `get_or_create` is
/// race-free: two workers touching a new resource at the same moment get the
/// same `Arc`, never two distinct locks. The per-resource lock itself is an
/// async mutex because workers hold it across the adapter await.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    inner: StdMutex<HashMap<ResourceId, Arc<AsyncMutex<()>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with the resources known at startup.
    pub fn seeded(resources: &[ResourceId]) -> Self {
        let map = resources
            .iter()
            .map(|r| (r.clone(), Arc::new(AsyncMutex::new(()))))
            .collect();
        Self {
            inner: StdMutex::new(map),
        }
    }

    /// The lock for `resource`, inserting one atomically if absent.
    pub fn get_or_create(&self, resource: &ResourceId) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(resource.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
