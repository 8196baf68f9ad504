use std::sync::Arc;

use plant_storage::local::LocalObjectStore;
use plant_storage::{DocumentStore, ObjectStore};

pub type AppState = Arc<AppStateInner>;

/// Shared application state for all route handlers.
pub struct AppStateInner {
    pub objects: Arc<dyn ObjectStore>,
    pub documents: Arc<dyn DocumentStore>,
    /// Set when objects live on local disk; the service then serves
    /// retrieval URLs itself.
    pub local_objects: Option<Arc<LocalObjectStore>>,
}

impl AppStateInner {
    pub fn new(objects: Arc<dyn ObjectStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            objects,
            documents,
            local_objects: None,
        }
    }

    /// State over a local object directory.
    pub fn with_local_objects(local: Arc<LocalObjectStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            objects: local.clone(),
            documents,
            local_objects: Some(local),
        }
    }
}
