use std::sync::{Arc, Mutex, MutexGuard};

use prodgrid_schema::SchemaRegistry;
use prodgrid_store::Store;

/// Shared handler state. The store sits behind one mutex, which serializes
/// every upload, edit and rebuild; concurrent uploads for the same
/// (carrier, month, context) key therefore cannot interleave.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Store>>,
    pub registry: Arc<SchemaRegistry>,
}

impl AppState {
    pub fn new(store: Store, registry: SchemaRegistry) -> Self {
        Self { store: Arc::new(Mutex::new(store)), registry: Arc::new(registry) }
    }

    pub fn store(&self) -> MutexGuard<'_, Store> {
        // A poisoned lock means a handler panicked mid-operation; the store
        // itself stays consistent because every write is transactional.
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}
