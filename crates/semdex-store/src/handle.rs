//! Process-wide store handle: opened and initialized on first acquisition,
//! shared afterwards, torn down explicitly.

use semdex_core::config::StorageConfig;
use semdex_core::{Result, SemdexConfig, SemdexError, VectorIndexConfig};
use std::sync::{Arc, Mutex};

use crate::store::{ChunkStore, IndexStatus};

pub struct StoreHandle {
    storage: StorageConfig,
    config: VectorIndexConfig,
    store: Mutex<Option<Arc<ChunkStore>>>,
}

impl StoreHandle {
    pub fn new(storage: StorageConfig, config: VectorIndexConfig) -> Self {
        Self {
            storage,
            config,
            store: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SemdexConfig) -> Self {
        Self::new(config.storage.clone(), config.vector_index.clone())
    }

    /// The shared store, opening it and initializing the schema on first use.
    pub fn acquire(&self) -> Result<Arc<ChunkStore>> {
        let mut slot = self
            .store
            .lock()
            .map_err(|_| SemdexError::Storage("store handle lock poisoned".into()))?;
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = ChunkStore::open(&self.storage, self.config.clone())?;
        let report = store.initialize_schema()?;
        if let IndexStatus::Unavailable { reason } = &report.index {
            tracing::warn!("Chunk store running without ANN index: {reason}");
        }
        tracing::info!("Chunk store initialized with {} chunks", report.rows);

        let store = Arc::new(store);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    pub fn is_open(&self) -> bool {
        self.store.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Release the handle's reference. The connection closes once every
    /// outstanding `Arc` is dropped; the next `acquire` reopens.
    pub fn close(&self) -> bool {
        match self.store.lock() {
            Ok(mut slot) => slot.take().is_some(),
            Err(_) => false,
        }
    }
}
