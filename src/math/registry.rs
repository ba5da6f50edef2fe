//! Persistent math model registry keyed by model id.

use super::{Integrity, MathModel};
use crate::errors::{RgsResult, StorageError};
use crate::storage::{KvStore, StorageBatch};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

const MODEL_PREFIX: &str = "math:model:";

fn model_key(model_id: &str) -> Vec<u8> {
    format!("{}{}", MODEL_PREFIX, model_id).into_bytes()
}

/// Registry of math models, loaded from storage on open.
///
/// The write lock is held across the durable write so readers never see a
/// model that is not yet persisted, and never see a partially replaced one.
pub struct MathModelRegistry {
    storage: Arc<dyn KvStore>,
    models: RwLock<HashMap<String, Arc<MathModel>>>,
}

impl MathModelRegistry {
    pub fn open(storage: Arc<dyn KvStore>) -> RgsResult<Self> {
        let rows = storage.scan_prefix(MODEL_PREFIX.as_bytes(), usize::MAX)?;
        let mut models = HashMap::with_capacity(rows.len());
        for (key, value) in rows {
            match serde_json::from_slice::<MathModel>(&value) {
                Ok(model) if !model.model_id.is_empty() => {
                    models.insert(model.model_id.clone(), Arc::new(model));
                }
                Ok(_) => {}
                Err(e) => {
                    // One bad record must not take the other games down
                    tracing::warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "skipping undecodable math model"
                    );
                }
            }
        }
        tracing::info!(count = models.len(), "loaded math models");

        Ok(Self {
            storage,
            models: RwLock::new(models),
        })
    }

    /// Store `model` under its id, replacing any previous table.
    ///
    /// An empty model id is accepted and ignored.
    pub fn register(&self, mut model: MathModel) -> RgsResult<()> {
        if model.model_id.is_empty() {
            return Ok(());
        }

        let content_hash = model.content_hash();
        if model.integrity.is_none() {
            model.integrity = Some(Integrity {
                content_hash: content_hash.clone(),
            });
        }

        let bytes = serde_json::to_vec(&model).map_err(|e| {
            StorageError::WriteFailed(format!("Failed to encode math model {}: {}", model.model_id, e))
        })?;

        let mut models = self
            .models
            .write()
            .map_err(|_| StorageError::WriteFailed("math registry lock poisoned".to_string()))?;

        let mut batch = StorageBatch::new();
        batch.put(model_key(&model.model_id), bytes);
        self.storage.write(batch)?;

        tracing::info!(
            model_id = %model.model_id,
            model_version = %model.model_version,
            tiers = model.prize_table.len(),
            content_hash = %content_hash,
            replaced = models.contains_key(&model.model_id),
            "registered math model"
        );
        models.insert(model.model_id.clone(), Arc::new(model));
        Ok(())
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<MathModel>> {
        self.read_models().get(model_id).cloned()
    }

    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_models().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Writers only insert whole models, so a poisoned map is still consistent
    fn read_models(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<MathModel>>> {
        self.models.read().unwrap_or_else(|e| {
            tracing::error!("math registry lock poisoned, serving last committed models");
            PoisonError::into_inner(e)
        })
    }
}
