use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::services::market_model::ModelSet;

#[derive(Default)]
struct Published {
    models: Option<Arc<ModelSet>>,
    generation: u64,
    published_at: Option<DateTime<Utc>>,
}

/// Holds the live model set. Readers clone an `Arc` and release the lock
/// immediately; re-training publishes a whole new set.
#[derive(Default)]
pub struct ModelRegistry {
    current: RwLock<Published>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(models: ModelSet) -> Self {
        let registry = Self::new();
        registry.publish(models);
        registry
    }

    /// The set in force right now. Stays valid for the caller even if a
    /// newer set is published meanwhile.
    pub fn snapshot(&self) -> Option<Arc<ModelSet>> {
        self.current.read().models.clone()
    }

    /// Swap in a new set and return its generation number
    pub fn publish(&self, models: ModelSet) -> u64 {
        let models = Arc::new(models);
        let mut current = self.current.write();
        current.models = Some(models);
        current.generation += 1;
        current.published_at = Some(Utc::now());
        tracing::info!("Published model set generation {}", current.generation);
        current.generation
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().published_at
    }
}
