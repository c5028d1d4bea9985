use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::AlarmSet;

use super::ConfigurationStore;

pub struct InMemoryStore {
    store: RwLock<Option<Vec<AlarmSet>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            store: RwLock::new(None),
        }
    }

    pub fn with_sets(sets: Vec<AlarmSet>) -> Self {
        InMemoryStore {
            store: RwLock::new(Some(sets)),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigurationStore for InMemoryStore {
    async fn load(&self) -> anyhow::Result<Option<Vec<AlarmSet>>> {
        let store = self.store.read().await;
        Ok(store.clone())
    }

    async fn save(&self, sets: &[AlarmSet]) -> anyhow::Result<()> {
        let mut store = self.store.write().await;
        *store = Some(sets.to_vec());
        log::debug!("Stored {} alarm-set(s) in memory", sets.len());
        Ok(())
    }
}
