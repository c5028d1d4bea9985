mod json_store;
mod memory_store;

use async_trait::async_trait;

use crate::model::{AlarmSet, Configuration};

pub use json_store::JsonFileStore;
pub use memory_store::InMemoryStore;

/// Load/save access to the full list of alarm-sets.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> anyhow::Result<Option<Vec<AlarmSet>>>;
    async fn save(&self, sets: &[AlarmSet]) -> anyhow::Result<()>;
}

/// Loads the stored configuration, never failing.
///
/// First start stores and returns the demo configuration. Unreadable or
/// malformed data yields an empty configuration. Stored sets that fail
/// validation are dropped.
pub async fn load_configuration(store: &dyn ConfigurationStore) -> Configuration {
    match store.load().await {
        Ok(Some(sets)) => {
            let valid: Vec<AlarmSet> = sets
                .into_iter()
                .filter_map(|mut set| match set.validate() {
                    Ok(()) => {
                        set.sort_events();
                        Some(set)
                    }
                    Err(error) => {
                        log::warn!("Dropping stored alarm-set {} ({:?}): {error}", set.id, set.name);
                        None
                    }
                })
                .collect();
            log::info!("Loaded {} alarm-set(s)", valid.len());
            Configuration::new(valid)
        }
        Ok(None) => {
            let demo = Configuration::demo();
            log::info!("No stored configuration, starting with the demo configuration");
            if let Err(error) = store.save(demo.sets()).await {
                log::error!("Could not store the demo configuration: {error:#}");
            }
            demo
        }
        Err(error) => {
            log::error!("Stored configuration is unusable, starting without alarms: {error:#}");
            Configuration::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use crate::model::{AlarmSetId, WeekdaySet};

    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl ConfigurationStore for BrokenStore {
        async fn load(&self) -> anyhow::Result<Option<Vec<AlarmSet>>> {
            Err(anyhow!("expected value at line 1 column 1"))
        }

        async fn save(&self, _sets: &[AlarmSet]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn first_start_stores_the_demo_configuration() {
        let store = InMemoryStore::new();

        let configuration = load_configuration(&store).await;

        assert_eq!(configuration.sets().len(), 1);
        assert_eq!(configuration.sets()[0].name, "Demo");
        assert_eq!(store.load().await.unwrap(), Some(configuration.into_sets()));
    }

    #[tokio::test]
    async fn malformed_data_yields_no_alarms() {
        let configuration = load_configuration(&BrokenStore).await;

        assert!(configuration.is_empty());
    }

    #[tokio::test]
    async fn invalid_sets_are_dropped() {
        let mut no_weekdays = AlarmSet::new(AlarmSetId(1), "Never");
        no_weekdays.weekdays = WeekdaySet::EMPTY;
        let valid = AlarmSet::new(AlarmSetId(2), "Work");
        let store = InMemoryStore::with_sets(vec![no_weekdays, valid.clone()]);

        let configuration = load_configuration(&store).await;

        assert_eq!(configuration.sets(), &[valid]);
    }
}
