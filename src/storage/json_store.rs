use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::fs;

use crate::model::AlarmSet;

use super::ConfigurationStore;

/// Keeps the configuration as one pretty-printed JSON document.
///
/// Saves go to a sibling temporary file which is then renamed over the
/// document, so a crash mid-write leaves the previous version intact.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigurationStore for JsonFileStore {
    async fn load(&self) -> anyhow::Result<Option<Vec<AlarmSet>>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| format!("Could not read {}", self.path.display()));
            }
        };

        let sets = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed configuration in {}", self.path.display()))?;
        Ok(Some(sets))
    }

    async fn save(&self, sets: &[AlarmSet]) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(sets)?;
        let temp_path = self.temp_path();

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&temp_path, json)
            .await
            .with_context(|| format!("Could not write {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("Could not replace {}", self.path.display()))?;

        log::debug!("Saved {} alarm-set(s) to {}", sets.len(), self.path.display());
        Ok(())
    }
}
