use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::utils;

pub const SYNC_SETTINGS_FILE: &str = "sync-settings.json";
pub const LOCAL_SETTINGS_FILE: &str = "local-settings.json";

/// One storage area for raw settings fields.
///
/// Areas hold untyped JSON maps; everything read from an area goes through a
/// sanitizer before use, so an area never has to guarantee well-formed
/// content.
#[async_trait]
pub trait SettingsArea: Send + Sync {
    /// Reads all stored fields. A missing or unreadable backing store yields
    /// an empty map, never an error.
    async fn read(&self) -> anyhow::Result<Map<String, Value>>;

    /// Replaces the stored fields wholesale.
    async fn write(&self, fields: &Map<String, Value>) -> anyhow::Result<()>;
}

/// Settings area backed by a single JSON file.
pub struct FileArea {
    path: PathBuf,
}

impl FileArea {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsArea for FileArea {
    async fn read(&self) -> anyhow::Result<Map<String, Value>> {
        utils::read_json_or_default(&self.path).await
    }

    async fn write(&self, fields: &Map<String, Value>) -> anyhow::Result<()> {
        utils::write_json(&self.path, fields).await
    }
}
