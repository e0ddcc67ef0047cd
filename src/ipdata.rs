use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils;

/// One observation of the public network identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpCountryData {
    pub ip: String,
    /// Name of the service that echoed the IP.
    pub ip_service: String,
    pub country: Option<String>,
    /// Name of the service that resolved the country, when one ran.
    pub country_service: Option<String>,
}

/// A logged observation and when it was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seen_on: f64, // Unix seconds.
    pub data: IpCountryData,
}

impl LogEntry {
    pub fn now(data: IpCountryData) -> Self {
        Self {
            seen_on: utils::unix_now(),
            data,
        }
    }
}

/// Storage for the last known observation and the change log.
#[async_trait]
pub trait IpDataStore: Send + Sync {
    /// The observation the previous cycle persisted, if any survives.
    async fn load_last(&self) -> anyhow::Result<Option<IpCountryData>>;

    /// Replaces the last known observation.
    async fn save_as_last(&self, data: &IpCountryData) -> anyhow::Result<()>;

    async fn load_log(&self) -> anyhow::Result<Vec<LogEntry>>;

    /// Appends `entry` to `log`, drops entries older than `retention`, and
    /// persists the result.
    async fn record(
        &self,
        log: Vec<LogEntry>,
        entry: LogEntry,
        retention: Duration,
    ) -> anyhow::Result<()>;
}

/// File-backed store under the data directory.
pub struct FileIpDataStore {
    last_path: PathBuf,
    log_path: PathBuf,
}

impl FileIpDataStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            last_path: data_dir.join("last-known.json"),
            log_path: data_dir.join("ip-log.json"),
        }
    }
}

#[async_trait]
impl IpDataStore for FileIpDataStore {
    async fn load_last(&self) -> anyhow::Result<Option<IpCountryData>> {
        utils::read_json_or_default(&self.last_path).await
    }

    async fn save_as_last(&self, data: &IpCountryData) -> anyhow::Result<()> {
        utils::write_json(&self.last_path, data).await
    }

    async fn load_log(&self) -> anyhow::Result<Vec<LogEntry>> {
        utils::read_json_or_default(&self.log_path).await
    }

    async fn record(
        &self,
        mut log: Vec<LogEntry>,
        entry: LogEntry,
        retention: Duration,
    ) -> anyhow::Result<()> {
        log.push(entry);

        let cutoff = utils::unix_now() - retention.as_secs_f64();
        log.retain(|kept| kept.seen_on >= cutoff);

        utils::write_json(&self.log_path, &log).await
    }
}
