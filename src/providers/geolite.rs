use std::{
    fs::{remove_file, OpenOptions},
    io::Write,
    net::IpAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

#[cfg(feature = "toolbar")]
use std::{
    fmt::{Display, Formatter},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
#[cfg(feature = "toolbar")]
use colored::Colorize;
use fake::{faker::internet::en::UserAgent, Fake};
use http_body_util::{BodyExt, Empty};
use hyper::{body::Bytes, Request};
use maxminddb::{geoip2::Country, Reader};
#[cfg(feature = "toolbar")]
use status_line::StatusLine;
use tokio::sync::OnceCell;
#[cfg(feature = "toolbar")]
use tokio::time;

use super::CountryCodeTrait;
use crate::utils;

const GEOLITE_ENDPOINT_URL: &str =
    "https://raw.githubusercontent.com/P3TERX/GeoLite.mmdb/download/GeoLite2-Country.mmdb";
const DATABASE_FILE: &str = "GeoLite2-Country.mmdb";

#[cfg(feature = "toolbar")]
/// Struct to manage and display progress for downloading the GeoLite2 database.
struct Progress {
    progress: AtomicUsize, // Tracks the current progress.
    max: f64,              // Maximum size of the download.
    timer: time::Instant,  // Timer to measure download duration.
}

#[cfg(feature = "toolbar")]
impl Display for Progress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} Downloading GeoLite2-Country.mmdb: {:.2}%",
            format!("{}:", module_path!()).bright_blue(),
            "INFO".bright_blue(),
            (self.progress.load(Ordering::Relaxed) as f64 / self.max) * 100.0
        )
    }
}

#[cfg(all(feature = "toolbar", feature = "log"))]
impl Drop for Progress {
    fn drop(&mut self) {
        log::debug!(
            "Finished downloading GeoLite2-Country.mmdb in {:?}",
            self.timer.elapsed()
        );
    }
}

/// Downloads the GeoLite2 country database to `mmdb_path`.
pub async fn download_database(mmdb_path: &Path) -> anyhow::Result<()> {
    let client = utils::https_client();

    let req = Request::builder()
        .uri(GEOLITE_ENDPOINT_URL)
        .header(hyper::header::USER_AGENT, UserAgent().fake::<&str>())
        .body(Empty::<Bytes>::new())?;

    let mut response = client.request(req).await?;

    #[cfg(feature = "toolbar")]
    let max_size = if let Some(length) = response.headers().get(hyper::header::CONTENT_LENGTH) {
        length.to_str().map(|v| v.parse::<f64>().unwrap_or(0.0))?
    } else {
        0.0
    };

    #[cfg(feature = "toolbar")]
    let status = StatusLine::new(Progress {
        progress: AtomicUsize::new(0),
        timer: time::Instant::now(),
        max: max_size,
    });

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(mmdb_path)?;

    while let Some(next) = response.frame().await {
        let frame = next?;
        if let Some(chunk) = frame.data_ref() {
            #[cfg(feature = "toolbar")]
            status.progress.fetch_add(chunk.len(), Ordering::Relaxed);
            file.write_all(chunk)?;
        }
    }
    Ok(())
}

/// Country lookups against a local GeoLite2 database.
///
/// The database is fetched on first use and the reader then lives for the
/// rest of the process. Lookups afterwards touch no network, so the cooldown
/// is zero.
pub struct GeoLiteProvider {
    database_dir: Option<PathBuf>, // Overrides the platform data dir.
    reader: OnceCell<Reader<Vec<u8>>>,
}

impl GeoLiteProvider {
    pub fn new() -> Self {
        Self {
            database_dir: None,
            reader: OnceCell::new(),
        }
    }

    /// Keeps the database under `dir` instead of the platform data dir.
    pub fn with_database_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            database_dir: Some(dir.into()),
            reader: OnceCell::new(),
        }
    }

    fn database_path(&self) -> anyhow::Result<PathBuf> {
        let dir = match &self.database_dir {
            Some(dir) => dir.clone(),
            None => utils::data_dir()?,
        };
        Ok(dir.join(DATABASE_FILE))
    }

    async fn open_reader(&self) -> anyhow::Result<&Reader<Vec<u8>>> {
        self.reader
            .get_or_try_init(|| async {
                let mmdb_path = self.database_path()?;
                if !mmdb_path.exists() {
                    #[cfg(feature = "log")]
                    log::debug!("{} does not exist, downloading", DATABASE_FILE);
                    download_database(&mmdb_path).await?;
                }

                match Reader::open_readfile(&mmdb_path) {
                    Ok(reader) => Ok(reader),
                    Err(e) => {
                        remove_file(mmdb_path)?;
                        anyhow::bail!(e);
                    }
                }
            })
            .await
    }
}

impl Default for GeoLiteProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CountryCodeTrait for GeoLiteProvider {
    fn name(&self) -> &'static str {
        "geolite2"
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(0)
    }

    async fn fetch(&self, ip: &str) -> anyhow::Result<String> {
        let address = IpAddr::from_str(ip)?;
        let reader = self.open_reader().await?;

        let lookup = reader.lookup::<Country>(address)?;
        lookup
            .country
            .as_ref()
            .and_then(|country| country.iso_code)
            .or_else(|| {
                lookup
                    .continent
                    .as_ref()
                    .and_then(|continent| continent.code)
            })
            .map(ToString::to_string)
            .ok_or_else(|| anyhow::anyhow!("no country recorded for {}", ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_ip_fails_before_touching_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let provider = GeoLiteProvider::with_database_dir(dir.path());

        assert!(provider.fetch("not-an-ip").await.is_err());
        assert!(!dir.path().join(DATABASE_FILE).exists());
    }

    #[tokio::test]
    async fn corrupt_database_is_removed_for_the_next_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mmdb_path = dir.path().join(DATABASE_FILE);
        std::fs::write(&mmdb_path, "definitely not a database").unwrap();

        let provider = GeoLiteProvider::with_database_dir(dir.path());
        assert!(provider.fetch("203.0.113.7").await.is_err());
        assert!(!mmdb_path.exists());
    }
}
