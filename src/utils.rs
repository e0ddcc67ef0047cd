use std::{
    env::current_dir,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use fake::{faker::internet::en::UserAgent, Fake};
use http_body_util::{BodyExt, Empty};
use hyper::{body::Bytes, Request};
use hyper_tls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time;

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// Builds the https-capable client used for all outgoing requests.
pub fn https_client() -> HttpsClient {
    Client::builder(TokioExecutor::new()).build::<_, Empty<Bytes>>(HttpsConnector::new())
}

/// Fetches a URL and returns the response body as text.
///
/// # Arguments
///
/// * `url`: The URL to request.
/// * `timeout`: Time before giving up on the whole transfer, body included.
///
/// # Returns
///
/// The body as a string, or an error for timeouts and non-success statuses.
pub async fn fetch_text(url: &str, timeout: Duration) -> anyhow::Result<String> {
    match time::timeout(timeout, request_text(url)).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("{}: request timed out after {:?}", url, timeout),
    }
}

async fn request_text(url: &str) -> anyhow::Result<String> {
    let client = https_client();
    let req = Request::get(url)
        .header(hyper::header::USER_AGENT, UserAgent().fake::<&str>())
        .body(Empty::<Bytes>::new())?;

    let response = client.request(req).await?;
    if !response.status().is_success() {
        anyhow::bail!("{}: request failed with status {}", url, response.status());
    }

    let body = response.collect().await?.to_bytes();
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Retrieves the data directory path for the application.
///
/// # Returns
///
/// A `PathBuf` representing the path to the data directory.
pub fn data_dir() -> anyhow::Result<PathBuf> {
    if let Some(base_dirs) = directories::BaseDirs::new() {
        let mut dir = base_dirs.data_dir().to_path_buf();
        dir.push(env!("CARGO_PKG_NAME"));

        if !dir.is_dir() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    } else {
        #[cfg(feature = "log")]
        log::warn!("Failed to get local data directory, using current directory instead");
        Ok(current_dir().unwrap_or_default())
    }
}

/// Seconds since the unix epoch, as the fractional timestamp stored in the
/// IP log.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Reads a JSON file, falling back to `T::default()` when the file does not
/// exist or does not parse. Only real I/O failures surface as errors.
pub async fn read_json_or_default<T>(path: &Path) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(error) => return Err(error.into()),
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(_error) => {
            #[cfg(feature = "log")]
            log::warn!(
                "{}: stored data is not valid JSON ({}), starting over",
                path.display(),
                _error
            );
            Ok(T::default())
        }
    }
}

/// Writes a value as pretty-printed JSON, creating parent directories as
/// needed.
pub async fn write_json<T>(path: &Path, value: &T) -> anyhow::Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let text = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    #[tokio::test]
    async fn stalled_body_still_hits_the_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = [0u8; 512];
            let _ = socket.read(&mut head).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 64\r\n\r\n")
                .await
                .unwrap();
            // Hold the connection open without ever sending the body.
            std::future::pending::<()>().await;
        });

        let error = fetch_text(&format!("http://{}/", address), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("timed out"));

        server.abort();
    }

    #[tokio::test]
    async fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let log: Vec<u32> = read_json_or_default(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let value: Option<String> = read_json_or_default(&path).await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");

        write_json(&path, &vec![1u32, 2, 3]).await.unwrap();
        let value: Vec<u32> = read_json_or_default(&path).await.unwrap();
        assert_eq!(value, vec![1, 2, 3]);
    }
}
