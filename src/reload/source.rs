//! Where services configuration bytes come from.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url}: unexpected status {status}")]
    Status { url: String, status: u16 },

    #[error("unsupported config source scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid config source '{0}'")]
    InvalidLocator(String),
}

/// A byte-blob configuration source.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// Local path, if the source is a file that can be watched.
    fn local_path(&self) -> Option<PathBuf> {
        None
    }
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        tokio::fs::read(&self.path).await.map_err(|source| FetchError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn local_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}

pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Http {
                url: url.clone(),
                source,
            })?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl ConfigSource for HttpSource {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        let http_err = |source| FetchError::Http {
            url: self.url.clone(),
            source,
        };
        let resp = self.client.get(&self.url).send().await.map_err(http_err)?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(http_err)?;
        Ok(body.to_vec())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Picks a source for `locator`: a plain path, `file://`, or `http(s)://`.
///
/// `configmap://` is recognised but no cluster client is bundled.
pub fn source_from_locator(locator: &str, timeout: Duration) -> Result<Arc<dyn ConfigSource>, FetchError> {
    let Some((scheme, _)) = locator.split_once("://") else {
        return Ok(Arc::new(FileSource::new(locator)));
    };

    match scheme {
        "http" | "https" => Ok(Arc::new(HttpSource::new(locator, timeout)?)),
        "file" => {
            let path = Url::parse(locator)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| FetchError::InvalidLocator(locator.to_string()))?;
            Ok(Arc::new(FileSource::new(path)))
        }
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}
