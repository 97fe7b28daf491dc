//! Configuration sources: where a definition document's text comes from.
//!
//! Sources are not cached; every [`ConfigSource::open`] re-reads the resource.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use harvest_shared::{HarvestError, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Timeout for fetching a remote definition document.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for document requests.
const USER_AGENT: &str = concat!("Harvest/", env!("CARGO_PKG_VERSION"));

/// A uniform way to read a definition document.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Open a reader over the raw document bytes.
    async fn open(&self) -> Result<Box<dyn Read + Send>>;

    /// Stable description of the source (path or URL), used in diagnostics.
    fn identity(&self) -> String;
}

/// Pick a source for a location string: `http://`/`https://` means URL,
/// anything else is a file path.
pub fn source_for(location: &str) -> Result<Box<dyn ConfigSource>> {
    let lowercase = location.trim().to_ascii_lowercase();
    if lowercase.starts_with("http://") || lowercase.starts_with("https://") {
        Ok(Box::new(UrlConfigSource::parse(location.trim())?))
    } else {
        Ok(Box::new(FileConfigSource::new(location)))
    }
}

/// Open `source` and read the whole document as UTF-8 text.
pub async fn read_document(source: &dyn ConfigSource) -> Result<String> {
    let mut reader = source.open().await?;
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| HarvestError::io(source.identity(), e))?;
    Ok(text)
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// Document stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn open(&self) -> Result<Box<dyn Read + Send>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| HarvestError::io(self.identity(), e))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn identity(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// URL
// ---------------------------------------------------------------------------

/// Document served over HTTP(S). Failures surface immediately; no retry.
#[derive(Debug, Clone)]
pub struct UrlConfigSource {
    url: Url,
    timeout: Duration,
}

impl UrlConfigSource {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Parse `location` as a URL.
    pub fn parse(location: &str) -> Result<Self> {
        let url = Url::parse(location).map_err(|e| {
            HarvestError::configuration(format!("invalid configuration URL {location}: {e}"))
        })?;
        Ok(Self::new(url))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConfigSource for UrlConfigSource {
    async fn open(&self) -> Result<Box<dyn Read + Send>> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))?;

        debug!(url = %self.url, "fetching definition document");

        let response = client
            .get(self.url.as_str())
            .send()
            .await
            .map_err(|e| HarvestError::Network(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Network(format!("{}: HTTP {status}", self.url)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HarvestError::Network(format!("{}: body read failed: {e}", self.url)))?;

        Ok(Box::new(Cursor::new(body.to_vec())))
    }

    fn identity(&self) -> String {
        self.url.to_string()
    }
}

// ---------------------------------------------------------------------------
// String
// ---------------------------------------------------------------------------

/// Document held in memory.
#[derive(Debug, Clone)]
pub struct StringConfigSource {
    name: String,
    content: String,
}

impl StringConfigSource {
    pub fn new(content: impl Into<String>) -> Self {
        Self::named("<string>", content)
    }

    /// In-memory document reported under `name` in diagnostics.
    pub fn named(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[async_trait]
impl ConfigSource for StringConfigSource {
    async fn open(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.content.clone().into_bytes())))
    }

    fn identity(&self) -> String {
        self.name.clone()
    }
}
