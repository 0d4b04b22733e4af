//! Locating and reading pipeline inputs.
//!
//! Each input comes from, in order: an explicit path or URL, the collector's
//! manifest in the raw directory, or the URL in the pipeline config.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::info;

use crate::config::SourceEntry;
use crate::reference::decode_html;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Path(PathBuf),
    Url(String),
}

impl Input {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            Input::Url(value.to_string())
        } else {
            Input::Path(PathBuf::from(value))
        }
    }
}

impl std::fmt::Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::Path(path) => write!(f, "{}", path.display()),
            Input::Url(url) => write!(f, "{}", url),
        }
    }
}

/// The subset of the collector manifest the parser reads
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    artifacts: HashMap<String, ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    storage_path: String,
    #[serde(default)]
    content_hash: String,
}

impl Manifest {
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }
}

/// A workbook on local disk. A downloaded one lives in a temporary file that
/// is removed when this value is dropped.
#[derive(Debug)]
pub enum LocalFile {
    Existing(PathBuf),
    Downloaded(NamedTempFile),
}

impl LocalFile {
    pub fn path(&self) -> &Path {
        match self {
            LocalFile::Existing(path) => path,
            LocalFile::Downloaded(file) => file.path(),
        }
    }
}

pub struct Resolver<'a> {
    client: &'a reqwest::Client,
    manifest: Manifest,
    sources: &'a [SourceEntry],
}

impl<'a> Resolver<'a> {
    pub fn new(client: &'a reqwest::Client, manifest: Manifest, sources: &'a [SourceEntry]) -> Self {
        Self {
            client,
            manifest,
            sources,
        }
    }

    /// Where to read `source_id` from
    pub fn resolve(&self, explicit: Option<&str>, source_id: &str) -> Result<Input> {
        if let Some(value) = explicit {
            return Ok(Input::parse(value));
        }

        if let Some(entry) = self.manifest.artifacts.get(source_id) {
            let path = PathBuf::from(&entry.storage_path);
            if path.exists() {
                info!(source = source_id, hash = %entry.content_hash, "using collected artifact");
                return Ok(Input::Path(path));
            }
        }

        let source = self
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .with_context(|| format!("No input given and no source '{}' configured", source_id))?;
        Ok(Input::Url(source.url.clone()))
    }

    fn format_of(&self, source_id: &str) -> &str {
        self.sources
            .iter()
            .find(|s| s.id == source_id)
            .map(|s| s.format.as_str())
            .unwrap_or("xlsx")
    }

    /// Make a workbook available on disk, downloading into a temporary file
    /// when the input is a URL. The file extension tells calamine the format.
    pub async fn local_file(&self, input: &Input, source_id: &str) -> Result<LocalFile> {
        match input {
            Input::Path(path) => {
                if !fs::try_exists(path).await.unwrap_or(false) {
                    anyhow::bail!("Input file not found: {}", path.display());
                }
                Ok(LocalFile::Existing(path.clone()))
            }
            Input::Url(url) => {
                let bytes = self.fetch(url).await?;
                let suffix = format!(".{}", self.format_of(source_id).trim_start_matches('.'));
                let mut file = tempfile::Builder::new()
                    .prefix("housing-")
                    .suffix(&suffix)
                    .tempfile()
                    .context("Failed to create temporary file")?;
                file.write_all(&bytes)?;
                file.flush()?;
                info!(path = %file.path().display(), size = bytes.len(), "downloaded to scratch file");
                Ok(LocalFile::Downloaded(file))
            }
        }
    }

    /// Read an HTML page from disk or the network
    pub async fn read_text(&self, input: &Input) -> Result<String> {
        let bytes = match input {
            Input::Path(path) => fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
            Input::Url(url) => self.fetch(url).await?,
        };
        Ok(decode_html(&bytes))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        info!(url = %url, "fetching");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .context("HTTP request failed")?;
        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }
}
