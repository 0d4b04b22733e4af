//! Collector - Downloads and archives the raw pipeline inputs
//!
//! Responsibilities:
//! - Fetch the housing-price workbook and the two commune reference pages
//! - Apply rate limiting between requests
//! - Hash every download and skip rewriting unchanged content
//! - Store raw files and a manifest in the raw directory
//!
//! The parser reads the manifest when no explicit input is given, so a run of
//! the collector makes the rest of the pipeline work offline.
//!
//! Usage:
//!   cargo run --bin collector
//!   cargo run --bin collector -- --config config/pipeline.json --source-id current-communes

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Downloads raw inputs of the housing-price pipeline")]
struct Args {
    /// Path to the pipeline config file (built-in sources when omitted)
    #[arg(long)]
    config: Option<String>,

    /// Only collect this source id
    #[arg(long)]
    source_id: Option<String>,

    /// Rewrite the stored file even if the content hash is unchanged
    #[arg(long, default_value = "false")]
    force: bool,

    /// Dry run - fetch and hash, but don't write anything
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Also collect sources marked as disabled
    #[arg(long, default_value = "false")]
    include_disabled: bool,
}

// =============================================================================
// Source Configuration Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SourcesConfig {
    #[serde(default)]
    version: String,
    #[serde(default = "default_sources")]
    sources: Vec<Source>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            version: "builtin".to_string(),
            sources: default_sources(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Source {
    id: String,
    name: String,
    #[serde(default)]
    provider: String,
    format: String,
    url: String,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<Source> {
    let source = |id: &str, name: &str, provider: &str, format: &str, url: &str| Source {
        id: id.to_string(),
        name: name.to_string(),
        provider: provider.to_string(),
        format: format.to_string(),
        url: url.to_string(),
        enabled: true,
    };
    vec![
        source(
            "housing-prices",
            "Prix annoncés des maisons (vente), 2010-2021",
            "Observatoire de l'Habitat",
            "xlsx",
            "https://is.gd/1vvBAc",
        ),
        source(
            "current-communes",
            "List of communes of Luxembourg",
            "Wikipedia mirror",
            "html",
            "https://b-rodrigues.github.io/list_communes/",
        ),
        source(
            "former-communes",
            "Former communes of Luxembourg",
            "Wikipedia mirror",
            "html",
            "https://b-rodrigues.github.io/former_communes/",
        ),
    ]
}

/// One archived download, as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArtifactMeta {
    source_id: String,
    url: String,
    captured_at: DateTime<Utc>,
    content_hash: String,
    mime_type: String,
    size_bytes: u64,
    storage_path: String,
}

/// Index of archived downloads, keyed by source id
#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    artifacts: BTreeMap<String, ArtifactMeta>,
}

impl Manifest {
    async fn load(dir: &Path) -> Result<Self> {
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

    async fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Config {
    raw_fs_dir: PathBuf,
    rate_limit_ms: u64,
    http_timeout_secs: u64,
}

impl Config {
    fn from_env() -> Self {
        Self {
            raw_fs_dir: PathBuf::from(
                std::env::var("RAW_FS_DIR").unwrap_or_else(|_| "./data/raw".to_string()),
            ),
            rate_limit_ms: std::env::var("RATE_LIMIT_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
        }
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

fn storage_file_name(source: &Source) -> String {
    format!("{}.{}", source.id, source.format.trim_start_matches('.'))
}

/// Sources to collect, after the enabled and id filters
fn select_sources<'a>(
    config: &'a SourcesConfig,
    source_id: Option<&str>,
    include_disabled: bool,
) -> Vec<&'a Source> {
    config
        .sources
        .iter()
        .filter(|s| {
            if !include_disabled && !s.enabled {
                return false;
            }
            if let Some(filter_id) = source_id {
                return s.id == filter_id;
            }
            true
        })
        .collect()
}

/// Load sources configuration from JSON file
async fn load_sources_config(path: &str) -> Result<SourcesConfig> {
    let content = fs::read_to_string(path)
        .await
        .context("Failed to read pipeline config")?;
    let config: SourcesConfig =
        serde_json::from_str(&content).context("Failed to parse pipeline config")?;
    Ok(config)
}

/// Fetch a single source and return its artifact metadata
async fn fetch_source(
    client: &reqwest::Client,
    config: &Config,
    manifest: &Manifest,
    source: &Source,
    force: bool,
    dry_run: bool,
) -> Result<ArtifactMeta> {
    debug!(delay_ms = config.rate_limit_ms, "rate limit");
    sleep(Duration::from_millis(config.rate_limit_ms)).await;

    info!(url = %source.url, "fetching");
    let resp = client
        .get(&source.url)
        .send()
        .await?
        .error_for_status()
        .context("HTTP request failed")?;

    let mime = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let bytes = resp.bytes().await?;
    let hash = content_hash(&bytes);
    info!(size = bytes.len(), mime = %mime, hash = %hash, "downloaded");

    let storage_path = config.raw_fs_dir.join(storage_file_name(source));

    if !force {
        if let Some(existing) = manifest.artifacts.get(&source.id) {
            let stored = fs::try_exists(&existing.storage_path).await.unwrap_or(false);
            if existing.content_hash == hash && stored {
                println!("  Unchanged since {}", existing.captured_at.format("%Y-%m-%d %H:%M"));
                return Ok(existing.clone());
            }
        }
    }

    let meta = ArtifactMeta {
        source_id: source.id.clone(),
        url: source.url.clone(),
        captured_at: Utc::now(),
        content_hash: hash,
        mime_type: mime,
        size_bytes: bytes.len() as u64,
        storage_path: storage_path.to_string_lossy().to_string(),
    };

    if dry_run {
        println!("  Dry run - would write {}", meta.storage_path);
        return Ok(meta);
    }

    fs::create_dir_all(&config.raw_fs_dir).await?;
    fs::write(&storage_path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", storage_path.display()))?;
    println!("  Saved to: {}", meta.storage_path);

    Ok(meta)
}

/// Print summary of available sources
fn print_sources_summary(sources_config: &SourcesConfig) {
    println!("\nConfigured sources:");
    println!("{:-<60}", "");
    for source in &sources_config.sources {
        let status = if source.enabled { "✓" } else { "✗" };
        println!("  {} {} - {} [{}]", status, source.id, source.name, source.format);
    }
    println!("{:-<60}", "");
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let args = Args::parse();
    let config = Config::from_env();

    println!("=== Housing Prices Collector ===");
    println!("Raw directory: {}", config.raw_fs_dir.display());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent("lux-housing-pipeline/0.1 (batch data preparation)")
        .build()?;

    let sources_config = match &args.config {
        Some(path) => {
            info!(path = %path, "loading sources");
            load_sources_config(path).await?
        }
        None => SourcesConfig::default(),
    };
    println!("Config version: {}", sources_config.version);

    let sources = select_sources(&sources_config, args.source_id.as_deref(), args.include_disabled);
    if sources.is_empty() {
        print_sources_summary(&sources_config);
        anyhow::bail!("No sources match the filter criteria");
    }

    let mut manifest = Manifest::load(&config.raw_fs_dir).await?;

    println!("\nProcessing {} source(s)...", sources.len());

    let mut collected = 0;
    let mut failed = 0;

    for source in &sources {
        println!("\n[{}] {}", source.id, source.name);
        println!("  Provider: {}", source.provider);

        match fetch_source(&client, &config, &manifest, source, args.force, args.dry_run).await {
            Ok(meta) => {
                println!("  ✓ Collected: {}", meta.content_hash);
                manifest.artifacts.insert(source.id.clone(), meta);
                collected += 1;
            }
            Err(e) => {
                warn!(source = %source.id, error = %e, "fetch failed");
                eprintln!("  ✗ Failed: {:#}", e);
                failed += 1;
            }
        }
    }

    if !args.dry_run && collected > 0 {
        manifest.save(&config.raw_fs_dir).await?;
        info!(entries = manifest.artifacts.len(), "manifest written");
    }

    println!("\n=== Collection Summary ===");
    println!("Collected: {}", collected);
    println!("Failed: {}", failed);

    if collected == 0 {
        anyhow::bail!("Every fetch failed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta(source_id: &str) -> ArtifactMeta {
        ArtifactMeta {
            source_id: source_id.to_string(),
            url: "https://example.org/file".to_string(),
            captured_at: Utc::now(),
            content_hash: content_hash(b"payload"),
            mime_type: "text/html".to_string(),
            size_bytes: 7,
            storage_path: format!("./data/raw/{}.html", source_id),
        }
    }

    #[test]
    fn test_content_hash_is_prefixed_sha256() {
        let hash = content_hash(b"");
        assert_eq!(
            hash,
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        assert_ne!(content_hash(b"2010"), content_hash(b"2011"));
    }

    #[test]
    fn test_storage_file_name_uses_format() {
        let sources = default_sources();
        assert_eq!(storage_file_name(&sources[0]), "housing-prices.xlsx");
        assert_eq!(storage_file_name(&sources[1]), "current-communes.html");
    }

    #[test]
    fn test_default_sources_ids() {
        let ids: Vec<String> = default_sources().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["housing-prices", "current-communes", "former-communes"]);
    }

    // -------------------------------------------------------------------------
    // SOURCE SELECTION
    // -------------------------------------------------------------------------

    #[test]
    fn test_select_sources_by_id() {
        let config = SourcesConfig::default();
        let selected = select_sources(&config, Some("former-communes"), false);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "former-communes");
    }

    #[test]
    fn test_select_sources_skips_disabled() {
        let mut config = SourcesConfig::default();
        config.sources[0].enabled = false;
        assert_eq!(select_sources(&config, None, false).len(), 2);
        assert_eq!(select_sources(&config, None, true).len(), 3);
    }

    #[test]
    fn test_include_disabled_flag() {
        let args = Args::try_parse_from(["collector"]).unwrap();
        assert!(!args.include_disabled);
        let args = Args::try_parse_from(["collector", "--include-disabled"]).unwrap();
        assert!(args.include_disabled);
    }

    #[test]
    fn test_select_sources_unknown_id_is_empty() {
        let config = SourcesConfig::default();
        assert!(select_sources(&config, Some("nope"), false).is_empty());
    }

    #[test]
    fn test_sources_config_from_pipeline_json() {
        let json = r#"{
            "version": "1.0",
            "sources": [
                {"id": "a", "name": "A", "format": "html", "url": "https://a.example"}
            ],
            "analysis": {"base_year": 2010}
        }"#;
        let config: SourcesConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert!(config.sources[0].enabled);
    }

    // -------------------------------------------------------------------------
    // MANIFEST
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_manifest_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(dir.path()).await.unwrap();
        assert!(manifest.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::default();
        manifest
            .artifacts
            .insert("current-communes".to_string(), sample_meta("current-communes"));
        manifest.save(dir.path()).await.unwrap();

        let loaded = Manifest::load(dir.path()).await.unwrap();
        assert_eq!(loaded.artifacts, manifest.artifacts);
    }
}
