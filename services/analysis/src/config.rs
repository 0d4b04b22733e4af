use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    pub plots_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            output_dir: PathBuf::from(
                std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "./data/output".to_string()),
            ),
            plots_dir: PathBuf::from(
                std::env::var("PLOTS_DIR").unwrap_or_else(|_| "plots".to_string()),
            ),
        }
    }
}

/// The `analysis` section of `config/pipeline.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Year whose prices are the index base (= 100)
    pub base_year: i32,
    pub plots: Vec<PlotSpec>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let plot = |locality: &str, file_stem: &str| PlotSpec {
            locality: locality.to_string(),
            file_stem: file_stem.to_string(),
        };
        Self {
            base_year: 2010,
            plots: vec![
                plot("Luxembourg", "lux_plot"),
                plot("Esch-sur-Alzette", "esch_plot"),
                plot("Mamer", "mamer_plot"),
                plot("Schengen", "schengen_plot"),
                plot("Wincrange", "wincrange_plot"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlotSpec {
    pub locality: String,
    pub file_stem: String,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineFile {
    #[serde(default)]
    analysis: AnalysisConfig,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {}", path.display()))?;
        let file: PipelineFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config {}", path.display()))?;
        Ok(file.analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plot_list() {
        let config = AnalysisConfig::default();
        assert_eq!(config.base_year, 2010);
        let stems: Vec<&str> = config.plots.iter().map(|p| p.file_stem.as_str()).collect();
        assert_eq!(
            stems,
            vec!["lux_plot", "esch_plot", "mamer_plot", "schengen_plot", "wincrange_plot"]
        );
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/pipeline.json");
        let config = AnalysisConfig::load(&path).unwrap();
        assert_eq!(config.base_year, 2010);
        assert_eq!(config.plots.len(), 5);
        assert_eq!(config.plots[1].locality, "Esch-sur-Alzette");
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"version": "1.0", "sources": []}"#).unwrap();
        let config = AnalysisConfig::load(&path).unwrap();
        assert_eq!(config.plots.len(), 5);
    }
}
