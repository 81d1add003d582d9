//! Configuration for the paper processing pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Stage;

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlchemistConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database location
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ollama connection shared by vision, embedding and metadata models
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// OCR heuristics and tool settings
    #[serde(default)]
    pub ocr: OcrConfig,
    /// Vision quality judge
    #[serde(default)]
    pub vision: VisionConfig,
    /// Embedding model
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Metadata extraction model
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Per-stage timeouts and retries
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AlchemistConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing sections fall back to defaults
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            if !url.trim().is_empty() {
                self.ollama.base_url = url.trim_end_matches('/').to_string();
            }
        }
        if let Ok(dir) = std::env::var("PAPER_ALCHEMIST_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(port) = std::env::var("PAPER_ALCHEMIST_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PAPER_ALCHEMIST_PORT '{}'", port),
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be > 0".into()));
        }
        if self.embeddings.chunk_words == 0 {
            return Err(Error::Config("embeddings.chunk_words must be > 0".into()));
        }
        if self.embeddings.chunk_overlap >= self.embeddings.chunk_words {
            return Err(Error::Config(format!(
                "embeddings.chunk_overlap ({}) must be smaller than chunk_words ({})",
                self.embeddings.chunk_overlap, self.embeddings.chunk_words
            )));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(Error::Config("pipeline.max_attempts must be >= 1".into()));
        }
        for (name, secs) in [
            ("pipeline.ocr_timeout_secs", self.pipeline.ocr_timeout_secs),
            ("pipeline.vision_timeout_secs", self.pipeline.vision_timeout_secs),
            ("pipeline.embedding_timeout_secs", self.pipeline.embedding_timeout_secs),
            ("pipeline.metadata_timeout_secs", self.pipeline.metadata_timeout_secs),
            ("ollama.request_timeout_secs", self.ollama.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(Error::Config(format!("{} must be > 0", name)));
            }
        }
        if self.ocr.required_below_chars > self.ocr.sufficient_above_chars {
            return Err(Error::Config(format!(
                "ocr.required_below_chars ({}) exceeds sufficient_above_chars ({})",
                self.ocr.required_below_chars, self.ocr.sufficient_above_chars
            )));
        }
        if !(0.0..=1.0).contains(&self.ocr.deferred_ocr_min_confidence) {
            return Err(Error::Config("ocr.deferred_ocr_min_confidence must be within [0, 1]".into()));
        }
        if self.server.max_upload_size == 0 {
            return Err(Error::Config("server.max_upload_size must be > 0".into()));
        }
        Ok(())
    }

    /// Full path of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.database_file)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_file: "papers.db".to_string(),
        }
    }
}

/// Ollama server connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama base URL
    pub base_url: String,
    /// HTTP-level request timeout; stage timeouts are applied separately
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 { 180 }

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// OCR decision thresholds and tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract languages, e.g. "eng+deu"
    #[serde(default = "default_languages")]
    pub languages: String,
    /// Raster resolution for OCR input
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,
    /// Raster resolution for the first-page preview
    #[serde(default = "default_preview_dpi")]
    pub preview_dpi: u32,
    /// Text layers shorter than this always go to OCR
    #[serde(default = "default_required_below")]
    pub required_below_chars: usize,
    /// Text layers at least this long may skip OCR
    #[serde(default = "default_sufficient_above")]
    pub sufficient_above_chars: usize,
    /// Minimum text density for skipping OCR
    #[serde(default = "default_min_chars_per_page")]
    pub min_chars_per_page: usize,
    /// Verdict confidence needed to act on a deferred decision
    #[serde(default = "default_deferred_confidence")]
    pub deferred_ocr_min_confidence: f32,
}

fn default_languages() -> String { "eng+kor".to_string() }
fn default_ocr_dpi() -> u32 { 300 }
fn default_preview_dpi() -> u32 { 200 }
fn default_required_below() -> usize { 50 }
fn default_sufficient_above() -> usize { 200 }
fn default_min_chars_per_page() -> usize { 100 }
fn default_deferred_confidence() -> f32 { 0.6 }

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            ocr_dpi: default_ocr_dpi(),
            preview_dpi: default_preview_dpi(),
            required_below_chars: default_required_below(),
            sufficient_above_chars: default_sufficient_above(),
            min_chars_per_page: default_min_chars_per_page(),
            deferred_ocr_min_confidence: default_deferred_confidence(),
        }
    }
}

/// Vision model used as the quality judge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: "llava".to_string(),
            temperature: 0.1,
            top_p: 0.9,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model to use (default: bge-m3)
    pub model: String,
    /// Embedding dimensions (1024 for bge-m3)
    pub dimensions: usize,
    /// Words per chunk for long documents
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    /// Words shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_words() -> usize { 512 }
fn default_chunk_overlap() -> usize { 50 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "bge-m3".to_string(),
            dimensions: 1024,
            chunk_words: default_chunk_words(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Metadata LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub model: String,
    /// Prefix of the text sent to the model
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Context window passed as `num_ctx`
    #[serde(default = "default_context_size")]
    pub context_size: u32,
    /// Fill fields the model left empty using text heuristics
    #[serde(default = "default_rule_based_fill")]
    pub rule_based_fill: bool,
}

fn default_max_prompt_chars() -> usize { 3000 }
fn default_context_size() -> u32 { 4096 }
fn default_rule_based_fill() -> bool { true }

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1:latest".to_string(),
            max_prompt_chars: default_max_prompt_chars(),
            temperature: 0.1,
            top_p: 0.9,
            context_size: default_context_size(),
            rule_based_fill: default_rule_based_fill(),
        }
    }
}

/// Timeouts and retry policy for external calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout_secs: u64,
    #[serde(default = "default_vision_timeout")]
    pub vision_timeout_secs: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,
    /// Attempts per external call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay; doubles per retry
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_ocr_timeout() -> u64 { 300 }
fn default_vision_timeout() -> u64 { 60 }
fn default_embedding_timeout() -> u64 { 120 }
fn default_metadata_timeout() -> u64 { 120 }
fn default_max_attempts() -> u32 { 3 }
fn default_backoff_base_ms() -> u64 { 1000 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_timeout_secs: default_ocr_timeout(),
            vision_timeout_secs: default_vision_timeout(),
            embedding_timeout_secs: default_embedding_timeout(),
            metadata_timeout_secs: default_metadata_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl PipelineConfig {
    /// Timeout applied to each external call made by `stage`
    pub fn timeout_for(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Ocr => self.ocr_timeout_secs,
            Stage::QualityJudge => self.vision_timeout_secs,
            Stage::Embedding => self.embedding_timeout_secs,
            Stage::Metadata => self.metadata_timeout_secs,
            // Finalize makes no external call
            Stage::Finalize => 0,
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AlchemistConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.embeddings.dimensions, 1024);
        assert_eq!(config.database_path(), PathBuf::from("data").join("papers.db"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AlchemistConfig::from_toml(
            r#"
            [embeddings]
            model = "nomic-embed-text"
            dimensions = 768

            [pipeline]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.embeddings.dimensions, 768);
        assert_eq!(config.embeddings.chunk_words, 512);
        assert_eq!(config.pipeline.max_attempts, 5);
        assert_eq!(config.pipeline.embedding_timeout_secs, 120);
        assert_eq!(config.ocr.languages, "eng+kor");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut config = AlchemistConfig::default();
        config.embeddings.chunk_overlap = config.embeddings.chunk_words;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = AlchemistConfig::default();
        config.pipeline.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeouts_rejected() {
        let mut config = AlchemistConfig::default();
        config.pipeline.embedding_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pipeline.embedding_timeout_secs"));

        let mut config = AlchemistConfig::default();
        config.ollama.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let parsed = AlchemistConfig::from_toml("[pipeline]\nocr_timeout_secs = 0\n").unwrap();
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn stage_timeouts() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.timeout_for(Stage::Ocr), Duration::from_secs(300));
        assert_eq!(pipeline.timeout_for(Stage::QualityJudge), Duration::from_secs(60));
    }
}
