use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Relative path of the project config file.
pub const CONFIG_RELATIVE_PATH: &str = ".dac/config.toml";
/// Relative path of the ignore file consumed by the file enumerator.
pub const IGNORE_RELATIVE_PATH: &str = ".dacignore";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the context store, relative to the project root.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    /// Directory where generated markdown is written, relative to the
    /// project root.
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            docs_dir: default_docs_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from(".dac/index")
}
fn default_docs_dir() -> PathBuf {
    PathBuf::from(".dac/docs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk size in bytes of UTF-8 text (characters, for ASCII
    /// markdown).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap carried between consecutive chunks, same unit as
    /// `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1600
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of chunks returned by a query.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Size budget in bytes for the enriched-instruction payload.
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            context_budget: default_context_budget(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_context_budget() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Maximum number of files summarized concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}

fn default_parallelism() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// Window within which filesystem events are coalesced into one batch.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `openai` or `ollama`.
    #[serde(default = "default_gen_provider")]
    pub provider: String,
    #[serde(default = "default_gen_model")]
    pub model: String,
    /// Base URL override (required for OpenAI-compatible gateways,
    /// optional for Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_gen_provider(),
            model: default_gen_model(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_gen_timeout_secs(),
        }
    }
}

fn default_gen_provider() -> String {
    "openai".to_string()
}
fn default_gen_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_gen_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai` or `ollama`.
    #[serde(default = "default_embed_provider")]
    pub provider: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Vector dimensionality, fixed per deployment.
    #[serde(default = "default_embed_dims")]
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embed_provider(),
            model: default_embed_model(),
            dims: default_embed_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_embed_provider() -> String {
    "openai".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embed_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7425".to_string()
}

/// Load and validate the project config from `<root>/.dac/config.toml`.
///
/// A missing file yields the documented defaults; an unreadable or invalid
/// file is a [`ConfigError`] and aborts before any core operation runs.
pub fn load_config(project_root: &Path) -> Result<Config, ConfigError> {
    let path = project_root.join(CONFIG_RELATIVE_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        source: e,
    })?;

    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.chunking.chunk_size == 0 {
        return Err(ConfigError::Invalid(
            "chunking.chunk_size must be > 0".to_string(),
        ));
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(ConfigError::Invalid(
            "chunking.chunk_overlap must be smaller than chunking.chunk_size".to_string(),
        ));
    }
    if config.retrieval.k == 0 {
        return Err(ConfigError::Invalid("retrieval.k must be >= 1".to_string()));
    }
    if config.analysis.parallelism == 0 {
        return Err(ConfigError::Invalid(
            "analysis.parallelism must be >= 1".to_string(),
        ));
    }
    if config.embedding.dims == 0 {
        return Err(ConfigError::Invalid(
            "embedding.dims must be > 0".to_string(),
        ));
    }
    for (section, provider) in [
        ("generation", config.generation.provider.as_str()),
        ("embedding", config.embedding.provider.as_str()),
    ] {
        match provider {
            "openai" | "ollama" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown {}.provider '{}'. Must be openai or ollama.",
                    section, other
                )));
            }
        }
    }
    Ok(())
}

/// TOML written by `dac init` when no config exists yet.
pub const CONFIG_TEMPLATE: &str = r#"# SourceDAC project configuration.
# Every value shown here is the default; delete what you don't change.

[index]
dir = ".dac/index"
docs_dir = ".dac/docs"

[chunking]
chunk_size = 1600
chunk_overlap = 200

[retrieval]
k = 5
context_budget = 8000

[analysis]
parallelism = 4

[watch]
debounce_ms = 300

[generation]
provider = "openai"       # or "ollama"
model = "gpt-4o-mini"

[embedding]
provider = "openai"       # or "ollama"
model = "text-embedding-3-small"
dims = 1536

[server]
bind = "127.0.0.1:7425"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(root: &Path, content: &str) {
        let dir = root.join(".dac");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 1600);
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.watch.debounce_ms, 300);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "[chunking]\nchunk_size = 500\n");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.analysis.parallelism, 4);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        );
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "[generation]\nprovider = \"litellm\"\n");
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn template_parses_and_validates() {
        let config: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        validate(&config).unwrap();
    }
}
