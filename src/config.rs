//! Configuration management using the prefer crate for discovery.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregate::UnknownKeyPolicy;
use crate::extract::DEFAULT_MAX_CHUNK_CHARS;
use crate::llm::LlmConfig;
use crate::repository::DATABASE_FILENAME;

/// Subdirectory holding versioned result slots.
const RESULTS_SUBDIR: &str = "results";
/// Subdirectory holding uploaded contracts.
const UPLOADS_SUBDIR: &str = "uploads";
/// Subdirectory holding per-run chunk files.
const RUNS_SUBDIR: &str = "runs";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3030;
/// Default upload size limit (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Chunks categorized at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-chunk categorizer deadline.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// What to do with clause keys the model invents.
    #[serde(default)]
    pub unknown_keys: UnknownKeyPolicy,
    /// Pages longer than this are split before categorization.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

fn default_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_chunk_chars() -> usize {
    DEFAULT_MAX_CHUNK_CHARS
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            unknown_keys: UnknownKeyPolicy::default(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

impl AnalysisConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Where the clause classification comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Remote toxicity service; wins over `weights_path` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Sent as `x-api-key` to the remote service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Local weights table (default: `{data_dir}/weights.toml`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_path: Option<PathBuf>,
}

impl ClassifierConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `CLASSIFIER_ENDPOINT`: remote toxicity service URL
    /// - `CLASSIFIER_API_KEY`: key for the remote service
    /// - `CLASSIFIER_WEIGHTS`: local weights file
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(endpoint) = env_non_empty("CLASSIFIER_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(key) = env_non_empty("CLASSIFIER_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(path) = env_non_empty("CLASSIFIER_WEIGHTS") {
            self.weights_path = Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
        }
        self
    }
}

/// HTTP server defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted upload body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: data dir -> home dir -> current dir
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clauseguard");

        Self {
            data_dir,
            database_filename: DATABASE_FILENAME.to_string(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join(RESULTS_SUBDIR)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join(UPLOADS_SUBDIR)
    }

    /// Chunk files for one run.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.data_dir.join(RUNS_SUBDIR).join(run_id)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (label, dir) in [
            ("data", self.data_dir.clone()),
            ("results", self.results_dir()),
            ("uploads", self.uploads_dir()),
        ] {
            fs::create_dir_all(&dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to create {} directory '{}': {}", label, dir.display(), e),
                )
            })?;
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Categorizer model settings.
    #[serde(default, skip_serializing_if = "LlmConfig::is_default")]
    pub llm: LlmConfig,
    #[serde(default, skip_serializing_if = "AnalysisConfig::is_default")]
    pub analysis: AnalysisConfig,
    #[serde(default, skip_serializing_if = "ClassifierConfig::is_default")]
    pub classifier: ClassifierConfig,
    #[serde(default, skip_serializing_if = "ServerConfig::is_default")]
    pub server: ServerConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers clauseguard config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("clauseguard").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}; using defaults", e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        let mut config = Self::default();
        config.classifier = config.classifier.with_env_overrides();
        config
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;

        config.source_path = Some(path.to_path_buf());
        config.llm = config.llm.with_env_overrides();
        config.classifier = config.classifier.with_env_overrides();
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(&mut self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(weights) = self.classifier.weights_path.take() {
            self.classifier.weights_path =
                Some(self.resolve_path(&weights.to_string_lossy(), base_dir));
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory (--data flag).
    pub data: Option<PathBuf>,
}

/// Look for a config file inside the data directory.
fn find_config_in_data_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["json", "yaml", "yml", "toml"];
    let basenames = ["clauseguard", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

/// Load config from file sources.
async fn load_file_config(options: &LoadOptions, data_dir_override: Option<&PathBuf>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return match Config::load_from_path(config_path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Config::default_with_env()
            }
        };
    }

    // Priority 2: Config inside the data dir
    if let Some(data_dir) = data_dir_override {
        if let Some(config_path) = find_config_in_data_dir(data_dir) {
            tracing::debug!("Found config in data dir: {}", config_path.display());
            return Config::load_from_path(&config_path)
                .await
                .unwrap_or_else(|_| Config::default_with_env());
        }
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    // --data wins over CLAUSEGUARD_DATA_DIR
    let data_dir_override = options
        .data
        .clone()
        .or_else(|| {
            env_non_empty("CLAUSEGUARD_DATA_DIR")
                .map(|d| PathBuf::from(shellexpand::tilde(&d).as_ref()))
        })
        .map(|d| absolute(&d));

    let mut config = load_file_config(&options, data_dir_override.as_ref()).await;
    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(data_dir) = data_dir_override {
        tracing::debug!("Using data dir override: {}", data_dir.display());
        settings.data_dir = data_dir;
    }

    (settings, config)
}
