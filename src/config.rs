use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GlimpseConfig {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub matching: MatchingConfig,
    pub resurfacing: ResurfacingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    /// Base interval between captures when `random_interval` is off.
    pub interval_seconds: u64,
    /// Pick a uniform-random delay in `[min, max]` before each cycle.
    pub random_interval: bool,
    pub min_interval_seconds: u64,
    pub max_interval_seconds: u64,
    /// Directory where capture image files are written.
    pub capture_dir: String,
    /// Retention cap — oldest captures beyond this count are evicted.
    pub max_captures: usize,
    /// Gate near-duplicate frames before persistence.
    pub deduplicate: bool,
    /// Maximum Hamming distance (bits) for two hashes to count as duplicates.
    pub hash_threshold: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// JPEG quality (1-100) for stored capture files.
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub min_similarity: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum clipped-cosine similarity for a capture→task link.
    pub threshold: f64,
    /// Worker threads in the background matcher pool.
    pub workers: usize,
    /// Pending-job capacity of the matcher pool; jobs beyond it are rejected.
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResurfacingConfig {
    /// Decay period in days — a match this old retains ~37% of its raw score.
    pub decay_days: f64,
    pub min_similarity: f64,
    pub max_suggestions: usize,
}

impl Default for GlimpseConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            capture: CaptureConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            matching: MatchingConfig::default(),
            resurfacing: ResurfacingConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 40,
            random_interval: true,
            min_interval_seconds: 20,
            max_interval_seconds: 60,
            capture_dir: default_glimpse_dir()
                .join("captures")
                .to_string_lossy()
                .into_owned(),
            max_captures: 2000,
            deduplicate: true,
            hash_threshold: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_glimpse_dir()
            .join("context.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            jpeg_quality: 85,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_glimpse_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            batch_size: 32,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            min_similarity: 0.7,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            workers: 2,
            queue_capacity: 32,
        }
    }
}

impl Default for ResurfacingConfig {
    fn default() -> Self {
        Self {
            decay_days: 30.0,
            min_similarity: 0.6,
            max_suggestions: 5,
        }
    }
}

/// Returns `~/.glimpse/`
pub fn default_glimpse_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".glimpse")
}

/// Returns the default config file path: `~/.glimpse/config.toml`
pub fn default_config_path() -> PathBuf {
    default_glimpse_dir().join("config.toml")
}

impl GlimpseConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            GlimpseConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (GLIMPSE_DB, GLIMPSE_CAPTURE_DIR,
    /// GLIMPSE_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GLIMPSE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("GLIMPSE_CAPTURE_DIR") {
            self.capture.capture_dir = val;
        }
        if let Ok(val) = std::env::var("GLIMPSE_LOG_LEVEL") {
            self.service.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the capture directory, expanding `~` if needed.
    pub fn resolved_capture_dir(&self) -> PathBuf {
        expand_tilde(&self.capture.capture_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GlimpseConfig::default();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.capture.hash_threshold, 5);
        assert_eq!(config.capture.max_captures, 2000);
        assert!(config.capture.random_interval);
        assert_eq!(config.matching.threshold, 0.7);
        assert_eq!(config.resurfacing.decay_days, 30.0);
        assert!(config.storage.db_path.ends_with("context.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[capture]
interval_seconds = 15
random_interval = false
max_captures = 500

[storage]
db_path = "/tmp/test.db"

[resurfacing]
decay_days = 7.0
"#;
        let config: GlimpseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.capture.interval_seconds, 15);
        assert!(!config.capture.random_interval);
        assert_eq!(config.capture.max_captures, 500);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.resurfacing.decay_days, 7.0);
        // defaults still apply for unset fields
        assert_eq!(config.capture.hash_threshold, 5);
        assert_eq!(config.matching.threshold, 0.7);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = GlimpseConfig::default();
        std::env::set_var("GLIMPSE_DB", "/tmp/override.db");
        std::env::set_var("GLIMPSE_CAPTURE_DIR", "/tmp/shots");
        std::env::set_var("GLIMPSE_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.capture.capture_dir, "/tmp/shots");
        assert_eq!(config.service.log_level, "trace");

        // Clean up
        std::env::remove_var("GLIMPSE_DB");
        std::env::remove_var("GLIMPSE_CAPTURE_DIR");
        std::env::remove_var("GLIMPSE_LOG_LEVEL");
    }

    #[test]
    fn expand_tilde_passthrough() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert!(expand_tilde("~/x").ends_with("x"));
    }
}
