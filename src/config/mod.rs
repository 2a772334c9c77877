use crate::models::StagehandConfig;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// File name of the configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "Stagehand.yaml";

/// Prefix for environment overrides, e.g. `STAGEHAND_CAPTURE__CHUNK_SIZE=4096`
pub const ENV_PREFIX: &str = "STAGEHAND";

/// Configuration manager for loading and saving `Stagehand.yaml`.
///
/// Values are layered: built-in defaults, then the YAML file (optional), then
/// `STAGEHAND_<SECTION>__<KEY>` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration with overrides from the process environment.
    pub fn load_config(&self) -> Result<StagehandConfig> {
        self.load_config_with_env(Self::environment())
    }

    /// Load the configuration with overrides from the given environment source.
    pub fn load_config_with_env(&self, environment: Environment) -> Result<StagehandConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let layered = Config::builder()
            .add_source(File::new(self.config_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: StagehandConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        validate(&config)?;
        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &StagehandConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// The environment source used by [`load_config`](Self::load_config).
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

/// Reject settings the capture loops cannot work with.
pub fn validate(config: &StagehandConfig) -> Result<()> {
    let capture = &config.capture;
    if capture.chunk_size == 0 {
        bail!("capture.chunk_size must be greater than zero");
    }
    if capture.stall_limit == 0 {
        bail!("capture.stall_limit must be greater than zero");
    }
    if capture.read_timeout_ms == 0 {
        bail!("capture.read_timeout_ms must be greater than zero");
    }
    Ok(())
}
