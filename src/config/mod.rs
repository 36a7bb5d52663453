use crate::models::{RuleSet, RulesConfig, UserConfig};
use ::config::{Config, Environment, File, FileFormat};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Prefix for environment overrides, e.g. `DOCFLOW_SETTINGS__MAX_WORKERS=4`
pub const ENV_PREFIX: &str = "DOCFLOW";

/// Configuration manager for loading and saving YAML configuration files.
///
/// Manages two files inside the configuration directory:
/// - User config (`DocFlow Config.yaml`): worker pool, converter, fonts, logging
/// - Rules (`DocFlow Rules.yaml`): the ordered replacement rule table
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
    rules_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join("DocFlow Config.yaml"),
            rules_path: config_dir.join("DocFlow Rules.yaml"),
            config_dir,
        })
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }

    pub fn rules_path(&self) -> &Utf8Path {
        &self.rules_path
    }

    /// Load the user configuration.
    ///
    /// The YAML file is optional; `DOCFLOW_`-prefixed environment variables
    /// override its values (`__` separates nested keys).
    pub fn load_user_config(&self) -> Result<UserConfig> {
        self.load_user_config_with(Self::environment())
    }

    /// Environment source used by [`load_user_config`](Self::load_user_config)
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Load the user configuration with an explicit environment source
    pub fn load_user_config_with(&self, environment: Environment) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
        }

        let layered = Config::builder()
            .add_source(
                File::from(self.user_config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        let config: UserConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse user config: {}", self.user_config_path))?;

        tracing::info!(
            "Loaded user config from {} (max_workers={}, timeout={}s)",
            self.user_config_path,
            config.settings.max_workers,
            config.settings.conversion_timeout_secs
        );
        Ok(config)
    }

    /// Save the user configuration file
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// Load the replacement rules, or an empty set if the file doesn't exist.
    ///
    /// Rules with an empty `old_text` and duplicate rules make the whole file
    /// invalid.
    pub fn load_rules(&self) -> Result<RuleSet> {
        if !self.rules_path.exists() {
            tracing::debug!("Rules file not found at {}, starting empty", self.rules_path);
            return Ok(RuleSet::new());
        }

        let file_contents = fs::read_to_string(&self.rules_path)
            .with_context(|| format!("Failed to read rules: {}", self.rules_path))?;

        let config: RulesConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse rules: {}", self.rules_path))?;

        tracing::info!("Loaded {} rules from {}", config.rules.len(), self.rules_path);
        Ok(config.rules)
    }

    /// Save the replacement rules
    pub fn save_rules(&self, rules: &RuleSet) -> Result<()> {
        let config = RulesConfig {
            rules: rules.clone(),
        };
        let yaml_string =
            serde_yaml_ng::to_string(&config).context("Failed to serialize rules to YAML")?;

        fs::write(&self.rules_path, yaml_string)
            .with_context(|| format!("Failed to write rules: {}", self.rules_path))?;

        tracing::info!("Saved {} rules to {}", rules.len(), self.rules_path);
        Ok(())
    }
}
