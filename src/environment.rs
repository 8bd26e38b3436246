// src/environment.rs
use crate::relay::NamingScheme;
use crate::types::FieldName;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Directory holding relayed files
    pub storage_dir: PathBuf,
    /// Public URL the storage directory is served under
    pub public_base_url: String,
    #[serde(default = "default_local_prefixes")]
    pub local_path_prefixes: Vec<String>,
    #[serde(default)]
    pub naming: NamingScheme,
    #[serde(default)]
    pub sweep: SweepSettings,
    /// CRM field code for each tracked file field
    #[serde(default)]
    pub crm_fields: BTreeMap<FieldName, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_crm_rate")]
    pub crm_rate_per_sec: u32,
    #[serde(default = "default_download_rate")]
    pub download_rate_per_sec: u32,
    #[serde(default = "default_tracked_fields")]
    pub tracked_fields: Vec<FieldName>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            concurrency: default_concurrency(),
            crm_rate_per_sec: default_crm_rate(),
            download_rate_per_sec: default_download_rate(),
            tracked_fields: default_tracked_fields(),
        }
    }
}

fn default_local_prefixes() -> Vec<String> {
    vec!["/uploads/".to_string()]
}

fn default_page_size() -> u64 {
    50
}

fn default_concurrency() -> usize {
    4
}

fn default_crm_rate() -> u32 {
    2
}

fn default_download_rate() -> u32 {
    5
}

fn default_tracked_fields() -> Vec<FieldName> {
    vec![
        FieldName::Resume,
        FieldName::Diploma,
        FieldName::VoiceAnswer1,
        FieldName::VoiceAnswer2,
        FieldName::VoiceAnswer3,
    ]
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    local: EnvironmentConfig,
    production: EnvironmentConfig,
}

impl EnvironmentConfig {
    /// Load configuration based on environment
    pub fn load() -> Result<Self> {
        let environment = Self::get_environment();
        info!("Loading configuration for environment: {}", environment);

        let config_path = std::env::var("RELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.yaml"));

        Self::load_from_file(&config_path, &environment)
    }

    pub fn get_environment() -> String {
        std::env::var("RELAY_ENV")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .or_else(|_| std::env::var("ENV"))
            .unwrap_or_else(|_| "local".to_string())
    }

    fn load_from_file(config_path: &Path, environment: &str) -> Result<Self> {
        if !config_path.exists() {
            anyhow::bail!(
                "{} not found. Cannot start without configuration.",
                config_path.display()
            );
        }

        let config_content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_yaml_str(&config_content, environment)
    }

    pub fn from_yaml_str(content: &str, environment: &str) -> Result<Self> {
        let config_file: ConfigFile =
            serde_yaml::from_str(content).context("Failed to parse configuration YAML")?;

        let env_config = match environment {
            "production" => config_file.production,
            _ => config_file.local,
        };

        Ok(Self {
            storage_dir: Self::resolve_path(&env_config.storage_dir)?,
            ..env_config
        })
    }

    fn resolve_path(path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            let current_dir = std::env::current_dir().context("Failed to get current directory")?;
            Ok(current_dir.join(path))
        }
    }

    pub fn crm_field(&self, field: FieldName) -> Option<&str> {
        self.crm_fields.get(&field).map(String::as_str)
    }
}
