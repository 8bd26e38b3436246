// src/core/config_manager.rs
//! Configuration assembly: `config.yaml` for layout, environment variables for
//! credentials and tunables.

use crate::environment::EnvironmentConfig;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const DEFAULT_FILE_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub environment: EnvironmentConfig,
    pub service: ServiceConfig,
}

#[derive(Clone)]
pub struct ServiceConfig {
    pub file_api_base_url: String,
    pub bot_token: Option<String>,
    pub crm_webhook_url: Option<String>,
    pub cache_rest_url: Option<String>,
    pub cache_rest_token: Option<String>,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,
    pub crm_timeout: Duration,
    pub port: u16,
}

// Credentials stay out of Debug output
impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("file_api_base_url", &self.file_api_base_url)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<set>"))
            .field("crm_webhook_url", &self.crm_webhook_url.as_ref().map(|_| "<set>"))
            .field("cache_rest_url", &self.cache_rest_url)
            .field("cache_rest_token", &self.cache_rest_token.as_ref().map(|_| "<set>"))
            .field("metadata_timeout", &self.metadata_timeout)
            .field("download_timeout", &self.download_timeout)
            .field("crm_timeout", &self.crm_timeout)
            .field("port", &self.port)
            .finish()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            file_api_base_url: DEFAULT_FILE_API_URL.to_string(),
            bot_token: None,
            crm_webhook_url: None,
            cache_rest_url: None,
            cache_rest_token: None,
            metadata_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(30),
            crm_timeout: Duration::from_secs(30),
            port: 8000,
        }
    }
}

impl ConfigManager {
    /// Load all configurations
    pub fn load() -> Result<Self> {
        let mut environment = EnvironmentConfig::load()?;
        Self::apply_sweep_overrides(&mut environment)?;
        let service = Self::load_service()?;

        info!(
            "Configuration loaded: storage={}, public_base_url={}, crm={}, bot_token={}",
            environment.storage_dir.display(),
            environment.public_base_url,
            service.crm_webhook_url.is_some(),
            service.bot_token.is_some()
        );

        Ok(Self {
            environment,
            service,
        })
    }

    fn load_service() -> Result<ServiceConfig> {
        let defaults = ServiceConfig::default();

        Ok(ServiceConfig {
            file_api_base_url: env_string("FILE_API_BASE_URL")
                .unwrap_or(defaults.file_api_base_url),
            bot_token: env_string("BOT_TOKEN"),
            crm_webhook_url: env_string("CRM_WEBHOOK_URL"),
            cache_rest_url: env_string("CACHE_REST_URL"),
            cache_rest_token: env_string("CACHE_REST_TOKEN"),
            metadata_timeout: env_parse::<u64>("FILE_METADATA_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.metadata_timeout),
            download_timeout: env_parse::<u64>("FILE_DOWNLOAD_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            crm_timeout: env_parse::<u64>("CRM_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.crm_timeout),
            port: env_parse::<u16>("ROCKET_PORT")?.unwrap_or(defaults.port),
        })
    }

    fn apply_sweep_overrides(environment: &mut EnvironmentConfig) -> Result<()> {
        let sweep = &mut environment.sweep;
        if let Some(concurrency) = env_parse::<usize>("SWEEP_CONCURRENCY")? {
            sweep.concurrency = concurrency.max(1);
        }
        if let Some(rate) = env_parse::<u32>("CRM_RATE_PER_SEC")? {
            sweep.crm_rate_per_sec = rate.max(1);
        }
        if let Some(rate) = env_parse::<u32>("DOWNLOAD_RATE_PER_SEC")? {
            sweep.download_rate_per_sec = rate.max(1);
        }
        Ok(())
    }

    /// Ensure all required directories exist
    pub async fn ensure_directories(&self) -> Result<()> {
        use crate::core::FsOps;

        FsOps::ensure_dir_exists(&self.environment.storage_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create storage directory: {}",
                    self.environment.storage_dir.display()
                )
            })
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be valid ({}): {}", name, raw, e)),
    }
}
