// src/web/services.rs
//! Wires configuration into the relay, CRM client and sweep runner. Shared by
//! the HTTP server and the CLI.

use crate::cache::{Cache, RestCache};
use crate::classifier::Classifier;
use crate::core::{ConfigManager, ServiceClient};
use crate::crm::{CrmApi, RestCrm};
use crate::relay::{BotFileApi, LocalStore, RelayService};
use crate::sanitizer::Sanitizer;
use crate::sweep::{ReconciliationSweep, SweepRunner};
use crate::throttle::TokenBucket;
use crate::types::FieldName;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Services {
    pub relay: RelayService,
    pub classifier: Classifier,
    pub sanitizer: Sanitizer,
    pub crm: Option<Arc<dyn CrmApi>>,
    pub crm_fields: BTreeMap<FieldName, String>,
    pub runner: Option<SweepRunner>,
    pub tracked_fields: Vec<FieldName>,
}

impl Services {
    pub fn from_config(config: &ConfigManager) -> Result<Self> {
        let env = &config.environment;
        let service = &config.service;

        let http = ServiceClient::build_http_client().context("Failed to create HTTP client")?;

        let bot_token = match &service.bot_token {
            Some(token) => token.clone(),
            None => {
                warn!("BOT_TOKEN not set; every relay will fail and keep the original reference");
                String::new()
            }
        };
        let file_api = Arc::new(BotFileApi::new(
            http.clone(),
            &service.file_api_base_url,
            &bot_token,
            service.metadata_timeout,
            service.download_timeout,
        ));
        let store = Arc::new(LocalStore::new(&env.storage_dir, env.public_base_url.clone()));

        let cache = match &service.cache_rest_url {
            Some(url) => {
                info!("Using REST cache at {}", url);
                let mut client = ServiceClient::with_client(http.clone(), url.as_str(), "cache");
                if let Some(token) = &service.cache_rest_token {
                    client = client.with_bearer_token(token.clone());
                }
                Cache::with_primary(Arc::new(RestCache::new(client)))
            }
            None => Cache::in_memory(),
        };

        let relay = RelayService::new(file_api, store)
            .with_cache(cache)
            .with_download_throttle(Arc::new(TokenBucket::per_second(env.sweep.download_rate_per_sec)))
            .with_naming(env.naming);

        let classifier = Classifier::new(&env.public_base_url, &env.local_path_prefixes);

        let crm: Option<Arc<dyn CrmApi>> = service
            .crm_webhook_url
            .as_ref()
            .map(|url| Arc::new(RestCrm::new(http.clone(), url, service.crm_timeout)) as Arc<dyn CrmApi>);

        let runner = crm.as_ref().map(|crm| {
            let sweep = ReconciliationSweep::new(
                crm.clone(),
                relay.clone(),
                classifier.clone(),
                env.crm_fields.clone(),
            )
            .with_page_size(env.sweep.page_size)
            .with_concurrency(env.sweep.concurrency)
            .with_crm_throttle(Arc::new(TokenBucket::per_second(env.sweep.crm_rate_per_sec)));
            SweepRunner::new(sweep)
        });

        if crm.is_none() {
            warn!("CRM_WEBHOOK_URL not set; CRM writes and sweeps are disabled");
        }

        Ok(Self {
            relay,
            classifier,
            sanitizer: Sanitizer::default(),
            crm,
            crm_fields: env.crm_fields.clone(),
            runner,
            tracked_fields: env.sweep.tracked_fields.clone(),
        })
    }
}
