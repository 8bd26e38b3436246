// src/cli.rs
use crate::core::ConfigManager;
use crate::sweep::SweepOptions;
use crate::types::FieldName;
use crate::web::{start_web_server, Services};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "recruit-relay")]
#[command(about = "Relay ephemeral bot files to durable storage and reconcile CRM records")]
pub struct RelayCli {
    #[command(subcommand)]
    pub command: Option<RelayCommand>,
}

#[derive(Subcommand)]
pub enum RelayCommand {
    /// Run the HTTP server (default)
    Serve,
    /// Run one reconciliation sweep and print the report
    Sweep {
        /// Comma separated file fields; defaults to the configured ones
        #[arg(long, value_delimiter = ',')]
        fields: Vec<FieldName>,
        /// Restrict the sweep to one contact
        #[arg(long)]
        contact_id: Option<String>,
        /// CRM list filter as a JSON object
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Classify a stored file reference
    Classify { value: String },
    /// Relay one ephemeral file id and print the permanent URL
    Relay {
        file_id: String,
        #[arg(long, default_value = "resume")]
        field: FieldName,
        #[arg(long)]
        owner: Option<String>,
    },
}

fn parse_filter(raw: Option<&str>, contact_id: Option<&str>) -> Result<Map<String, Value>> {
    let mut filter = match raw {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("Invalid --filter JSON")? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--filter must be a JSON object"),
        },
        None => Map::new(),
    };
    if let Some(id) = contact_id {
        filter.insert("ID".to_string(), Value::String(id.to_string()));
    }
    Ok(filter)
}

pub async fn handle_command(cli: RelayCli) -> Result<()> {
    let config = ConfigManager::load()?;

    match cli.command.unwrap_or(RelayCommand::Serve) {
        RelayCommand::Serve => start_web_server(config).await,

        RelayCommand::Sweep {
            fields,
            contact_id,
            filter,
            dry_run,
            deadline_secs,
        } => {
            config.ensure_directories().await?;
            let services = Services::from_config(&config)?;
            let runner = services
                .runner
                .as_ref()
                .context("CRM_WEBHOOK_URL must be set to run a sweep")?;

            let fields = if fields.is_empty() {
                services.tracked_fields.clone()
            } else {
                fields
            };

            let mut options = SweepOptions::default()
                .with_filter(parse_filter(filter.as_deref(), contact_id.as_deref())?)
                .dry_run(dry_run);
            if let Some(secs) = deadline_secs {
                options = options.with_deadline(Duration::from_secs(secs));
            }

            // Ctrl-C stops the sweep gracefully
            let cancel = options.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, cancelling sweep");
                    cancel.cancel();
                }
            });

            match runner.run(&fields, options).await {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Err(e) => {
                    error!("Sweep failed: {}", e);
                    Err(e.into())
                }
            }
        }

        RelayCommand::Classify { value } => {
            let services = Services::from_config(&config)?;
            let classification = services.classifier.classify(&value);
            println!("{}", serde_json::to_string_pretty(&classification)?);
            Ok(())
        }

        RelayCommand::Relay {
            file_id,
            field,
            owner,
        } => {
            config.ensure_directories().await?;
            let services = Services::from_config(&config)?;
            let file = services
                .relay
                .try_relay(&file_id, field, owner.as_deref())
                .await
                .with_context(|| format!("Relay of {} failed", file_id))?;
            println!("{}", serde_json::to_string_pretty(&file)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sweep_arguments() {
        let cli = RelayCli::try_parse_from([
            "recruit-relay",
            "sweep",
            "--fields",
            "cv,voice_answer_2",
            "--contact-id",
            "42",
            "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Some(RelayCommand::Sweep {
                fields,
                contact_id,
                dry_run,
                ..
            }) => {
                assert_eq!(fields, vec![FieldName::Resume, FieldName::VoiceAnswer2]);
                assert_eq!(contact_id.as_deref(), Some("42"));
                assert!(dry_run);
            }
            _ => panic!("expected sweep command"),
        }
    }

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = RelayCli::try_parse_from(["recruit-relay"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_filter_merges_contact_id() {
        let filter = parse_filter(Some(r#"{"CATEGORY_ID": 3}"#), Some("42")).unwrap();
        assert_eq!(filter["CATEGORY_ID"], serde_json::json!(3));
        assert_eq!(filter["ID"], serde_json::json!("42"));

        assert!(parse_filter(Some("[1]"), None).is_err());
        assert!(parse_filter(Some("{"), None).is_err());
    }
}
