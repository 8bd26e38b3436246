// src/web/handlers/webhook_handlers.rs
use crate::relay::is_ephemeral_reference;
use crate::sanitizer::{safe_json_parse, safe_json_response, ParsedPayload};
use crate::types::FieldName;
use crate::web::services::Services;
use crate::web::types::IntakeResponse;

use rocket::serde::json::Json;
use rocket::State;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub async fn intake_handler(body: String, services: &State<Services>) -> IntakeResponse {
    let payload = match safe_json_parse(&body) {
        ParsedPayload::Strict(value) => value,
        ParsedPayload::Repaired(value) => {
            info!("Intake payload needed structural repair");
            value
        }
        ParsedPayload::Raw(raw) => {
            warn!("Intake payload is not JSON, echoing {} bytes back", raw.len());
            return IntakeResponse::Raw(raw);
        }
    };

    let Value::Object(raw_fields) = payload else {
        warn!("Intake payload is not an object");
        return IntakeResponse::Processed(Json(safe_json_response(&payload)));
    };

    let mut fields = services.sanitizer.sanitize(&raw_fields);
    let owner_id = fields
        .get("contact_id")
        .filter(|id| !id.is_empty())
        .cloned();

    let relayed = relay_file_fields(services, &mut fields, owner_id.as_deref()).await;

    if let Some(owner_id) = owner_id.as_deref() {
        write_back(services, owner_id, &relayed).await;
    }

    let processed: Map<String, Value> = fields
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();

    IntakeResponse::Processed(Json(safe_json_response(&Value::Object(processed))))
}

/// Relay every ephemeral file field in place. Returns the fields whose value
/// changed.
async fn relay_file_fields(
    services: &Services,
    fields: &mut BTreeMap<String, String>,
    owner_id: Option<&str>,
) -> Vec<(FieldName, String)> {
    let mut relayed = Vec::new();

    for field in FieldName::ALL {
        let Some(value) = fields.get(field.as_str()) else {
            continue;
        };
        if !is_ephemeral_reference(value) {
            continue;
        }

        let original = value.clone();
        let url = services.relay.relay(&original, field, owner_id).await;
        if url != original {
            fields.insert(field.as_str().to_string(), url.clone());
            relayed.push((field, url));
        }
    }

    relayed
}

async fn write_back(services: &Services, owner_id: &str, relayed: &[(FieldName, String)]) {
    let Some(crm) = services.crm.as_ref() else {
        return;
    };

    let mut update = Map::new();
    for (field, url) in relayed {
        match services.crm_fields.get(field) {
            Some(code) => {
                update.insert(code.clone(), Value::String(url.clone()));
            }
            None => warn!("No CRM field mapped for {}, not writing it back", field),
        }
    }
    if update.is_empty() {
        return;
    }

    match crm.update(owner_id, &update).await {
        Ok(()) => info!("Wrote {} relayed fields to contact {}", update.len(), owner_id),
        Err(e) => warn!("Write-back to contact {} failed: {}", owner_id, e),
    }
}
