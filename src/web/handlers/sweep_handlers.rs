// src/web/handlers/sweep_handlers.rs
use crate::error::SweepError;
use crate::sweep::SweepOptions;
use crate::types::FieldName;
use crate::web::services::Services;
use crate::web::types::*;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use std::str::FromStr;
use tracing::{info, warn};

type ApiError = (Status, Json<StandardErrorResponse>);

fn api_error(status: Status, error: String, code: &str, suggestions: Vec<String>) -> ApiError {
    (
        status,
        Json(StandardErrorResponse::new(error, code.to_string(), suggestions)),
    )
}

fn parse_fields(names: &[String], defaults: &[FieldName]) -> Result<Vec<FieldName>, ApiError> {
    if names.is_empty() {
        return Ok(defaults.to_vec());
    }
    names
        .iter()
        .map(|name| {
            FieldName::from_str(name).map_err(|_| {
                api_error(
                    Status::BadRequest,
                    format!("Unknown file field: {}", name),
                    "UNKNOWN_FIELD",
                    vec![format!(
                        "Use one of: {}",
                        FieldName::ALL.map(|f| f.as_str()).join(", ")
                    )],
                )
            })
        })
        .collect()
}

/// An empty body means defaults; anything else must decode
fn parse_request(body: &str) -> Result<SweepRequest, ApiError> {
    if body.trim().is_empty() {
        return Ok(SweepRequest::default());
    }
    serde_json::from_str(body).map_err(|e| {
        warn!("Rejected sweep request: {}", e);
        api_error(
            Status::BadRequest,
            format!("Invalid sweep request: {}", e),
            "INVALID_SWEEP_REQUEST",
            vec![
                "Send {\"fields\": [...], \"filter\": {...}, \"dry_run\": bool}".to_string(),
                "Send an empty body to sweep the tracked fields".to_string(),
            ],
        )
    })
}

pub async fn start_sweep_handler(
    body: String,
    services: &State<Services>,
) -> Result<Json<ActionResponse>, ApiError> {
    let Some(runner) = services.runner.as_ref() else {
        return Err(api_error(
            Status::ServiceUnavailable,
            "CRM is not configured".to_string(),
            "CRM_NOT_CONFIGURED",
            vec!["Set CRM_WEBHOOK_URL and restart the service".to_string()],
        ));
    };

    let request = parse_request(&body)?;
    let fields = parse_fields(&request.fields, &services.tracked_fields)?;
    let options = SweepOptions::default()
        .with_filter(request.filter)
        .dry_run(request.dry_run);

    match runner.spawn(fields.clone(), options) {
        Ok(_) => {
            info!("Sweep started over {:?} (dry_run={})", fields, request.dry_run);
            Ok(Json(
                ActionResponse::success(
                    format!("Sweep started over {} fields", fields.len()),
                    "sweep_started".to_string(),
                )
                .with_next_actions(vec![
                    "GET /api/sweep/report".to_string(),
                    "POST /api/sweep/cancel".to_string(),
                ]),
            ))
        }
        Err(SweepError::AlreadyRunning) => Err(api_error(
            Status::Conflict,
            "A sweep is already running".to_string(),
            "SWEEP_RUNNING",
            vec!["Wait for it to finish or cancel it first".to_string()],
        )),
        Err(e) => {
            warn!("Sweep could not start: {}", e);
            Err(api_error(
                Status::BadRequest,
                e.to_string(),
                "SWEEP_REJECTED",
                vec!["Check the CRM field mapping in config.yaml".to_string()],
            ))
        }
    }
}

pub async fn cancel_sweep_handler(services: &State<Services>) -> Json<ActionResponse> {
    let cancelled = match services.runner.as_ref() {
        Some(runner) => runner.cancel().await,
        None => false,
    };

    let message = if cancelled {
        "Cancellation requested"
    } else {
        "No sweep is running"
    };
    Json(ActionResponse::success(
        message.to_string(),
        "sweep_cancel".to_string(),
    ))
}

pub async fn sweep_report_handler(services: &State<Services>) -> Json<DataResponse<SweepStatus>> {
    let (running, last_report) = match services.runner.as_ref() {
        Some(runner) => (runner.is_running(), runner.last_report().await),
        None => (false, None),
    };

    let message = match (&last_report, running) {
        (_, true) => "Sweep in progress",
        (Some(_), false) => "Last sweep report",
        (None, false) => "No sweep has finished yet",
    };

    Json(DataResponse::success(
        message.to_string(),
        SweepStatus {
            running,
            last_report,
        },
    ))
}
