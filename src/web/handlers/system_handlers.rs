// src/web/handlers/system_handlers.rs
use crate::web::services::Services;
use crate::web::types::TextResponse;

use rocket::serde::json::Json;
use rocket::State;
use tracing::debug;

pub async fn health_handler(services: &State<Services>) -> Json<TextResponse> {
    debug!("Health check");
    let crm = if services.crm.is_some() { "configured" } else { "disabled" };
    Json(TextResponse::success(format!("OK (crm {})", crm)))
}
