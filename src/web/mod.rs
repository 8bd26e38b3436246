// src/web/mod.rs

pub mod handlers;
pub mod services;
pub mod types;

pub use services::Services;
pub use types::*;

use crate::core::ConfigManager;
use anyhow::Result;
use rocket::data::{Data, ToByteUnit};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::fs::FileServer;
use rocket::http::{Header, Status};
use rocket::serde::json::Json;
use rocket::{catchers, get, options, post, routes, Build, Request, Response, Rocket, State};
use std::path::Path;
use tracing::{info, warn};

/// Mount point of the durable storage directory
pub const UPLOADS_MOUNT: &str = "/uploads";

/// Bot payloads carry free-text answers well past Rocket's 8 KiB string limit
const INTAKE_BODY_LIMIT_MIB: u64 = 1;

const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

// CORS Fairing
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
    }
}

/// Stored files never change once written
pub struct ImmutableUploads;

#[rocket::async_trait]
impl Fairing for ImmutableUploads {
    fn info(&self) -> Info {
        Info {
            name: "Long-lived cache headers for stored files",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let is_upload = request
            .uri()
            .path()
            .as_str()
            .starts_with(&format!("{}/", UPLOADS_MOUNT));
        if is_upload && response.status() == Status::Ok {
            response.set_header(Header::new("Cache-Control", IMMUTABLE_CACHE));
        }
    }
}

#[post("/webhook/intake", data = "<body>")]
pub async fn webhook_intake(body: Data<'_>, services: &State<Services>) -> IntakeResponse {
    let body = match body.open(INTAKE_BODY_LIMIT_MIB.mebibytes()).into_bytes().await {
        Ok(bytes) => {
            if !bytes.is_complete() {
                warn!("Intake body exceeds {} MiB, processing the truncated prefix", INTAKE_BODY_LIMIT_MIB);
            }
            String::from_utf8_lossy(&bytes.into_inner()).into_owned()
        }
        Err(e) => {
            warn!("Failed to read intake body: {}", e);
            String::new()
        }
    };
    handlers::intake_handler(body, services).await
}

#[post("/sweep", data = "<body>")]
pub async fn start_sweep(
    body: String,
    services: &State<Services>,
) -> Result<Json<ActionResponse>, (Status, Json<StandardErrorResponse>)> {
    handlers::start_sweep_handler(body, services).await
}

#[post("/sweep/cancel")]
pub async fn cancel_sweep(services: &State<Services>) -> Json<ActionResponse> {
    handlers::cancel_sweep_handler(services).await
}

#[get("/sweep/report")]
pub async fn sweep_report(services: &State<Services>) -> Json<DataResponse<SweepStatus>> {
    handlers::sweep_report_handler(services).await
}

#[get("/health")]
pub async fn health(services: &State<Services>) -> Json<TextResponse> {
    handlers::health_handler(services).await
}

#[options("/<_..>")]
pub async fn options() -> Status {
    Status::Ok
}

// Error catchers
#[rocket::catch(400)]
pub fn bad_request() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Invalid request format".to_string(),
        "BAD_REQUEST".to_string(),
        vec!["Check your request JSON format".to_string()],
    ))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Not found".to_string(),
        "NOT_FOUND".to_string(),
        vec![],
    ))
}

#[rocket::catch(500)]
pub fn internal_error() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Internal server error".to_string(),
        "INTERNAL_ERROR".to_string(),
        vec![
            "Try again in a few moments".to_string(),
            "Contact support if the problem persists".to_string(),
        ],
    ))
}

/// Assemble the server without launching it
pub fn build_rocket(services: Services, storage_dir: &Path, port: u16) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("port", port))
        .merge(("address", "0.0.0.0"));

    rocket::custom(figment)
        .attach(Cors)
        .attach(ImmutableUploads)
        .manage(services)
        .register("/api", catchers![bad_request, not_found, internal_error])
        .mount(
            "/api",
            routes![
                webhook_intake,
                start_sweep,
                cancel_sweep,
                sweep_report,
                health,
                options,
            ],
        )
        .mount(UPLOADS_MOUNT, FileServer::from(storage_dir))
}

// Main server start function
pub async fn start_web_server(config: ConfigManager) -> Result<()> {
    config.ensure_directories().await?;
    let services = Services::from_config(&config)?;

    info!("Starting file relay API server");
    info!("Storage: {}", config.environment.storage_dir.display());
    info!("Public base URL: {}", config.environment.public_base_url);
    info!("Server: http://0.0.0.0:{}", config.service.port);

    let _rocket = build_rocket(services, &config.environment.storage_dir, config.service.port)
        .launch()
        .await?;

    Ok(())
}
