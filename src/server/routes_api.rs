use crate::conversion::{abort_conversion, check_tools, AbortError};
use crate::quality::{available_quality_settings, is_valid_quality_name};
use crate::server::AppContext;
use crate::state::{ConversionJob, ConversionStatus, ConversionSummary};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/conversions", post(submit_conversion))
        .route("/conversions/active", get(active_conversions))
        .route("/conversions/:id", get(get_conversion))
        .route("/conversions/:id/abort", post(abort))
        .route("/qualities", get(qualities))
        .route("/tools", get(tools))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    /// Name of a previously uploaded file in the uploads directory.
    filename: String,
    format: String,
    #[serde(default)]
    quality: String,
    #[serde(default)]
    reverse: bool,
    #[serde(default)]
    mute: bool,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    id: String,
}

const SUPPORTED_FORMATS: &[&str] = &["mp4", "webm", "mov", "mkv", "avi"];

async fn submit_conversion(
    State(ctx): State<AppContext>,
    Json(req): Json<SubmitRequest>,
) -> impl IntoResponse {
    // Strip any path components from the submitted name.
    let Some(filename) = std::path::Path::new(&req.filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
    else {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid filename");
    };

    if !SUPPORTED_FORMATS.contains(&req.format.as_str()) {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("Unsupported target format: {}", req.format),
        );
    }

    if !req.quality.is_empty() && !is_valid_quality_name(&req.quality) {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("Unknown quality: {}", req.quality),
        );
    }

    let input_path = ctx.config.conversion.uploads_dir.join(&filename);
    if !input_path.is_file() {
        return error_response(StatusCode::NOT_FOUND, "Uploaded file not found");
    }

    let stem = std::path::Path::new(&filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.clone());
    let id = Uuid::new_v4().to_string();
    let output_path = ctx
        .config
        .conversion
        .output_dir
        .join(format!("{stem}-{id}.{}", req.format));

    let job = ConversionJob {
        id: id.clone(),
        source_url: None,
        original_filename: filename.clone(),
        format: req.format.clone(),
        quality: req.quality.clone(),
        input_path: input_path.clone(),
        output_path: output_path.clone(),
        reverse: req.reverse,
        mute: req.mute,
    };

    // Status first so pollers and event subscribers see the job as soon as
    // it is queued.
    ctx.store.set_status(
        &id,
        ConversionStatus::new(&filename, input_path, output_path, &req.format, &req.quality),
    );

    if let Err(e) = ctx.pool.queue_job(job) {
        // Roll back the status the failed submission created.
        ctx.store.delete_status(&id);
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string());
    }

    tracing::info!(conversion_id = %id, file = %filename, "Conversion queued");
    (StatusCode::ACCEPTED, Json(SubmitResponse { id })).into_response()
}

async fn get_conversion(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match ctx.store.get_status(&id) {
        Some(status) => Json(ConversionSummary::from_status(&id, &status)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Conversion not found"),
    }
}

async fn active_conversions(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.store.get_active_conversions_info())
}

async fn abort(State(ctx): State<AppContext>, Path(id): Path<String>) -> impl IntoResponse {
    match abort_conversion(&ctx.store, &id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            let status = match &e {
                AbortError::NotFound | AbortError::ProcessNotFound => StatusCode::NOT_FOUND,
                AbortError::AlreadyComplete => StatusCode::CONFLICT,
                AbortError::Signal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, &e.to_string())
        }
    }
}

async fn qualities() -> impl IntoResponse {
    Json(available_quality_settings())
}

async fn tools(State(ctx): State<AppContext>) -> impl IntoResponse {
    let settings = crate::conversion::EncoderSettings {
        ffmpeg_path: ctx.config.conversion.ffmpeg_path.clone(),
        exiftool_path: ctx.config.conversion.exiftool_path.clone(),
        copy_metadata: ctx.config.conversion.copy_metadata,
    };
    let statuses: Vec<_> = check_tools(&settings)
        .into_iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "available": t.available,
                "path": t.path,
            })
        })
        .collect();
    Json(statuses)
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
