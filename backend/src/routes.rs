use std::path::PathBuf;

use actix_files::{Files, NamedFile};
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use futures::TryStreamExt;
use log::{error, info, warn};
use serde_json::json;
use shared::ErrorResponse;
use uuid::Uuid;

use crate::classifier::{ClassifyError, Pipeline};

/// Shared, read-only state handed to every worker.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub max_upload_bytes: usize,
    pub static_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image file in request")]
    MissingFile,
    #[error("Upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("Malformed multipart payload: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("Classification worker failed: {0}")]
    Worker(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Classify(ClassifyError::Decode(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Classify(ClassifyError::Inference(_)) | ApiError::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: PathBuf) {
    cfg.service(web::resource("/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/api/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/").route(web::get().to(index)))
        .service(Files::new("/static", static_dir));
}

async fn handle_predict(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let image = read_image_field(&mut payload, state.max_upload_bytes).await?;
    info!("[{}] Received image of {} bytes", request_id, image.len());

    let pipeline = state.pipeline.clone();
    let outcome = web::block(move || pipeline.classify(&image))
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))?;

    match outcome {
        Ok(result) => {
            info!(
                "[{}] {} ({:.2}%) in {} ms",
                request_id, result.label, result.confidence, result.processing_time_ms
            );
            Ok(HttpResponse::Ok().json(result))
        }
        Err(e) => {
            match &e {
                ClassifyError::Decode(err) => warn!("[{}] Rejected upload: {}", request_id, err),
                ClassifyError::Inference(err) => error!("[{}] Inference failed: {}", request_id, err),
            }
            Err(e.into())
        }
    }
}

/// Returns the `file` field, or else the first field carrying a filename.
async fn read_image_field(payload: &mut Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut fallback = None;

    while let Some(mut field) = payload.try_next().await? {
        let is_file = field.name() == Some("file");
        let has_filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .is_some();
        let data = read_field(&mut field, limit).await?;

        if is_file {
            fallback = Some(data);
            break;
        }
        if has_filename && fallback.is_none() {
            fallback = Some(data);
        }
    }

    fallback
        .filter(|data| !data.is_empty())
        .ok_or(ApiError::MissingFile)
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if data.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge(limit));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "device": state.pipeline.device_name(),
    }))
}

async fn index(state: web::Data<AppState>) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open_async(state.static_dir.join("index.html")).await?)
}
