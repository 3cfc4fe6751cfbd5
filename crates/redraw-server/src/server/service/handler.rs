//! HTTP surface of the service.
//!
//! - `POST /upload` - multipart `image` + `prompt`, answered with the URL of
//!   the published result.
//! - `GET /static/images/{filename}` - serves a published result.
//! - `GET /health` - liveness probe.
//!
//! Every failure is answered as `{"error": "<message>"}`: request problems
//! with `400`, pipeline problems with `500`.

use crate::server::service::coordinator::{Coordinator, Upload};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Request, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use redraw_core::{Error, naming};
use serde::Serialize;
use std::sync::Arc;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeFile,
    trace::TraceLayer,
};

/// Public prefix under which published images are served.
pub const IMAGES_ROUTE: &str = "/static/images";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub edited_image_url: String,
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    error: String,
}

/// Pipeline error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(coordinator: Arc<Coordinator>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(&format!("{IMAGES_ROUTE}/{{filename}}"), get(serve_image))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(coordinator)
}

/// Validates the upload and runs it through the pipeline.
///
/// The pipeline runs in its own task: a client that hangs up does not cancel
/// a request that already holds the lock.
#[tracing::instrument(skip_all)]
async fn upload_image(
    State(coordinator): State<Arc<Coordinator>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    // A body that is not multipart at all carries no image part.
    let multipart = multipart.map_err(|_| Error::MissingImage)?;
    let upload = read_upload(multipart).await?;

    let published = tokio::spawn(async move { coordinator.process(upload).await })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("upload task failed: {e}"))))??;

    Ok(Json(UploadResponse {
        edited_image_url: format!("{IMAGES_ROUTE}/{published}"),
    }))
}

/// Collects the `image` and `prompt` parts.
///
/// A part named `image` without a filename is not a file part and is ignored,
/// so it is reported the same way as a missing one.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, Error> {
    let invalid = |e: axum::extract::multipart::MultipartError| Error::InvalidUpload {
        reason: e.body_text(),
    };

    let mut image = None;
    let mut prompt = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let Some(filename) = field.file_name().map(str::to_owned) else {
                    continue;
                };
                let bytes = field.bytes().await.map_err(invalid)?;
                image = Some((filename, bytes));
            }
            Some("prompt") => prompt = Some(field.text().await.map_err(invalid)?),
            _ => {}
        }
    }

    let (filename, image) = image.ok_or(Error::MissingImage)?;
    let prompt = prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or(Error::MissingPrompt)?;
    if filename.is_empty() {
        return Err(Error::EmptyFilename);
    }

    Ok(Upload {
        filename,
        prompt,
        image,
    })
}

async fn serve_image(
    State(coordinator): State<Arc<Coordinator>>,
    Path(filename): Path<String>,
    req: Request,
) -> Response {
    if !naming::is_published_name(&filename) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let file = ServeFile::new(coordinator.output_dir().join(&filename));
    match file.oneshot(req).await {
        Ok(res) => res.into_response(),
        Err(never) => match never {},
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
