//! File uploads and blob download.
//!
//! `POST /api/user/upload_image` takes a multipart body with `file`,
//! `upload_binary_type` and `type`. Blobs are served back from
//! `GET /files/{bucket}/{*path}`.

use super::{ApiError, ApiPath, ApiResult, AppState, AuthUser, now};
use axum::{
    Json, Router,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use connectup_core::uploads::{
    self, BinaryType, NewUpload, UPLOADS_BUCKET, URL_TTL_DAYS, UploadResponse,
};
use std::time::Duration;
use tracing::info;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn file_routes() -> Router<AppState> {
    Router::new().route("/files/{bucket}/{*path}", get(download))
}

#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(String, Vec<u8>, Option<String>)>,
    binary_type: Option<String>,
    kind: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::rejection(e.status(), e.body_text()))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::rejection(e.status(), e.body_text()))?;
                form.file = Some((filename, bytes.to_vec(), content_type));
            }
            "upload_binary_type" => {
                form.binary_type = Some(field.text().await.map_err(|e| ApiError::rejection(e.status(), e.body_text()))?);
            }
            "type" => {
                form.kind = Some(field.text().await.map_err(|e| ApiError::rejection(e.status(), e.body_text()))?);
            }
            _ => {}
        }
    }
    Ok(form)
}

pub async fn upload(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let multipart = multipart.map_err(|e| ApiError::rejection(e.status(), e.body_text()))?;
    let form = read_form(multipart).await?;
    let binary = BinaryType::parse(form.binary_type.as_deref().unwrap_or_default().trim())?;
    let (filename, bytes, declared_type) = form
        .file
        .ok_or_else(|| ApiError::bad_request("file is required"))?;
    let sniffed = uploads::check_content(binary, &bytes)?;
    let content_type = sniffed
        .map(|f| f.content_type().to_string())
        .or(declared_type)
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let now = now();
    let kind = form.kind.unwrap_or_default();
    let path = uploads::storage_path(binary, &kind, &filename, now);
    let size = bytes.len();
    state
        .blobs
        .put(UPLOADS_BUCKET, &path, bytes, &content_type)
        .await?;

    let ttl_days = u64::try_from(URL_TTL_DAYS).unwrap_or_default();
    let url = state.blobs.shareable_url(
        UPLOADS_BUCKET,
        &path,
        Duration::from_secs(ttl_days.saturating_mul(SECONDS_PER_DAY)),
    );
    let record = NewUpload {
        name: uploads::sanitize_filename(&filename),
        path,
        kind,
        binary_type: binary,
        url,
        url_expires_at: now + chrono::Duration::days(URL_TTL_DAYS),
        uploaded_by: ctx.id,
    };
    let upload = state.write(|tx| uploads::record_upload(tx, record, now))?;
    info!(user = %ctx.id, upload = %upload.id, size, path = %upload.path, "file uploaded");
    Ok(Json(UploadResponse::from(&upload)))
}

async fn download(
    State(state): State<AppState>,
    ApiPath((bucket, path)): ApiPath<(String, String)>,
) -> ApiResult<Response> {
    let bytes = state.blobs.get(&bucket, &path).await?;
    let content_type = uploads::sniff_image(&bytes)
        .map_or(DEFAULT_CONTENT_TYPE, |f| f.content_type());
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
