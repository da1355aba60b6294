use super::{AppError, AppResult, AppState};
use analyst_core::{stored_filename, FileInfo, FileRecord, UploadPolicy};
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Serialize)]
pub struct UploadResponse {
    message: String,
    file_id: String,
    file_info: FileInfo,
}

/// Stored bytes of the `file` field, not yet registered.
struct StoredUpload {
    filename: String,
    original_name: String,
    mimetype: String,
    size: u64,
    path: std::path::PathBuf,
}

/// `POST /api/upload`: multipart form with a `file` field and an optional
/// `source` text field.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut source: Option<String> = None;
    let mut stored: Option<StoredUpload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some(s) = &stored {
                    discard(&s.path).await;
                }
                return Err(AppError::bad_request(format!("Malformed upload: {}", e)));
            }
        };

        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") if stored.is_none() => match store_field(&state, field).await {
                Ok(upload) => stored = Some(upload),
                Err(e) => {
                    state.metrics.record_upload("rejected");
                    return Err(e);
                }
            },
            Some("source") => {
                source = field.text().await.ok().filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    let Some(upload) = stored else {
        state.metrics.record_upload("rejected");
        return Err(AppError::bad_request("No file uploaded"));
    };

    let record = FileRecord {
        filename: upload.filename,
        original_name: upload.original_name.clone(),
        size: upload.size,
        path: upload.path,
        mimetype: upload.mimetype.clone(),
        uploaded_at: Utc::now(),
        source: source.unwrap_or_else(|| "unknown".to_string()),
    };
    let file_id = record.key();

    if !state.orchestrator.files().put(record) {
        state.metrics.record_upload("rejected");
        return Err(AppError::bad_request(
            "File exceeds the total size allowed for uploaded files",
        ));
    }

    info!(
        "File uploaded: {} ({} bytes)",
        upload.original_name, upload.size
    );
    state.metrics.record_upload("accepted");

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        file_id,
        file_info: FileInfo {
            name: upload.original_name,
            size: upload.size,
            media_type: upload.mimetype,
        },
    }))
}

/// Check the name, then stream the field to disk under the size limit.
/// Nothing is left on disk when this fails.
async fn store_field(state: &AppState, field: Field<'_>) -> AppResult<StoredUpload> {
    let original_name = field
        .file_name()
        .map(str::to_owned)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    let mimetype = field
        .content_type()
        .map(str::to_owned)
        .unwrap_or_else(|| "application/octet-stream".to_string());

    if let Err(e) = state.upload_policy.check_name(&original_name) {
        warn!("Rejected upload {}: {}", original_name, e);
        return Err(e.into());
    }

    tokio::fs::create_dir_all(&state.upload_dir).await?;
    let filename = stored_filename(&original_name, Utc::now().timestamp_millis());
    let path = state.upload_dir.join(&filename);

    let size = match write_field(field, &path, &state.upload_policy).await {
        Ok(size) => size,
        Err(e) => {
            discard(&path).await;
            warn!("Rejected upload {}: {}", original_name, e.error);
            return Err(e);
        }
    };

    Ok(StoredUpload {
        filename,
        original_name,
        mimetype,
        size,
        path,
    })
}

async fn write_field(mut field: Field<'_>, path: &Path, policy: &UploadPolicy) -> AppResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::bad_request(format!("Malformed upload: {}", e)))?
    {
        size += chunk.len() as u64;
        policy.check_size(size)?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(size)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial upload {}: {}", path.display(), e);
        }
    }
}
