use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};

use crate::auth::RequireParticipant;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse};
use crate::service::collaboration;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

struct Upload {
    file_name: String,
    content_type: String,
    data: Vec<u8>,
}

async fn parse_multipart_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("File name is required"))?;
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

        return Ok(Upload {
            file_name,
            content_type,
            data: data.to_vec(),
        });
    }

    Err(ApiError::bad_request("File field is required"))
}

pub async fn upload(
    RequireParticipant(ctx): RequireParticipant,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    ctx.ensure_session(&id)?;

    let upload = parse_multipart_upload(&mut multipart).await?;
    let attachment = collaboration::upload_attachment(
        state.store.as_ref(),
        &state.attachments,
        &ctx,
        &upload.file_name,
        &upload.content_type,
        &upload.data,
    )
    .await?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(attachment))))
}

pub async fn download(
    RequireParticipant(ctx): RequireParticipant,
    State(state): State<Arc<AppState>>,
    Path((id, attachment_id)): Path<(String, String)>,
) -> impl IntoResponse {
    ctx.ensure_session(&id)?;

    let (attachment, data) = collaboration::download_attachment(
        state.store.as_ref(),
        &state.attachments,
        &ctx,
        &attachment_id,
    )
    .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&attachment.content_type)
            .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment.file_name.replace(['"', '\\', '\r', '\n'], "_")
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok::<_, ApiError>((StatusCode::OK, headers, data))
}
