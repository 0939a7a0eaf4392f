//! Upload slot signing.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use lapcmp_models::SignedUpload;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn default_content_type() -> String {
    "video/mp4".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SignUploadRequest {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

/// `POST /sign-upload`
pub async fn sign_upload(
    State(state): State<AppState>,
    Json(request): Json<SignUploadRequest>,
) -> ApiResult<Json<SignedUpload>> {
    if request.filename.trim().is_empty() {
        return Err(ApiError::validation("filename must not be empty"));
    }

    let signed = state
        .signer
        .sign_upload(&request.filename, &request.content_type)
        .await?;

    info!(key = %signed.key, "Issued upload slot");
    Ok(Json(signed))
}
