use crate::adapters::csv_store::parse_csv;
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::core::schedule::UploadOutcome;
use crate::domain::model::ScheduleSummary;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Local;
use serde::Serialize;

#[derive(Serialize)]
pub struct UploadResponse {
    pub sucesso: bool,
    pub mensagem: &'static str,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

/// `POST /api/upload-planilha`: multipart field `file` holding a `.csv`.
/// New slots are merged into the current schedule.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Upload inválido: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Upload inválido: {}", e)))?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Nenhum arquivo enviado".to_string()))?;
    if file_name.is_empty() || bytes.is_empty() {
        return Err(ApiError::BadRequest("Arquivo vazio".to_string()));
    }
    if !file_name.to_lowercase().ends_with(".csv") {
        return Err(ApiError::BadRequest(
            "Arquivo deve ser uma planilha CSV (.csv)".to_string(),
        ));
    }

    tracing::info!("Schedule upload: {} ({} bytes)", file_name, bytes.len());
    let grid = parse_csv(&bytes)?;
    let outcome = state.schedule.upload(grid).await?;

    Ok(Json(UploadResponse {
        sucesso: true,
        mensagem: "✅ Planilha adicionada com sucesso!",
        outcome,
    }))
}

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub summary: ScheduleSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mensagem: Option<&'static str>,
}

/// `GET /api/status-planilha`
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let summary = state.schedule.status().await?;
    Ok(Json(StatusResponse {
        mensagem: (!summary.loaded).then_some("Nenhuma planilha carregada"),
        summary,
    }))
}

/// `POST /api/limpar-planilha`
pub async fn clear(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.schedule.clear().await?;
    Ok(Json(serde_json::json!({
        "sucesso": true,
        "mensagem": "Planilha removida com sucesso"
    })))
}

/// `GET /api/download-planilha`
pub async fn download(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.schedule.export().await?;
    let file_name = format!(
        "planilha_consolidada_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    ))
}
