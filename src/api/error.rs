//! JSON error responses for the HTTP API.

use crate::utils::error::{AgendaError, ErrorCategory};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// `{"sucesso": false, "erro": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub sucesso: bool,
    pub erro: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Upstream failure: {0}")]
    Upstream(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Upstream(detail) => {
                tracing::warn!(detail = %detail, "Upstream failure");
                (StatusCode::BAD_GATEWAY, detail)
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "API internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, detail)
            }
        };

        (
            status,
            Json(ErrorBody {
                sucesso: false,
                erro: message,
            }),
        )
            .into_response()
    }
}

impl From<AgendaError> for ApiError {
    fn from(err: AgendaError) -> Self {
        let message = err.user_friendly_message();
        match &err {
            AgendaError::NotFound { .. } | AgendaError::NoOpenSlot { .. } => {
                ApiError::NotFound(message)
            }
            AgendaError::CsvError(_) => {
                ApiError::BadRequest(format!("Erro ao processar planilha: {}", err))
            }
            _ => match err.category() {
                ErrorCategory::Input => ApiError::BadRequest(message),
                ErrorCategory::Network => ApiError::Upstream(message),
                ErrorCategory::Storage | ErrorCategory::Configuration => {
                    ApiError::Internal(message)
                }
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("JSON inválido: {}", rejection.body_text()))
    }
}
