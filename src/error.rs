//! Taxonomía de errores del dominio y su traducción a respuestas HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errores que pueden aparecer en análisis, combinación y persistencia.
#[derive(Debug, Error)]
pub enum AppError {
    /// Petición inválida (nombre vacío, selección vacía...). Nunca hay efectos laterales.
    #[error("Petición inválida: {0}")]
    Validation(String),

    #[error("No encontrado: {0}")]
    NotFound(String),

    /// Fallo de un colaborador externo (lectura de fichero o pasarela LLM).
    #[error("{0}")]
    Upstream(String),

    /// Registro persistido ilegible o incompleto.
    #[error("Datos corruptos: {0}")]
    CorruptData(String),

    #[error("Error de almacenamiento: {0}")]
    Storage(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::CorruptData(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Antepone `prefix` al mensaje conservando la variante.
    pub fn with_prefix(self, prefix: &str) -> AppError {
        match self {
            AppError::Validation(msg) => AppError::Validation(format!("{prefix}: {msg}")),
            AppError::NotFound(msg) => AppError::NotFound(format!("{prefix}: {msg}")),
            AppError::Upstream(msg) => AppError::Upstream(format!("{prefix}: {msg}")),
            AppError::CorruptData(msg) => AppError::CorruptData(format!("{prefix}: {msg}")),
            AppError::Storage(e) => {
                AppError::Storage(std::io::Error::new(e.kind(), format!("{prefix}: {e}")))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Error atendiendo la petición: {}", self);
        }
        (
            status,
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}
