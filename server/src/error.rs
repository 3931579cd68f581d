//! Error types for the KYC registry server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::decryption::DecryptionError;

/// Failures of the registry operations.
///
/// Every variant is returned before any state changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unauthorized: caller is not the registry owner")]
    Unauthorized,

    #[error("KYC already submitted")]
    DuplicateSubmission,

    #[error("No KYC record found")]
    NoRecord,

    #[error("KYC is not in pending status")]
    InvalidTransition,

    #[error("Invalid input proof")]
    InvalidProof,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Proof verifier unavailable: {0}")]
    VerifierUnavailable(String),
}

impl RegistryError {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Unauthorized => "Unauthorized",
            RegistryError::DuplicateSubmission => "DuplicateSubmission",
            RegistryError::NoRecord => "NoRecord",
            RegistryError::InvalidTransition => "InvalidTransition",
            RegistryError::InvalidProof => "InvalidProof",
            RegistryError::InvalidArgument(_) => "InvalidArgument",
            RegistryError::VerifierUnavailable(_) => "VerifierUnavailable",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not available: {0}")]
    NotAvailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Registry(err) => {
                let status = match err {
                    RegistryError::Unauthorized => StatusCode::FORBIDDEN,
                    RegistryError::DuplicateSubmission => StatusCode::CONFLICT,
                    RegistryError::NoRecord => StatusCode::NOT_FOUND,
                    RegistryError::InvalidTransition => StatusCode::CONFLICT,
                    RegistryError::InvalidProof => StatusCode::UNAUTHORIZED,
                    RegistryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                    RegistryError::VerifierUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.kind())
            }
            AppError::Decryption(err) => match err {
                DecryptionError::NotAllowed(_) => (StatusCode::FORBIDDEN, "Unauthorized"),
                DecryptionError::Relayer(_) => (StatusCode::BAD_GATEWAY, "RelayerError"),
                _ => (StatusCode::BAD_REQUEST, "InvalidDecryptRequest"),
            },
            AppError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "DocumentNotFound"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            AppError::NotAvailable(_) => (StatusCode::NOT_FOUND, "NotAvailable"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let error_message = match &self {
            AppError::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
