//! Typed errors per layer and HTTP mapping for callers that serve the metadata over axum.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Metadata store failures. These abort the remaining steps of a mutation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("row is not a JSON object: {0}")]
    NotAnObject(String),
    #[error("invalid field name: {0}")]
    InvalidField(String),
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Physical schema failures. Relation lifecycle steps log these and continue.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("foreign key not found on {table}.{column}")]
    ForeignKeyNotFound { table: String, column: String },
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Cache backend failures. Never surfaced past the entity cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("integrity: {0}")]
    Integrity(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MetaError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        MetaError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for MetaError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            MetaError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            MetaError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            MetaError::Integrity(_) => (StatusCode::UNPROCESSABLE_ENTITY, "integrity_error"),
            MetaError::Store(StoreError::Db(sqlx::Error::RowNotFound)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            MetaError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            MetaError::Schema(_) => (StatusCode::INTERNAL_SERVER_ERROR, "schema_error"),
            MetaError::Serde(_) => (StatusCode::INTERNAL_SERVER_ERROR, "serialize_error"),
        };
        let details = match &self {
            MetaError::NotFound { kind, id } => Some(serde_json::json!({ "kind": kind, "id": id })),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (MetaError::Validation("dup".into()), StatusCode::BAD_REQUEST),
            (MetaError::not_found("column", "cl_1"), StatusCode::NOT_FOUND),
            (MetaError::Integrity("no counterpart".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                MetaError::Store(StoreError::InvalidField("a;b".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
