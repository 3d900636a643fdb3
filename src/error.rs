use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::catalog::CatalogError;
use crate::query::InvalidQueryError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<InvalidQueryError> for ApiError {
    fn from(value: InvalidQueryError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        error!("Store error: {value}");
        ApiError::Internal("Failed to read the class catalog".into())
    }
}

impl From<CatalogError> for ApiError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::InvalidQuery(err) => err.into(),
            CatalogError::Store(err) => err.into(),
        }
    }
}
