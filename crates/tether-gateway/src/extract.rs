//! Request body extractors.

use axum::extract::FromRequest;

use crate::error::ApiError;

/// A JSON request body.
///
/// Behaves like [`axum::Json`] but rejects malformed or mistyped bodies with
/// the gateway's own error format.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);
