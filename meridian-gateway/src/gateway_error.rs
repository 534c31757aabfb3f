//! HTTP-facing error wrapper for the operator surface (`/healthz`,
//! `/metrics`). Everything it wraps comes straight from
//! `meridian_router::error`; there is no gateway-local error category left
//! once the client-facing completions surface is gone.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use meridian_router::error::{GatewayError as RouterGatewayError, ProviderError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Router(#[from] RouterGatewayError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            GatewayError::Router(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.kind()),
            GatewayError::Provider(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.kind()),
        };
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": kind,
                "code": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_maps_to_500() {
        let error = GatewayError::Provider(ProviderError::ModelNotFound {
            model_id: "nope".to_string(),
        });
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
