use axum::{
    response::{IntoResponse, Response},
    Json,
};
use cyder_tools::log::error;
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::service::store::StoreError;

/// Every way a gateway request can end without an upstream success.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("{0}")]
    NotFound(String),

    #[error("no available route for model {0}")]
    NoEligibleRoute(String),

    /// The provider answered with a non-success status.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// The provider could not be reached or timed out.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The cause stays in the logs; clients only see the generic message.
    #[error("service unavailable")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        error!("Store failure: {}", err);
        GatewayError::ServiceUnavailable(err.to_string())
    }
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) | GatewayError::InsufficientBalance => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::NoEligibleRoute(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream { status, .. } => *status,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ServiceUnavailable(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn error_envelope_shape() {
        let response = GatewayError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "rate limited".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"error": "rate limited"}));
    }

    #[test]
    fn store_failures_map_to_service_unavailable() {
        let err: GatewayError = StoreError::Pool("timed out".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "service unavailable");
        assert_eq!(GatewayError::InsufficientBalance.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatewayError::NoEligibleRoute("gpt-4".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn store_failure_detail_stays_out_of_the_body() {
        let err: GatewayError =
            StoreError::Database("relation \"api_key\" does not exist".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"error": "service unavailable"}));
    }
}
