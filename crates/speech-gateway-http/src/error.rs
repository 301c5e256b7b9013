//! HTTP error mapping.
//!
//! Every failure leaves as `{ "message": ..., "code": ... }` with a status
//! derived from the service taxonomy: client faults are 4xx, collaborator
//! and internal faults are 5xx.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use speech_gateway_service::ServiceError;
use speech_gateway_service::admission::RejectReason;
use utoipa::ToSchema;

/// Error type returned by handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// No route matched.
    #[error("not found")]
    NotFound,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable description.
    pub message: String,
    /// Stable error code (e.g. "invalid-input", "route-quota-exceeded").
    pub code: String,
}

fn status_of(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ServiceError::Forbidden { reason, .. } => match reason {
            RejectReason::BlockedByAllowList => StatusCode::FORBIDDEN,
            RejectReason::DailyQuotaExceeded | RejectReason::RouteQuotaExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
        },
        ServiceError::InputTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        ServiceError::NoSpeechDetected => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::TranscodeFailed(_)
        | ServiceError::RecognitionFailed { .. }
        | ServiceError::SynthesisFailed(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::NotFound => {
                let body = ErrorBody {
                    message: "not found".to_string(),
                    code: "not-found".to_string(),
                };
                return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
            }
            ApiError::Service(err) => err,
        };

        let status = status_of(&err);
        let message = match &err {
            ServiceError::Internal(msg) => {
                tracing::error!(%msg, "internal server error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            message,
            code: err.code().to_string(),
        };
        let mut response = (status, axum::Json(body)).into_response();

        if let ServiceError::Forbidden {
            retry_after: Some(wait),
            ..
        } = err
        {
            // Round up so clients never retry a moment too early.
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn quota_rejection_sets_retry_after() {
        let err = ApiError::from(ServiceError::Forbidden {
            reason: RejectReason::RouteQuotaExceeded,
            retry_after: Some(Duration::from_millis(12_300)),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "13");
        let body = body_json(response).await;
        assert_eq!(body["code"], "route-quota-exceeded");
    }

    #[tokio::test]
    async fn allow_list_rejection_is_forbidden() {
        let response = ApiError::from(ServiceError::Forbidden {
            reason: RejectReason::BlockedByAllowList,
            retry_after: None,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[tokio::test]
    async fn internal_detail_is_withheld() {
        let response =
            ApiError::from(ServiceError::Internal("disk /var/tmp full".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "internal-error");
        assert!(!body["message"].as_str().unwrap().contains("/var/tmp"));
    }

    #[test]
    fn collaborator_faults_are_5xx() {
        for err in [
            ServiceError::TranscodeFailed("x".into()),
            ServiceError::RecognitionFailed {
                code: "500".into(),
                detail: "x".into(),
            },
            ServiceError::SynthesisFailed("x".into()),
        ] {
            assert!(status_of(&err).is_server_error());
            assert!(!err.is_client_fault());
        }
        for err in [
            ServiceError::InvalidInput("x".into()),
            ServiceError::InputTooLarge("x".into()),
            ServiceError::NoSpeechDetected,
        ] {
            assert!(status_of(&err).is_client_error());
            assert!(err.is_client_fault());
        }
    }
}
