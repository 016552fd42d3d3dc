//! Response envelope and error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;
use crate::CommerceError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: message.into(), data: Some(data) }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None }
    }
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), CommerceError>;

pub fn ok<T: Serialize>(message: &str, data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::ok(message, data))))
}

pub fn created<T: Serialize>(message: &str, data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message, data))))
}

/// Marks a response produced from an unexpected failure.
#[derive(Clone, Copy, Debug)]
pub struct InternalError;

impl CommerceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ProductNotFound(_) | Self::OrderNotFound(_) | Self::CartNotFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } | Self::OutOfStock { .. } | Self::InvalidTransition { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::PaymentVerificationFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) | Self::MailQueue(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let internal = status.is_server_error();
        if internal {
            error!(error = %self, "request failed");
        }
        let mut response = (status, Json(ApiResponse::failure(self.to_string()))).into_response();
        if internal {
            response.extensions_mut().insert(InternalError);
        }
        response
    }
}

/// Replaces the body of internal-error responses; installed in production.
pub async fn redact_internal_errors(response: Response) -> Response {
    if response.extensions().get::<InternalError>().is_none() {
        return response;
    }
    (response.status(), Json(ApiResponse::failure("Internal server error"))).into_response()
}
