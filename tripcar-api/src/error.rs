use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tripcar_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid webhook signature")]
    InvalidSignature,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Core(err) => core_status(err),
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Core(err) => err.code(),
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
        }
    }
}

fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::InvalidState(_) | CoreError::AlreadyPaid | CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::InvalidRange(_) => StatusCode::BAD_REQUEST,
        CoreError::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
        CoreError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Core(CoreError::Internal(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::from(CoreError::AlreadyPaid).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(CoreError::AmountMismatch { expected: 1, actual: 2 }).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::from(CoreError::InvalidRange("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidSignature.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_conflict_kinds_share_status_but_not_code() {
        let state = AppError::from(CoreError::InvalidState("x".into()));
        let paid = AppError::from(CoreError::AlreadyPaid);
        assert_eq!(state.status(), paid.status());
        assert_ne!(state.code(), paid.code());
    }
}
