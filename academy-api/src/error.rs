use std::collections::BTreeMap;
use async_graphql::ErrorExtensions;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use academy_core::CoreError;
use academy_offer::CouponError;
use academy_order::CheckoutError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{message}")]
    ValidationError {
        message: String,
        fields: BTreeMap<String, String>,
    },
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationError(_) => StatusCode::FORBIDDEN,
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFoundError(_) => StatusCode::NOT_FOUND,
            AppError::ConflictError(_) => StatusCode::CONFLICT,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::AuthenticationError(_) => "UNAUTHENTICATED",
            AppError::AuthorizationError(_) => "FORBIDDEN",
            AppError::ValidationError { .. } => "BAD_REQUEST",
            AppError::NotFoundError(_) => "NOT_FOUND",
            AppError::ConflictError(_) => "CONFLICT",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Message safe to show to the caller. Internal details only go to the log.
    fn public_message(&self) -> String {
        match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        }
    }

    fn fields(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            AppError::ValidationError { fields, .. } if !fields.is_empty() => Some(fields),
            _ => None,
        }
    }

    pub fn into_graphql(self) -> async_graphql::Error {
        let message = self.public_message();
        let status = i32::from(self.status().as_u16());
        let code = self.code();
        let fields = self.fields().cloned();

        async_graphql::Error::new(message).extend_with(|_, ext| {
            ext.set("code", code);
            ext.set("status", status);
            if let Some(fields) = fields.as_ref().and_then(|f| async_graphql::to_value(f).ok()) {
                ext.set("fields", fields);
            }
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.fields() {
            Some(fields) => json!({ "error": self.public_message(), "fields": fields }),
            None => json!({ "error": self.public_message() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError { message, fields } => AppError::ValidationError { message, fields },
            CoreError::IdentityError(msg) => AppError::AuthenticationError(msg),
            CoreError::NotFound(msg) => AppError::NotFoundError(msg),
            CoreError::Conflict(msg) => AppError::ConflictError(msg),
            CoreError::InternalError(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<CouponError> for AppError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::Store(msg) => AppError::InternalServerError(msg),
            other => AppError::ValidationError {
                message: "Not a valid promo code".to_string(),
                fields: BTreeMap::from([("code".to_string(), other.field_message().to_string())]),
            },
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Unauthorized(msg) => AppError::AuthenticationError(msg),
            CheckoutError::NotFound(msg) => AppError::NotFoundError(msg),
            CheckoutError::InvalidCart(msg) => AppError::ValidationError {
                message: msg,
                fields: BTreeMap::new(),
            },
            CheckoutError::Conflict(msg) => AppError::ConflictError(msg),
            CheckoutError::Coupon(e) => e.into(),
            CheckoutError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

/// Repository failures surface as internal errors.
pub fn internal(err: impl std::fmt::Display) -> AppError {
    AppError::InternalServerError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_error_is_field_error() {
        let err: AppError = CouponError::NotFound("NOPE".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        match &err {
            AppError::ValidationError { fields, .. } => {
                assert_eq!(fields["code"], "This coupon code is invalid");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_internal_message_is_hidden() {
        let err = AppError::InternalServerError("db down at 10.0.0.3".to_string());
        let gql = err.into_graphql();
        assert_eq!(gql.message, "Internal Server Error");
    }
}
