pub mod models;
pub mod checkout;

pub use models::{CheckoutRequest, EnrollmentReceipt, Quote};
pub use checkout::CheckoutService;

use academy_offer::CouponError;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid cart: {0}")]
    InvalidCart(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("Checkout failed: {0}")]
    Internal(String),
}

impl CheckoutError {
    pub(crate) fn internal(err: impl std::fmt::Display) -> Self {
        CheckoutError::Internal(err.to_string())
    }
}
