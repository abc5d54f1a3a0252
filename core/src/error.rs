//! Error taxonomy for coupon operations.
//!
//! Every storage operation returns one of these variants; the web layer maps
//! them to HTTP status codes. Variants carry just enough context to render a
//! user message, never token values or another student's identifiers.

use thiserror::Error;

use crate::types::{EventId, StudentId, VolunteerId};

/// Failure modes of the registration and redemption workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    /// Token does not match the expected 32-hex-character format.
    /// Rejected before any storage access.
    #[error("malformed QR token")]
    MalformedToken,

    /// No registration carries this token.
    #[error("invalid QR token")]
    TokenNotFound,

    /// The scanning volunteer does not exist.
    #[error("volunteer {0} not found")]
    VolunteerNotFound(VolunteerId),

    /// The registering student does not exist.
    #[error("student {0} not found")]
    StudentNotFound(StudentId),

    /// The referenced event does not exist.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// Registration exists and was already redeemed; no QR must ever be
    /// re-displayed for it.
    #[error("coupon already redeemed")]
    AlreadyRedeemed,

    /// Scan hit a registration that was already served. Terminal; the student
    /// name lets the volunteer UI say who was served.
    #[error("{student_name} has already been served")]
    AlreadyServed {
        /// Display name of the student on the coupon.
        student_name: String,
    },

    /// Scan hit a registration cancelled by an administrator. Terminal.
    #[error("registration cancelled")]
    RegistrationCancelled,

    /// The volunteer is assigned to a different event than the scanned
    /// coupon. Guards against cross-event misuse when events run
    /// concurrently.
    #[error("volunteer may only scan coupons for their assigned event")]
    WrongEventScope,

    /// No slot of the event has an end time in the future; registration is
    /// closed.
    #[error("registration closed: no available slots or event has ended")]
    NoSlotsAvailable,

    /// The freshly minted token collided with an existing one. Negligible
    /// probability at 16 bytes of entropy; safe for the caller to retry.
    #[error("token collision, retry registration")]
    TokenCollision,

    /// Underlying storage failure.
    #[error("database error: {0}")]
    Database(String),
}

impl CouponError {
    /// Whether retrying the same call could succeed.
    ///
    /// Terminal rejections (already served, cancelled, wrong scope) stay
    /// terminal; only infrastructure hiccups and token collisions are worth
    /// retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TokenCollision | Self::Database(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_are_not_retryable() {
        assert!(
            !CouponError::AlreadyServed {
                student_name: "Asha".into()
            }
            .is_retryable()
        );
        assert!(!CouponError::WrongEventScope.is_retryable());
        assert!(!CouponError::RegistrationCancelled.is_retryable());
    }

    #[test]
    fn infrastructure_errors_are_retryable() {
        assert!(CouponError::TokenCollision.is_retryable());
        assert!(CouponError::Database("connection reset".into()).is_retryable());
    }

    #[test]
    fn messages_do_not_leak_tokens() {
        let message = CouponError::TokenNotFound.to_string();
        assert_eq!(message, "invalid QR token");
    }
}
