//! Axum HTTP layer for the mess coupon service.
//!
//! Exposes the registration and redemption workflow over two POST endpoints
//! plus read-side listings for dashboards. The handlers talk to storage only
//! through the [`mess_coupon_core::CouponStore`] trait, so this crate's tests
//! run against an in-memory fake without a database.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use rate_limit::ScanRateLimiter;
pub use routes::build_router;
pub use state::AppState;
