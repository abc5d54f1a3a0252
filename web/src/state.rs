//! Application state shared across HTTP handlers.

use chrono::FixedOffset;
use std::sync::Arc;

use mess_coupon_core::store::CouponStore;

use crate::rate_limit::ScanRateLimiter;

/// Shared state cloned (cheaply via `Arc`) into every handler.
///
/// Holding the store as `Arc<dyn CouponStore>` keeps the handlers testable:
/// production wires in the Postgres store, tests wire in an in-memory fake.
#[derive(Clone)]
pub struct AppState {
    /// Coupon storage backend.
    pub store: Arc<dyn CouponStore>,

    /// Per-volunteer scan throttle.
    pub scan_limiter: Arc<ScanRateLimiter>,

    /// Canonical reporting timezone for rendered timestamps.
    pub timezone: FixedOffset,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn CouponStore>,
        scan_limiter: Arc<ScanRateLimiter>,
        timezone: FixedOffset,
    ) -> Self {
        Self {
            store,
            scan_limiter,
            timezone,
        }
    }
}
