//! HTTP handlers for the coupon service.

pub mod events;
pub mod health;
pub mod registrations;
