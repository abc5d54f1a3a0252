//! Domain types and storage contract for the mess coupon service.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//!
//! - Identifier newtypes and lifecycle enums ([`types`])
//! - The one-time QR redemption token ([`token`])
//! - The error taxonomy every operation reports through ([`error`])
//! - The [`store::CouponStore`] trait, the seam between the HTTP layer and
//!   the relational backend
//!
//! It deliberately has no database or HTTP dependencies so the web layer can
//! be tested against an in-memory implementation of the store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod store;
pub mod token;
pub mod types;

pub use error::CouponError;
pub use store::CouponStore;
pub use token::QrToken;
