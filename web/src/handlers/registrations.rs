//! Registration and redemption endpoints, the core workflow.
//!
//! - `POST /api/registrations`: register a student for an event; idempotent
//!   per (student, event) pair.
//! - `POST /api/registrations/scan`: redeem a coupon on behalf of a
//!   volunteer; exactly-once under concurrency.

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use mess_coupon_core::error::CouponError;
use mess_coupon_core::store::Registration;
use mess_coupon_core::token::QrToken;
use mess_coupon_core::types::{
    EventId, RegistrationId, RegistrationStatus, SlotId, StudentId, VolunteerId,
};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to register a student for an event.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// The registering student.
    pub student_id: StudentId,
    /// The event to register for.
    pub event_id: EventId,
}

/// Response after a registration call.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// Human-readable outcome.
    pub message: String,
    /// The stable registration for this (student, event) pair.
    pub data: RegistrationData,
}

/// A registration row as rendered to clients.
#[derive(Debug, Serialize)]
pub struct RegistrationData {
    /// Primary key.
    pub registration_id: RegistrationId,
    /// The student holding the coupon.
    pub student_id: StudentId,
    /// The event the coupon is valid for.
    pub event_id: EventId,
    /// The assigned slot.
    pub slot_id: SlotId,
    /// One-time redemption token, rendered as QR client-side.
    pub qr_token: QrToken,
    /// Lifecycle status.
    pub status: RegistrationStatus,
    /// Redemption time in the canonical reporting timezone, if served.
    pub served_at: Option<DateTime<FixedOffset>>,
}

impl RegistrationData {
    fn render(registration: Registration, timezone: FixedOffset) -> Self {
        Self {
            registration_id: registration.registration_id,
            student_id: registration.student_id,
            event_id: registration.event_id,
            slot_id: registration.slot_id,
            qr_token: registration.qr_token,
            status: registration.status,
            served_at: registration
                .served_at
                .map(|at| at.with_timezone(&timezone)),
        }
    }
}

/// Request to redeem a coupon.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Raw token from the scanned QR code. Validated before any storage
    /// access; kept as a string so malformed input gets our 400, not a
    /// deserializer rejection.
    pub qr_token: String,
    /// The scanning volunteer.
    pub volunteer_id: VolunteerId,
}

/// Response after a successful scan.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    /// Human-readable outcome.
    pub message: String,
    /// The served student.
    pub student_id: StudentId,
    /// Student display name, for the volunteer UI.
    pub student_name: String,
    /// Student batch, when known.
    pub batch: Option<String>,
    /// Commit time of the served transition, in the canonical timezone.
    pub served_at: DateTime<FixedOffset>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a student for an event.
///
/// Idempotent: a repeat call returns the existing registration (200) instead
/// of creating a second one (201). A coupon that was already redeemed yields
/// 400 with `isRedeemed: true` so the client knows not to re-display any QR.
///
/// # Errors
///
/// See [`AppError`] mapping: unknown student/event and zero open slots are
/// 404s; storage failures are 500s.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let outcome = state
        .store
        .register(request.student_id, request.event_id)
        .await?;

    let (status, message) = if outcome.created {
        (StatusCode::CREATED, "Registration successful")
    } else {
        (StatusCode::OK, "Existing registration retrieved")
    };

    Ok((
        status,
        Json(RegisterResponse {
            message: message.to_string(),
            data: RegistrationData::render(outcome.registration, state.timezone),
        }),
    ))
}

/// Redeem a coupon on behalf of a volunteer.
///
/// The per-volunteer throttle is consulted before anything else, so every
/// attempt (malformed or not) counts against the window; the token format is
/// then checked before any storage access. Exactly-once redemption itself
/// comes from the storage layer's row lock, not from the throttle.
///
/// # Errors
///
/// See [`AppError`] mapping: malformed tokens are 400, unknown tokens and
/// volunteers 404, cross-event scans 403, repeat scans 409, throttled
/// requests 429.
pub async fn scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, AppError> {
    if !state
        .scan_limiter
        .check_and_record(request.volunteer_id.as_i64())
    {
        return Err(AppError::rate_limited(
            "Too many scan attempts, slow down",
        ));
    }

    let token = QrToken::parse(&request.qr_token).map_err(|_| {
        metrics::counter!("coupon.scans.rejected", "reason" => "malformed_token").increment(1);
        AppError::from(CouponError::MalformedToken)
    })?;

    let outcome = state.store.redeem(&token, request.volunteer_id).await?;

    Ok(Json(ScanResponse {
        message: "Scan successful".to_string(),
        student_id: outcome.student_id,
        student_name: outcome.student_name,
        batch: outcome.batch,
        served_at: to_canonical(outcome.served_at, state.timezone),
    }))
}

fn to_canonical(at: DateTime<Utc>, timezone: FixedOffset) -> DateTime<FixedOffset> {
    at.with_timezone(&timezone)
}
