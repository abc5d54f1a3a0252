//! The storage contract between the HTTP layer and the relational backend.
//!
//! [`CouponStore`] is the seam at which the web layer is testable: handlers
//! hold an `Arc<dyn CouponStore>`, production wires in the Postgres
//! implementation, tests wire in an in-memory fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CouponError;
use crate::token::QrToken;
use crate::types::{
    EventId, EventStatus, RegistrationId, RegistrationStatus, SlotId, StudentId, VolunteerId,
};

/// A registration (coupon) row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Primary key.
    pub registration_id: RegistrationId,
    /// The student holding the coupon.
    pub student_id: StudentId,
    /// The event the coupon is valid for.
    pub event_id: EventId,
    /// The randomly assigned slot.
    pub slot_id: SlotId,
    /// One-time redemption token.
    pub qr_token: QrToken,
    /// Lifecycle status.
    pub status: RegistrationStatus,
    /// When the coupon was redeemed; `None` until served.
    pub served_at: Option<DateTime<Utc>>,
}

/// Result of a registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOutcome {
    /// The stable registration for this (student, event) pair.
    pub registration: Registration,
    /// `true` when this call inserted the row; `false` when an existing,
    /// unserved registration was retrieved (repeat calls are
    /// side-effect-free).
    pub created: bool,
}

/// Result of a successful scan: the served transition committed, one audit
/// row recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Registration that transitioned to served.
    pub registration_id: RegistrationId,
    /// The served student, for volunteer UI feedback.
    pub student_id: StudentId,
    /// Student display name.
    pub student_name: String,
    /// Student batch (admission year), when known.
    pub batch: Option<String>,
    /// Commit time of the served transition, UTC.
    pub served_at: DateTime<Utc>,
}

/// An event as listed to students, optionally joined with the requesting
/// student's own registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Primary key.
    pub event_id: EventId,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: Option<String>,
    /// Event date.
    pub date: DateTime<Utc>,
    /// Lifecycle status.
    pub status: EventStatus,
    /// The requesting student's registration, if they have one.
    pub registration: Option<StudentRegistration>,
}

/// A student's own registration as shown in event listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRegistration {
    /// Primary key.
    pub registration_id: RegistrationId,
    /// Lifecycle status.
    pub status: RegistrationStatus,
    /// When the coupon was redeemed, if it was.
    pub served_at: Option<DateTime<Utc>>,
    /// Assigned slot location.
    pub floor: String,
    /// Assigned slot counter.
    pub counter: String,
    /// Slot window start.
    pub time_start: DateTime<Utc>,
    /// Slot window end.
    pub time_end: DateTime<Utc>,
}

/// Redemption statistics for one event, computed from the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    /// Total successful scans.
    pub total: i64,
    /// Scans grouped by student batch.
    pub by_batch: Vec<BatchCount>,
    /// Scans grouped by scanning volunteer.
    pub by_volunteer: Vec<VolunteerCount>,
}

/// Scan count for one student batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCount {
    /// Batch label; `None` groups students without a parsed batch.
    pub batch: Option<String>,
    /// Number of scans.
    pub count: i64,
}

/// Scan count for one volunteer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolunteerCount {
    /// Volunteer display name.
    pub volunteer_name: String,
    /// Number of scans.
    pub count: i64,
}

/// One entry in an event's recent scan history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Served student's display name.
    pub student_name: String,
    /// Served student's batch, when known.
    pub batch: Option<String>,
    /// When the scan committed, UTC.
    pub served_at: DateTime<Utc>,
}

/// Storage operations of the coupon service.
///
/// Implementations own all durable state; the operations themselves are
/// stateless between calls. See the postgres crate for the concurrency
/// contract each method upholds.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Produce the single stable registration for `(student_id, event_id)`,
    /// creating it with a random open slot and a fresh token when none
    /// exists.
    ///
    /// Repeat calls return the existing row unchanged. Exactly one row is
    /// inserted on the creation path; zero rows on every failure path.
    ///
    /// # Errors
    ///
    /// - [`CouponError::StudentNotFound`] / [`CouponError::EventNotFound`]
    ///   when an identity references no row
    /// - [`CouponError::AlreadyRedeemed`] when the existing registration was
    ///   already served
    /// - [`CouponError::NoSlotsAvailable`] when no slot ends in the future
    /// - [`CouponError::TokenCollision`] / [`CouponError::Database`] on
    ///   retry-worthy storage failures
    async fn register(
        &self,
        student_id: StudentId,
        event_id: EventId,
    ) -> Result<RegisterOutcome, CouponError>;

    /// Atomically redeem `token` on behalf of `volunteer_id`.
    ///
    /// The whole read-validate-write sequence runs in one transaction holding
    /// a row-level exclusive lock on the registration, so concurrent scans of
    /// the same token are strictly ordered: exactly one observes the
    /// `registered -> served` transition, the rest observe
    /// [`CouponError::AlreadyServed`]. On any failure the transaction rolls
    /// back entirely, so a served status without an audit row is never
    /// observable.
    ///
    /// # Errors
    ///
    /// - [`CouponError::TokenNotFound`] when no registration carries the token
    /// - [`CouponError::VolunteerNotFound`] when the volunteer is unknown
    /// - [`CouponError::WrongEventScope`] when the volunteer is assigned to a
    ///   different event
    /// - [`CouponError::AlreadyServed`] / [`CouponError::RegistrationCancelled`]
    ///   on terminal registration states
    /// - [`CouponError::Database`] on storage failure (rolled back)
    async fn redeem(
        &self,
        token: &QrToken,
        volunteer_id: VolunteerId,
    ) -> Result<ScanOutcome, CouponError>;

    /// List active events that still have at least one open slot, joined with
    /// `student_id`'s registration when given.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Database`] on storage failure.
    async fn active_events(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<EventSummary>, CouponError>;

    /// Redemption statistics for one event.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::EventNotFound`] for an unknown event,
    /// [`CouponError::Database`] on storage failure.
    async fn event_stats(&self, event_id: EventId) -> Result<EventStats, CouponError>;

    /// Most recent served registrations of an event, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Database`] on storage failure.
    async fn scan_history(
        &self,
        event_id: EventId,
        limit: i64,
    ) -> Result<Vec<ScanRecord>, CouponError>;

    /// Close active events whose every slot has ended. Returns the number of
    /// events closed.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Database`] on storage failure.
    async fn close_expired_events(&self) -> Result<u64, CouponError>;
}
