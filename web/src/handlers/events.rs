//! Read-side event endpoints: listings, statistics, scan history.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use mess_coupon_core::store::{EventStats, EventSummary, StudentRegistration};
use mess_coupon_core::types::{EventId, EventStatus, RegistrationId, RegistrationStatus, StudentId};

use crate::error::AppError;
use crate::state::AppState;

/// Default and maximum scan-history page sizes.
const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

/// Query parameters for the active event listing.
#[derive(Debug, Deserialize)]
pub struct ListEventsParams {
    /// When given, each event is joined with this student's registration.
    pub student_id: Option<StudentId>,
}

/// An event as rendered in the active listing.
#[derive(Debug, Serialize)]
pub struct EventListing {
    /// Primary key.
    pub event_id: EventId,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: Option<String>,
    /// Event date in the canonical reporting timezone.
    pub date: DateTime<FixedOffset>,
    /// Lifecycle status.
    pub status: EventStatus,
    /// The requesting student's registration, if they have one.
    pub registration: Option<RegistrationListing>,
}

/// A student's own registration as rendered in the listing.
#[derive(Debug, Serialize)]
pub struct RegistrationListing {
    /// Primary key.
    pub registration_id: RegistrationId,
    /// Lifecycle status.
    pub status: RegistrationStatus,
    /// Redemption time in the canonical timezone, if served.
    pub served_at: Option<DateTime<FixedOffset>>,
    /// Assigned slot location.
    pub floor: String,
    /// Assigned slot counter.
    pub counter: String,
    /// Slot window start in the canonical timezone.
    pub time_start: DateTime<FixedOffset>,
    /// Slot window end in the canonical timezone.
    pub time_end: DateTime<FixedOffset>,
}

impl EventListing {
    fn render(event: EventSummary, timezone: FixedOffset) -> Self {
        Self {
            event_id: event.event_id,
            name: event.name,
            description: event.description,
            date: event.date.with_timezone(&timezone),
            status: event.status,
            registration: event
                .registration
                .map(|registration| RegistrationListing::render(registration, timezone)),
        }
    }
}

impl RegistrationListing {
    fn render(registration: StudentRegistration, timezone: FixedOffset) -> Self {
        Self {
            registration_id: registration.registration_id,
            status: registration.status,
            served_at: registration.served_at.map(|at| at.with_timezone(&timezone)),
            floor: registration.floor,
            counter: registration.counter,
            time_start: registration.time_start.with_timezone(&timezone),
            time_end: registration.time_end.with_timezone(&timezone),
        }
    }
}

/// List active events that still have at least one open slot.
///
/// All timestamps are rendered in the canonical reporting timezone, matching
/// the registration and scan responses.
///
/// # Errors
///
/// Returns 500 on storage failure.
pub async fn list_active_events(
    State(state): State<AppState>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<EventListing>>, AppError> {
    let events = state.store.active_events(params.student_id).await?;
    Ok(Json(
        events
            .into_iter()
            .map(|event| EventListing::render(event, state.timezone))
            .collect(),
    ))
}

/// Redemption statistics for one event.
///
/// # Errors
///
/// Returns 404 for an unknown event, 500 on storage failure.
pub async fn get_event_stats(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<EventStats>, AppError> {
    let stats = state.store.event_stats(EventId(event_id)).await?;
    Ok(Json(stats))
}

/// Query parameters for the scan history listing.
#[derive(Debug, Deserialize)]
pub struct ScanHistoryParams {
    /// Maximum entries to return; defaults to 50, capped at 500.
    pub limit: Option<i64>,
}

/// One scan history entry as rendered to clients.
#[derive(Debug, Serialize)]
pub struct ScanHistoryEntry {
    /// Served student's display name.
    pub student_name: String,
    /// Served student's batch, when known.
    pub batch: Option<String>,
    /// Scan time in the canonical reporting timezone.
    pub scanned_at: DateTime<FixedOffset>,
}

/// Scan history response.
#[derive(Debug, Serialize)]
pub struct ScanHistoryResponse {
    /// Most recent scans, newest first.
    #[serde(rename = "scanHistory")]
    pub scan_history: Vec<ScanHistoryEntry>,
}

/// Most recent scans of an event, newest first.
///
/// # Errors
///
/// Returns 500 on storage failure.
pub async fn get_scan_history(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Query(params): Query<ScanHistoryParams>,
) -> Result<Json<ScanHistoryResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let records = state.store.scan_history(EventId(event_id), limit).await?;

    Ok(Json(ScanHistoryResponse {
        scan_history: records
            .into_iter()
            .map(|record| ScanHistoryEntry {
                student_name: record.student_name,
                batch: record.batch,
                scanned_at: record.served_at.with_timezone(&state.timezone),
            })
            .collect(),
    }))
}
