//! HTTP API tests against an in-memory coupon store.
//!
//! These exercise the web layer in isolation: status-code mapping, payload
//! contracts, pre-storage rejection of malformed tokens, and the scan
//! throttle. Transactional semantics live in the postgres crate's
//! integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use chrono::{Duration as ChronoDuration, FixedOffset, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use mess_coupon_core::error::CouponError;
use mess_coupon_core::store::{
    CouponStore, EventStats, EventSummary, RegisterOutcome, Registration, ScanOutcome, ScanRecord,
    StudentRegistration,
};
use mess_coupon_core::token::QrToken;
use mess_coupon_core::types::{
    EventId, EventStatus, RegistrationStatus, SlotId, StudentId, VolunteerId,
};
use mess_coupon_web::{AppState, ScanRateLimiter, build_router};

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct MemoryInner {
    students: HashMap<i64, String>,
    events: HashSet<i64>,
    open_slots: HashMap<i64, Vec<i64>>,
    volunteers: HashMap<i64, i64>,
    registrations: HashMap<(i64, i64), Registration>,
    next_registration_id: i64,
}

/// Fake store implementing the same contract as the Postgres backend,
/// sufficient for the web layer's behavior.
#[derive(Default)]
struct MemoryStore {
    inner: Mutex<MemoryInner>,
    /// Number of times `redeem` was invoked; lets tests assert malformed
    /// tokens never reach storage.
    redeem_calls: AtomicUsize,
}

impl MemoryStore {
    fn seed(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.students.insert(42, "Asha Nair".to_string());
        inner.events.insert(7);
        inner.events.insert(8);
        inner.open_slots.insert(7, vec![100]);
        // Event 8 exists but has no open slots.
        inner.open_slots.insert(8, vec![]);
        inner.volunteers.insert(1, 7); // assigned to event 7
        inner.volunteers.insert(2, 8); // assigned to event 8
        inner.next_registration_id = 1;
    }

    fn token_for(&self, student: i64, event: i64) -> QrToken {
        let inner = self.inner.lock().unwrap();
        inner.registrations[&(student, event)].qr_token.clone()
    }

    fn mark_served(&self, student: i64, event: i64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reg) = inner.registrations.get_mut(&(student, event)) {
            reg.status = RegistrationStatus::Served;
            reg.served_at = Some(Utc::now());
        }
    }

    fn registration_count(&self) -> usize {
        self.inner.lock().unwrap().registrations.len()
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn register(
        &self,
        student_id: StudentId,
        event_id: EventId,
    ) -> Result<RegisterOutcome, CouponError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.students.contains_key(&student_id.as_i64()) {
            return Err(CouponError::StudentNotFound(student_id));
        }
        if !inner.events.contains(&event_id.as_i64()) {
            return Err(CouponError::EventNotFound(event_id));
        }

        if let Some(existing) = inner
            .registrations
            .get(&(student_id.as_i64(), event_id.as_i64()))
        {
            if existing.status == RegistrationStatus::Served {
                return Err(CouponError::AlreadyRedeemed);
            }
            return Ok(RegisterOutcome {
                registration: existing.clone(),
                created: false,
            });
        }

        let slots = inner
            .open_slots
            .get(&event_id.as_i64())
            .cloned()
            .unwrap_or_default();
        let Some(&slot_id) = slots.first() else {
            return Err(CouponError::NoSlotsAvailable);
        };

        let registration = Registration {
            registration_id: inner.next_registration_id.into(),
            student_id,
            event_id,
            slot_id: SlotId(slot_id),
            qr_token: QrToken::generate(),
            status: RegistrationStatus::Registered,
            served_at: None,
        };
        inner.next_registration_id += 1;
        inner.registrations.insert(
            (student_id.as_i64(), event_id.as_i64()),
            registration.clone(),
        );

        Ok(RegisterOutcome {
            registration,
            created: true,
        })
    }

    async fn redeem(
        &self,
        token: &QrToken,
        volunteer_id: VolunteerId,
    ) -> Result<ScanOutcome, CouponError> {
        self.redeem_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();

        let key = inner
            .registrations
            .iter()
            .find(|(_, reg)| reg.qr_token == *token)
            .map(|(key, _)| *key)
            .ok_or(CouponError::TokenNotFound)?;

        let volunteer_event = *inner
            .volunteers
            .get(&volunteer_id.as_i64())
            .ok_or(CouponError::VolunteerNotFound(volunteer_id))?;

        let student_name = inner.students[&key.0].clone();
        let registration = inner.registrations.get_mut(&key).unwrap();

        if registration.event_id.as_i64() != volunteer_event {
            return Err(CouponError::WrongEventScope);
        }
        match registration.status {
            RegistrationStatus::Served => {
                return Err(CouponError::AlreadyServed { student_name });
            }
            RegistrationStatus::Cancelled => return Err(CouponError::RegistrationCancelled),
            RegistrationStatus::Registered => {}
        }

        let served_at = Utc::now();
        registration.status = RegistrationStatus::Served;
        registration.served_at = Some(served_at);

        Ok(ScanOutcome {
            registration_id: registration.registration_id,
            student_id: registration.student_id,
            student_name,
            batch: Some("2024".to_string()),
            served_at,
        })
    }

    async fn active_events(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<EventSummary>, CouponError> {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        Ok(vec![EventSummary {
            event_id: EventId(7),
            name: "Freshers Dinner".to_string(),
            description: None,
            date: now,
            status: EventStatus::Active,
            registration: student_id.and_then(|student| {
                inner
                    .registrations
                    .get(&(student.as_i64(), 7))
                    .map(|reg| StudentRegistration {
                        registration_id: reg.registration_id,
                        status: reg.status,
                        served_at: reg.served_at,
                        floor: "Ground".to_string(),
                        counter: "C1".to_string(),
                        time_start: now,
                        time_end: now + ChronoDuration::hours(2),
                    })
            }),
        }])
    }

    async fn event_stats(&self, event_id: EventId) -> Result<EventStats, CouponError> {
        if !self.inner.lock().unwrap().events.contains(&event_id.as_i64()) {
            return Err(CouponError::EventNotFound(event_id));
        }
        Ok(EventStats {
            total: 0,
            by_batch: vec![],
            by_volunteer: vec![],
        })
    }

    async fn scan_history(
        &self,
        _event_id: EventId,
        _limit: i64,
    ) -> Result<Vec<ScanRecord>, CouponError> {
        Ok(vec![])
    }

    async fn close_expired_events(&self) -> Result<u64, CouponError> {
        Ok(0)
    }
}

// ============================================================================
// Helpers
// ============================================================================

const IST_SECONDS: i32 = 330 * 60;

fn build_app(limit: u32) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    store.seed();
    let state = AppState::new(
        store.clone(),
        Arc::new(ScanRateLimiter::new(limit, Duration::from_secs(60))),
        FixedOffset::east_opt(IST_SECONDS).unwrap(),
    );
    (build_router(state), store)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn register_twice_returns_same_token_and_one_row() {
    let (app, store) = build_app(10);

    let first = app
        .clone()
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await;
    assert_eq!(first["message"], "Registration successful");
    assert_eq!(first["data"]["status"], "registered");
    let token = first["data"]["qr_token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 32);

    let second = app
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = body_json(second).await;
    assert_eq!(second["message"], "Existing registration retrieved");
    assert_eq!(second["data"]["qr_token"], token.as_str());

    assert_eq!(store.registration_count(), 1);
}

#[tokio::test]
async fn register_without_open_slots_is_404() {
    let (app, store) = build_app(10);

    let response = app
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 8}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "NO_SLOTS_AVAILABLE");

    assert_eq!(store.registration_count(), 0);
}

#[tokio::test]
async fn register_after_service_flags_redeemed() {
    let (app, store) = build_app(10);

    app.clone()
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();
    store.mark_served(42, 7);

    let response = app
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "ALREADY_REDEEMED");
    assert_eq!(body["isRedeemed"], true);
}

#[tokio::test]
async fn register_unknown_event_is_404() {
    let (app, _) = build_app(10);

    let response = app
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 999}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "EVENT_NOT_FOUND");
}

// ============================================================================
// Scanning
// ============================================================================

#[tokio::test]
async fn scan_serves_and_reports_student() {
    let (app, store) = build_app(10);

    app.clone()
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();
    let token = store.token_for(42, 7);

    let response = app
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": token.as_str(), "volunteer_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Scan successful");
    assert_eq!(body["student_id"], 42);
    assert_eq!(body["student_name"], "Asha Nair");
    assert_eq!(body["batch"], "2024");
    // Rendered in the canonical timezone (+05:30).
    assert!(body["served_at"].as_str().unwrap().ends_with("+05:30"));
}

#[tokio::test]
async fn malformed_token_rejected_before_storage() {
    let (app, store) = build_app(10);

    let response = app
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": "not-hex!", "volunteer_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");

    assert_eq!(store.redeem_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_token_is_404() {
    let (app, _) = build_app(10);

    let response = app
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": "00000000000000000000000000000000", "volunteer_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn cross_event_scan_is_forbidden() {
    let (app, store) = build_app(10);

    app.clone()
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();
    let token = store.token_for(42, 7);

    // Volunteer 2 is assigned to event 8.
    let response = app
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": token.as_str(), "volunteer_id": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["code"], "WRONG_EVENT_SCOPE");
}

#[tokio::test]
async fn second_scan_conflicts_with_student_name() {
    let (app, store) = build_app(10);

    app.clone()
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();
    let token = store.token_for(42, 7);

    let first = app
        .clone()
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": token.as_str(), "volunteer_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": token.as_str(), "volunteer_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["code"], "ALREADY_SERVED");
    assert_eq!(body["student_name"], "Asha Nair");
}

#[tokio::test]
async fn scan_throttle_returns_429() {
    let (app, store) = build_app(2);

    app.clone()
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();
    let token = store.token_for(42, 7);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/registrations/scan",
                &json!({"qr_token": token.as_str(), "volunteer_id": 1}),
            ))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let throttled = app
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": token.as_str(), "volunteer_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(throttled).await;
    assert_eq!(body["code"], "RATE_LIMITED");

    // Correctness did not depend on the throttle: the first scan served, the
    // second conflicted, storage saw exactly two attempts.
    assert_eq!(store.redeem_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn malformed_scans_count_against_throttle() {
    let (app, store) = build_app(1);

    let malformed = app
        .clone()
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": "nope", "volunteer_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    // The malformed attempt used up the budget.
    let throttled = app
        .oneshot(post_json(
            "/api/registrations/scan",
            &json!({"qr_token": "00000000000000000000000000000000", "volunteer_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(store.redeem_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Event listing
// ============================================================================

#[tokio::test]
async fn event_listing_renders_canonical_timezone() {
    let (app, _) = build_app(10);

    app.clone()
        .oneshot(post_json(
            "/api/registrations",
            &json!({"student_id": 42, "event_id": 7}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/events?student_id=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let event = &body[0];
    assert_eq!(event["event_id"], 7);
    assert!(event["date"].as_str().unwrap().ends_with("+05:30"));

    let registration = &event["registration"];
    assert_eq!(registration["status"], "registered");
    assert!(
        registration["time_start"]
            .as_str()
            .unwrap()
            .ends_with("+05:30")
    );
    assert!(
        registration["time_end"]
            .as_str()
            .unwrap()
            .ends_with("+05:30")
    );
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_endpoints_respond() {
    let (app, _) = build_app(10);

    let health = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let ready = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
    let body = body_json(ready).await;
    assert_eq!(body["ready"], true);
}
