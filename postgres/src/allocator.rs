//! Registration allocation: one stable coupon per (student, event).
//!
//! The allocator is deliberately lock-free. The idempotency lookup is a
//! best-effort guard; the composite uniqueness constraint on
//! `(student_id, event_id)` is what actually closes the race between two
//! simultaneous first-time registrations; the loser's constraint violation
//! is mapped back to the "existing registration" path.

use rand::Rng;
use tracing::{info, warn};

use mess_coupon_core::error::CouponError;
use mess_coupon_core::store::{RegisterOutcome, Registration};
use mess_coupon_core::token::QrToken;
use mess_coupon_core::types::{EventId, RegistrationStatus, StudentId};

use crate::{PostgresCouponStore, db_err, row_to_registration, violated_constraint};

impl PostgresCouponStore {
    pub(crate) async fn register_impl(
        &self,
        student_id: StudentId,
        event_id: EventId,
    ) -> Result<RegisterOutcome, CouponError> {
        self.ensure_student_exists(student_id).await?;
        self.ensure_event_exists(event_id).await?;

        if let Some(existing) = self.find_registration(student_id, event_id).await? {
            return existing_outcome(existing);
        }

        let slot_ids: Vec<i64> = sqlx::query_scalar(
            r"
            SELECT slot_id FROM event_slots
            WHERE event_id = $1
              AND time_end > NOW()
            ",
        )
        .bind(event_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if slot_ids.is_empty() {
            return Err(CouponError::NoSlotsAvailable);
        }

        // Uniform random assignment spreads load across open slots without
        // maintaining counters under concurrency. Capacity is advisory.
        let slot_id = slot_ids[rand::thread_rng().gen_range(0..slot_ids.len())];
        let token = QrToken::generate();

        let inserted = sqlx::query(
            r"
            INSERT INTO registrations (student_id, event_id, slot_id, qr_token, status)
            VALUES ($1, $2, $3, $4, 'registered')
            RETURNING registration_id, student_id, event_id, slot_id, qr_token, status, served_at
            ",
        )
        .bind(student_id.as_i64())
        .bind(event_id.as_i64())
        .bind(slot_id)
        .bind(token.as_str())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => {
                let registration = row_to_registration(&row)?;
                info!(
                    registration_id = %registration.registration_id,
                    student_id = %student_id,
                    event_id = %event_id,
                    slot_id = %registration.slot_id,
                    "Registration created"
                );
                metrics::counter!("coupon.registrations.created").increment(1);
                Ok(RegisterOutcome {
                    registration,
                    created: true,
                })
            }
            Err(err) => match violated_constraint(&err) {
                // Lost the race against a concurrent first-time registration
                // for the same pair; the winner's row is the stable one.
                Some("registrations_student_event_unique") => {
                    let existing = self
                        .find_registration(student_id, event_id)
                        .await?
                        .ok_or_else(|| {
                            CouponError::Database(
                                "registration vanished after duplicate insert".to_string(),
                            )
                        })?;
                    existing_outcome(existing)
                }
                Some("registrations_token_unique") => {
                    warn!(student_id = %student_id, event_id = %event_id, "QR token collision");
                    Err(CouponError::TokenCollision)
                }
                _ => Err(db_err(err)),
            },
        }
    }

    async fn ensure_student_exists(&self, student_id: StudentId) -> Result<(), CouponError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = $1")
            .bind(student_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match found {
            Some(_) => Ok(()),
            None => Err(CouponError::StudentNotFound(student_id)),
        }
    }

    pub(crate) async fn ensure_event_exists(&self, event_id: EventId) -> Result<(), CouponError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT event_id FROM events WHERE event_id = $1")
                .bind(event_id.as_i64())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        match found {
            Some(_) => Ok(()),
            None => Err(CouponError::EventNotFound(event_id)),
        }
    }

    async fn find_registration(
        &self,
        student_id: StudentId,
        event_id: EventId,
    ) -> Result<Option<Registration>, CouponError> {
        let row = sqlx::query(
            r"
            SELECT registration_id, student_id, event_id, slot_id, qr_token, status, served_at
            FROM registrations
            WHERE student_id = $1 AND event_id = $2
            ",
        )
        .bind(student_id.as_i64())
        .bind(event_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_registration).transpose()
    }
}

/// Map an existing registration to the repeat-call outcome: a served coupon
/// must never re-display its QR; anything else is returned unchanged.
fn existing_outcome(registration: Registration) -> Result<RegisterOutcome, CouponError> {
    if registration.status == RegistrationStatus::Served {
        return Err(CouponError::AlreadyRedeemed);
    }
    Ok(RegisterOutcome {
        registration,
        created: false,
    })
}
