//! Transactional redemption: the sole place a registration becomes served.
//!
//! The whole read-validate-write sequence runs inside one transaction that
//! takes a row-level exclusive lock on the target registration
//! (`SELECT ... FOR UPDATE`). Two concurrent scans of the same token are
//! therefore strictly ordered: the second blocks until the first commits and
//! then observes the served state. Every early return drops the transaction,
//! which rolls it back, so a served status without an audit row is never
//! observable.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{info, warn};

use mess_coupon_core::error::CouponError;
use mess_coupon_core::store::ScanOutcome;
use mess_coupon_core::token::QrToken;
use mess_coupon_core::types::{EventId, RegistrationId, RegistrationStatus, StudentId, VolunteerId};

use crate::{PostgresCouponStore, db_err};

/// The registration under lock, joined with the student for audit/display.
struct LockedRegistration {
    registration_id: RegistrationId,
    student_id: StudentId,
    event_id: EventId,
    status: RegistrationStatus,
    student_name: String,
    batch: Option<String>,
}

/// The scanning volunteer's current assignment.
struct VolunteerAssignment {
    event_id: EventId,
    floor: Option<String>,
    counter: Option<String>,
}

impl PostgresCouponStore {
    pub(crate) async fn redeem_impl(
        &self,
        token: &QrToken,
        volunteer_id: VolunteerId,
    ) -> Result<ScanOutcome, CouponError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Lock the registration row for the duration of the transaction.
        // An unknown token returns before any lock is held.
        let row = sqlx::query(
            r"
            SELECT r.registration_id, r.student_id, r.event_id, r.status,
                   u.name AS student_name, u.batch
            FROM registrations r
            JOIN users u ON u.user_id = r.student_id
            WHERE r.qr_token = $1
            FOR UPDATE OF r
            ",
        )
        .bind(token.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            metrics::counter!("coupon.scans.rejected", "reason" => "invalid_token").increment(1);
            return Err(CouponError::TokenNotFound);
        };

        let registration = LockedRegistration {
            registration_id: row.get::<i64, _>("registration_id").into(),
            student_id: row.get::<i64, _>("student_id").into(),
            event_id: row.get::<i64, _>("event_id").into(),
            status: RegistrationStatus::parse(row.get("status"))?,
            student_name: row.get("student_name"),
            batch: row.get("batch"),
        };

        let volunteer = sqlx::query(
            "SELECT event_id, current_floor, current_counter FROM volunteers WHERE id = $1",
        )
        .bind(volunteer_id.as_i64())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .map(|row| VolunteerAssignment {
            event_id: row.get::<i64, _>("event_id").into(),
            floor: row.get("current_floor"),
            counter: row.get("current_counter"),
        })
        .ok_or(CouponError::VolunteerNotFound(volunteer_id))?;

        // A volunteer may only redeem coupons for their assigned event;
        // this blocks cross-event misuse when events run concurrently.
        if registration.event_id != volunteer.event_id {
            warn!(
                volunteer_id = %volunteer_id,
                volunteer_event = %volunteer.event_id,
                coupon_event = %registration.event_id,
                "Scan rejected: wrong event scope"
            );
            metrics::counter!("coupon.scans.rejected", "reason" => "wrong_event").increment(1);
            return Err(CouponError::WrongEventScope);
        }

        match registration.status {
            RegistrationStatus::Served => {
                metrics::counter!("coupon.scans.rejected", "reason" => "already_served")
                    .increment(1);
                return Err(CouponError::AlreadyServed {
                    student_name: registration.student_name,
                });
            }
            RegistrationStatus::Cancelled => {
                metrics::counter!("coupon.scans.rejected", "reason" => "cancelled").increment(1);
                return Err(CouponError::RegistrationCancelled);
            }
            RegistrationStatus::Registered => {}
        }

        let served_at: DateTime<Utc> = sqlx::query_scalar(
            r"
            UPDATE registrations
            SET status = 'served', served_at = NOW()
            WHERE registration_id = $1
            RETURNING served_at
            ",
        )
        .bind(registration.registration_id.as_i64())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        // Audit: floor/counter are the volunteer's assignment at scan time.
        sqlx::query(
            r"
            INSERT INTO volunteer_actions (volunteer_id, registration_id, action, floor, counter)
            VALUES ($1, $2, 'scan', $3, $4)
            ",
        )
        .bind(volunteer_id.as_i64())
        .bind(registration.registration_id.as_i64())
        .bind(volunteer.floor.as_deref())
        .bind(volunteer.counter.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        info!(
            registration_id = %registration.registration_id,
            volunteer_id = %volunteer_id,
            event_id = %registration.event_id,
            "Coupon served"
        );
        metrics::counter!("coupon.scans.served").increment(1);

        Ok(ScanOutcome {
            registration_id: registration.registration_id,
            student_id: registration.student_id,
            student_name: registration.student_name,
            batch: registration.batch,
            served_at,
        })
    }
}
