//! Read-side queries and the event expiry sweep.
//!
//! These back the dashboard-facing endpoints: active event listings (joined
//! with the requesting student's own registration), redemption statistics
//! computed from the audit trail, and recent scan history. None of them
//! mutate coupon state; the sweep only flips fully-expired events to closed.

use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::info;

use mess_coupon_core::error::CouponError;
use mess_coupon_core::store::{
    BatchCount, EventStats, EventSummary, ScanRecord, StudentRegistration, VolunteerCount,
};
use mess_coupon_core::types::{EventId, EventStatus, RegistrationStatus, StudentId};

use crate::{PostgresCouponStore, db_err};

impl PostgresCouponStore {
    pub(crate) async fn active_events_impl(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<EventSummary>, CouponError> {
        // Only events that still have at least one open slot are listed;
        // a closed-but-unswept event disappears the same way.
        let rows = if let Some(student_id) = student_id {
            sqlx::query(
                r"
                SELECT e.event_id, e.name, e.description, e.date, e.status,
                       r.registration_id, r.status AS registration_status, r.served_at,
                       s.floor, s.counter, s.time_start, s.time_end
                FROM events e
                LEFT JOIN registrations r
                    ON r.event_id = e.event_id AND r.student_id = $1
                LEFT JOIN event_slots s ON s.slot_id = r.slot_id
                WHERE e.status = 'active'
                  AND EXISTS (
                      SELECT 1 FROM event_slots os
                      WHERE os.event_id = e.event_id AND os.time_end > NOW()
                  )
                ORDER BY e.date ASC
                ",
            )
            .bind(student_id.as_i64())
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                r"
                SELECT e.event_id, e.name, e.description, e.date, e.status,
                       NULL::BIGINT AS registration_id, NULL::TEXT AS registration_status,
                       NULL::TIMESTAMPTZ AS served_at, NULL::TEXT AS floor,
                       NULL::TEXT AS counter, NULL::TIMESTAMPTZ AS time_start,
                       NULL::TIMESTAMPTZ AS time_end
                FROM events e
                WHERE e.status = 'active'
                  AND EXISTS (
                      SELECT 1 FROM event_slots os
                      WHERE os.event_id = e.event_id AND os.time_end > NOW()
                  )
                ORDER BY e.date ASC
                ",
            )
            .fetch_all(&self.pool)
            .await
        }
        .map_err(db_err)?;

        rows.iter().map(row_to_event_summary).collect()
    }

    pub(crate) async fn event_stats_impl(
        &self,
        event_id: EventId,
    ) -> Result<EventStats, CouponError> {
        self.ensure_event_exists(event_id).await?;

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM volunteer_actions va
            JOIN registrations r ON r.registration_id = va.registration_id
            WHERE r.event_id = $1
            ",
        )
        .bind(event_id.as_i64())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let by_batch = sqlx::query(
            r"
            SELECT u.batch, COUNT(*) AS count
            FROM volunteer_actions va
            JOIN registrations r ON r.registration_id = va.registration_id
            JOIN users u ON u.user_id = r.student_id
            WHERE r.event_id = $1
            GROUP BY u.batch
            ORDER BY u.batch ASC
            ",
        )
        .bind(event_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(|row| BatchCount {
            batch: row.get("batch"),
            count: row.get("count"),
        })
        .collect();

        let by_volunteer = sqlx::query(
            r"
            SELECT v.name AS volunteer_name, COUNT(*) AS count
            FROM volunteer_actions va
            JOIN volunteers v ON v.id = va.volunteer_id
            JOIN registrations r ON r.registration_id = va.registration_id
            WHERE r.event_id = $1
            GROUP BY v.name
            ORDER BY v.name ASC
            ",
        )
        .bind(event_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(|row| VolunteerCount {
            volunteer_name: row.get("volunteer_name"),
            count: row.get("count"),
        })
        .collect();

        Ok(EventStats {
            total,
            by_batch,
            by_volunteer,
        })
    }

    pub(crate) async fn scan_history_impl(
        &self,
        event_id: EventId,
        limit: i64,
    ) -> Result<Vec<ScanRecord>, CouponError> {
        let rows = sqlx::query(
            r"
            SELECT u.name AS student_name, u.batch, r.served_at
            FROM registrations r
            JOIN users u ON u.user_id = r.student_id
            WHERE r.event_id = $1 AND r.status = 'served'
            ORDER BY r.served_at DESC
            LIMIT $2
            ",
        )
        .bind(event_id.as_i64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| ScanRecord {
                student_name: row.get("student_name"),
                batch: row.get("batch"),
                served_at: row.get("served_at"),
            })
            .collect())
    }

    pub(crate) async fn close_expired_events_impl(&self) -> Result<u64, CouponError> {
        // Events with no slots at all are left untouched; they never had a
        // window to expire from.
        let result = sqlx::query(
            r"
            UPDATE events
            SET status = 'closed'
            WHERE status = 'active'
              AND event_id IN (
                  SELECT event_id FROM event_slots
                  GROUP BY event_id
                  HAVING MAX(time_end) < NOW()
              )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let closed = result.rows_affected();
        if closed > 0 {
            info!(closed, "Expired events closed");
        }
        Ok(closed)
    }
}

fn row_to_event_summary(row: &PgRow) -> Result<EventSummary, CouponError> {
    let registration_id: Option<i64> = row.get("registration_id");
    let registration = registration_id
        .map(|id| -> Result<StudentRegistration, CouponError> {
            let status: String = row.get("registration_status");
            Ok(StudentRegistration {
                registration_id: id.into(),
                status: RegistrationStatus::parse(&status)?,
                served_at: row.get("served_at"),
                floor: row.get("floor"),
                counter: row.get("counter"),
                time_start: row.get("time_start"),
                time_end: row.get("time_end"),
            })
        })
        .transpose()?;

    let status: String = row.get("status");
    Ok(EventSummary {
        event_id: row.get::<i64, _>("event_id").into(),
        name: row.get("name"),
        description: row.get("description"),
        date: row.get("date"),
        status: EventStatus::parse(&status)?,
        registration,
    })
}
