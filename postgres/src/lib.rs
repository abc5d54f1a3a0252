//! `PostgreSQL` implementation of the coupon store.
//!
//! This crate provides [`PostgresCouponStore`], the production backend for
//! the registration and redemption workflow. It uses sqlx with a pooled
//! connection and supports:
//!
//! - Idempotent registration with random slot assignment ([`allocator`])
//! - Exactly-once redemption under a row-level lock ([`redemption`])
//! - Read-side event listings, statistics, and the expiry sweep ([`queries`])
//!
//! # Example
//!
//! ```ignore
//! use mess_coupon_postgres::PostgresCouponStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresCouponStore::connect("postgres://localhost/coupons", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod allocator;
mod queries;
mod redemption;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use mess_coupon_core::error::CouponError;
use mess_coupon_core::store::{
    CouponStore, EventStats, EventSummary, RegisterOutcome, Registration, ScanOutcome, ScanRecord,
};
use mess_coupon_core::token::QrToken;
use mess_coupon_core::types::{EventId, RegistrationStatus, StudentId, VolunteerId};

/// `PostgreSQL`-backed [`CouponStore`].
///
/// Holds a connection pool with explicit lifecycle: opened at process start
/// via [`PostgresCouponStore::connect`], closed when dropped. The store
/// itself is stateless between requests; all durable state lives in the
/// database.
#[derive(Clone)]
pub struct PostgresCouponStore {
    pool: PgPool,
}

impl PostgresCouponStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool against `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Database`] if the pool cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CouponError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| CouponError::Database(format!("failed to connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Run schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Database`] if migrations fail.
    pub async fn migrate(&self) -> Result<(), CouponError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CouponError::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Access the underlying pool (readiness checks, tests).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CouponStore for PostgresCouponStore {
    async fn register(
        &self,
        student_id: StudentId,
        event_id: EventId,
    ) -> Result<RegisterOutcome, CouponError> {
        self.register_impl(student_id, event_id).await
    }

    async fn redeem(
        &self,
        token: &QrToken,
        volunteer_id: VolunteerId,
    ) -> Result<ScanOutcome, CouponError> {
        self.redeem_impl(token, volunteer_id).await
    }

    async fn active_events(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<EventSummary>, CouponError> {
        self.active_events_impl(student_id).await
    }

    async fn event_stats(&self, event_id: EventId) -> Result<EventStats, CouponError> {
        self.event_stats_impl(event_id).await
    }

    async fn scan_history(
        &self,
        event_id: EventId,
        limit: i64,
    ) -> Result<Vec<ScanRecord>, CouponError> {
        self.scan_history_impl(event_id, limit).await
    }

    async fn close_expired_events(&self) -> Result<u64, CouponError> {
        self.close_expired_events_impl().await
    }
}

/// Map a driver error to the opaque database variant.
fn db_err(err: sqlx::Error) -> CouponError {
    CouponError::Database(err.to_string())
}

/// Name of the violated constraint, if `err` is a constraint violation.
fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) => db.constraint(),
        _ => None,
    }
}

/// Convert a `registrations` row into the domain record.
fn row_to_registration(row: &sqlx::postgres::PgRow) -> Result<Registration, CouponError> {
    use sqlx::Row;

    let status: String = row.get("status");
    let token: String = row.get("qr_token");

    Ok(Registration {
        registration_id: row.get::<i64, _>("registration_id").into(),
        student_id: row.get::<i64, _>("student_id").into(),
        event_id: row.get::<i64, _>("event_id").into(),
        slot_id: row.get::<i64, _>("slot_id").into(),
        // A stored token that fails validation means the row is corrupt.
        qr_token: QrToken::parse(&token)
            .map_err(|_| CouponError::Database("stored token is malformed".to_string()))?,
        status: RegistrationStatus::parse(&status)?,
        served_at: row.get("served_at"),
    })
}
