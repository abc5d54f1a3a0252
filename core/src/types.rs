//! Identifier newtypes and lifecycle enums shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CouponError;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the raw database key.
            #[must_use]
            pub const fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Primary key of a student row in `users`.
    StudentId
);
id_type!(
    /// Primary key of an event row.
    EventId
);
id_type!(
    /// Primary key of a time/location slot within an event.
    SlotId
);
id_type!(
    /// Primary key of a registration (coupon) row.
    RegistrationId
);
id_type!(
    /// Primary key of a volunteer account.
    VolunteerId
);

/// Lifecycle status of a registration.
///
/// The only transition this service performs is `Registered -> Served`
/// (inside the redemption transaction). `Cancelled` is set by external admin
/// tooling; `Served` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Coupon issued, not yet redeemed.
    Registered,
    /// Coupon redeemed exactly once by a volunteer scan.
    Served,
    /// Withdrawn by an administrator; never redeemable.
    Cancelled,
}

impl RegistrationStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Served => "served",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Database`] if the string is not a known status;
    /// that means the stored row is corrupt, not that the caller misbehaved.
    pub fn parse(s: &str) -> Result<Self, CouponError> {
        match s {
            "registered" => Ok(Self::Registered),
            "served" => Ok(Self::Served),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(CouponError::Database(format!(
                "invalid registration status: {s}"
            ))),
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Accepting registrations and scans.
    Active,
    /// Ended; closed by an admin or by the expiry sweep.
    Closed,
}

impl EventStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    /// Parse the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Database`] if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self, CouponError> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            _ => Err(CouponError::Database(format!("invalid event status: {s}"))),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn registration_status_roundtrip() {
        for status in [
            RegistrationStatus::Registered,
            RegistrationStatus::Served,
            RegistrationStatus::Cancelled,
        ] {
            let parsed = RegistrationStatus::parse(status.as_str()).unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn registration_status_invalid() {
        assert!(RegistrationStatus::parse("eaten").is_err());
    }

    #[test]
    fn event_status_roundtrip() {
        for status in [EventStatus::Active, EventStatus::Closed] {
            assert_eq!(status, EventStatus::parse(status.as_str()).unwrap());
        }
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = RegistrationId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: RegistrationId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }
}
