//! Session data types
//!
//! The session record held by the store and the two JSON documents that make
//! up a token's header and payload segments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of an authenticated principal
pub type UserId = i64;

/// Identifier assigned by a persistence provider
pub type PersistenceId = i64;

/// Server-side state bound to a token
#[derive(Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Authenticated principal
    pub user_id: UserId,
    /// When the token was issued
    pub creation_time: DateTime<Utc>,
    /// Instant after which the record is invalid; pushed forward on each use
    pub expiration_time: DateTime<Utc>,
    /// Most recent successful validation
    pub last_access_time: DateTime<Utc>,
    /// The exact wire token, also the store key
    pub token: String,
    /// Assigned once the record is durably stored
    pub persistence_id: Option<PersistenceId>,
}

impl SessionRecord {
    /// Build a fresh record issued at `now` and valid for `timeout`
    pub fn issue(
        user_id: UserId,
        token: String,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> Self {
        Self {
            user_id,
            creation_time: now,
            expiration_time: expires_after(now, timeout),
            last_access_time: now,
            token,
            persistence_id: None,
        }
    }

    /// True once `now` is past the expiration time
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time < now
    }

    /// Slide the validity window forward from `now`
    pub fn renew(&mut self, now: DateTime<Utc>, timeout: chrono::Duration) {
        self.last_access_time = now;
        self.expiration_time = expires_after(now, timeout);
    }
}

// Saturates at the latest representable instant instead of panicking.
fn expires_after(now: DateTime<Utc>, timeout: chrono::Duration) -> DateTime<Utc> {
    now.checked_add_signed(timeout)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// Tokens are bearer credentials; keep them out of logs.
impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("user_id", &self.user_id)
            .field("creation_time", &self.creation_time)
            .field("expiration_time", &self.expiration_time)
            .field("last_access_time", &self.last_access_time)
            .field("token", &"<redacted>")
            .field("persistence_id", &self.persistence_id)
            .finish()
    }
}

/// First token segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    pub const ALGORITHM: &'static str = "HS256";
    pub const TYPE: &'static str = "JWT";

    pub fn hs256() -> Self {
        Self {
            alg: Self::ALGORITHM.to_string(),
            typ: Self::TYPE.to_string(),
        }
    }

    pub fn is_hs256(&self) -> bool {
        self.alg == Self::ALGORITHM && self.typ == Self::TYPE
    }
}

/// Second token segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub user_id: UserId,
    pub minutes_timeout: i64,
    pub creation_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_window_saturates_instead_of_overflowing() {
        let huge = Duration::days(200_000 * 365);
        let mut record = SessionRecord::issue(7, "tok".to_string(), t0(), huge);
        assert_eq!(record.expiration_time, DateTime::<Utc>::MAX_UTC);

        record.renew(t0() + Duration::minutes(1), huge);
        assert_eq!(record.expiration_time, DateTime::<Utc>::MAX_UTC);
        assert!(!record.is_expired_at(t0()));
    }

    #[test]
    fn test_issue_sets_window() {
        let record = SessionRecord::issue(7, "tok".to_string(), t0(), Duration::minutes(30));
        assert_eq!(record.creation_time, t0());
        assert_eq!(record.last_access_time, t0());
        assert_eq!(record.expiration_time, t0() + Duration::minutes(30));
        assert!(record.expiration_time > record.last_access_time);
        assert!(record.persistence_id.is_none());
    }

    #[test]
    fn test_expiry_is_strict() {
        let record = SessionRecord::issue(7, "tok".to_string(), t0(), Duration::minutes(30));
        assert!(!record.is_expired_at(t0() + Duration::minutes(30)));
        assert!(record.is_expired_at(t0() + Duration::minutes(30) + Duration::nanoseconds(1)));
    }

    #[test]
    fn test_renew_keeps_identity() {
        let mut record = SessionRecord::issue(7, "tok".to_string(), t0(), Duration::minutes(30));
        let later = t0() + Duration::minutes(10);
        record.renew(later, Duration::minutes(30));

        assert_eq!(record.creation_time, t0());
        assert_eq!(record.user_id, 7);
        assert_eq!(record.last_access_time, later);
        assert_eq!(record.expiration_time, t0() + Duration::minutes(40));
    }

    #[test]
    fn test_payload_uses_canonical_field_names() {
        let payload = TokenPayload {
            user_id: 42,
            minutes_timeout: 30,
            creation_time: t0(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["userId"], 42);
        assert_eq!(json["minutesTimeout"], 30);
        assert!(json["creationTime"].is_string());

        let header = serde_json::to_string(&TokenHeader::hs256()).unwrap();
        assert_eq!(header, r#"{"alg":"HS256","typ":"JWT"}"#);
    }

    #[test]
    fn test_debug_hides_token() {
        let record = SessionRecord::issue(1, "secret-token".to_string(), t0(), Duration::minutes(1));
        assert!(!format!("{:?}", record).contains("secret-token"));
    }
}
