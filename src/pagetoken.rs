//! Binary page-token codec (spec §6.3). Two shapes share the same
//! little-endian-then-base64url idiom: the general `PageToken` (used by
//! `GetPostDescendants`, `GetFeed`, and `GetNotifications`) carries a
//! direction; the `ChildrenPageToken` (used only by `GetPostChildren`'s
//! top-level cursor) does not — deeper levels in that call are never
//! paginated, so there is nothing to point backwards from.

use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::error::AppError;

const TRANSPORT: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Unset,
    Newer,
    Older,
}

impl Direction {
    fn to_byte(self) -> u8 {
        match self {
            Direction::Unset => 0,
            Direction::Newer => 1,
            Direction::Older => 2,
        }
    }

    fn from_byte(b: u8) -> Result<Self, AppError> {
        match b {
            0 => Ok(Direction::Unset),
            1 => Ok(Direction::Newer),
            2 => Ok(Direction::Older),
            _ => Err(AppError::InvalidArgument("page_token".into())),
        }
    }
}

/// `(timestamp, id, direction)` — the cursor shape shared by
/// `PostDescendantsByID`, `Feed`, and `Notifications` (spec §4.4.3–4.4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageToken {
    pub timestamp: DateTime<Utc>,
    pub id: Uuid,
    pub direction: Direction,
}

const PAGE_TOKEN_LEN: usize = 8 + 16 + 1;

impl PageToken {
    pub fn encode(&self) -> String {
        let mut buf = Vec::with_capacity(PAGE_TOKEN_LEN);
        buf.extend_from_slice(&timestamp_nanos(self.timestamp).to_le_bytes());
        buf.extend_from_slice(self.id.as_bytes());
        buf.push(self.direction.to_byte());
        TRANSPORT.encode(buf)
    }

    pub fn decode(s: &str) -> Result<Self, AppError> {
        let bytes = TRANSPORT
            .decode(s)
            .map_err(|_| AppError::InvalidArgument("page_token".into()))?;
        if bytes.len() != PAGE_TOKEN_LEN {
            return Err(AppError::InvalidArgument("page_token".into()));
        }
        let nanos = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let id = Uuid::from_slice(&bytes[8..24])
            .map_err(|_| AppError::InvalidArgument("page_token".into()))?;
        let direction = Direction::from_byte(bytes[24])?;
        Ok(PageToken {
            timestamp: nanos_to_timestamp(nanos)?,
            id,
            direction,
        })
    }
}

/// `(last_active_at, created_at, id)` — the top-level `GetPostChildren`
/// cursor (spec §4.4.2). No direction: this cursor only ever means
/// "strictly older than this position".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildrenPageToken {
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

const CHILDREN_TOKEN_LEN: usize = 8 + 8 + 16;

impl ChildrenPageToken {
    pub fn encode(&self) -> String {
        let mut buf = Vec::with_capacity(CHILDREN_TOKEN_LEN);
        buf.extend_from_slice(&timestamp_nanos(self.last_active_at).to_le_bytes());
        buf.extend_from_slice(&timestamp_nanos(self.created_at).to_le_bytes());
        buf.extend_from_slice(self.id.as_bytes());
        TRANSPORT.encode(buf)
    }

    pub fn decode(s: &str) -> Result<Self, AppError> {
        let bytes = TRANSPORT
            .decode(s)
            .map_err(|_| AppError::InvalidArgument("page_token".into()))?;
        if bytes.len() != CHILDREN_TOKEN_LEN {
            return Err(AppError::InvalidArgument("page_token".into()));
        }
        let last_active_nanos = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let created_at_nanos = i64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let id = Uuid::from_slice(&bytes[16..32])
            .map_err(|_| AppError::InvalidArgument("page_token".into()))?;
        Ok(ChildrenPageToken {
            last_active_at: nanos_to_timestamp(last_active_nanos)?,
            created_at: nanos_to_timestamp(created_at_nanos)?,
            id,
        })
    }
}

/// The `Next`/`Prev` pair returned by every cursor-paginated read path
/// (`PostDescendantsByID`, `Feed`, `Notifications` — spec §4.4.3–4.4.5).
/// Both share the same "emit `Next` when the page was full or direction was
/// `Newer`; emit `Prev` when any row came back; echo on empty" rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub next: Option<PageToken>,
    pub prev: Option<PageToken>,
}

fn timestamp_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .unwrap_or_else(|| ts.timestamp() * 1_000_000_000)
}

fn nanos_to_timestamp(nanos: i64) -> Result<DateTime<Utc>, AppError> {
    let secs = nanos.div_euclid(1_000_000_000);
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    Utc.timestamp_opt(secs, subsec)
        .single()
        .ok_or_else(|| AppError::InvalidArgument("page_token".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 12, 30, 0).unwrap()
            + Duration::nanoseconds(123_456_789)
    }

    #[test]
    fn page_token_round_trips() {
        let token = PageToken {
            timestamp: sample_timestamp(),
            id: Uuid::new_v4(),
            direction: Direction::Newer,
        };
        let encoded = token.encode();
        let decoded = PageToken::decode(&encoded).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn page_token_is_url_safe_and_unpadded() {
        let token = PageToken {
            timestamp: sample_timestamp(),
            id: Uuid::new_v4(),
            direction: Direction::Older,
        };
        let encoded = token.encode();
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn children_page_token_round_trips() {
        let token = ChildrenPageToken {
            last_active_at: sample_timestamp(),
            created_at: sample_timestamp() - Duration::seconds(30),
            id: Uuid::new_v4(),
        };
        let encoded = token.encode();
        let decoded = ChildrenPageToken::decode(&encoded).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn malformed_token_is_invalid_argument() {
        assert!(matches!(
            PageToken::decode("not-valid-base64!!"),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn wrong_length_payload_is_invalid_argument() {
        let short = TRANSPORT.encode([0u8; 4]);
        assert!(matches!(
            PageToken::decode(&short),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn unset_direction_round_trips() {
        let token = PageToken {
            timestamp: sample_timestamp(),
            id: Uuid::new_v4(),
            direction: Direction::Unset,
        };
        let decoded = PageToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded.direction, Direction::Unset);
    }
}
