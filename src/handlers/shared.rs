//! Helpers shared by every handler: id/page-token decoding and pagination
//! defaults (SPEC_FULL.md §6.1.A). None of this touches the engine — it is
//! pure request/response glue.

use uuid::Uuid;

use crate::error::AppError;
use crate::id::decode_id;
use crate::pagetoken::{ChildrenPageToken, Direction, PageToken};

pub const DEFAULT_PARENT_DEPTH: i32 = 1;
pub const DEFAULT_CHILD_DEPTH: i32 = 3;
pub const DEFAULT_CHILD_LIMIT: i64 = 5;
pub const DEFAULT_TOPLEVEL_LIMIT: i64 = 20;
pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

/// Decodes a path/query id parameter, mapping any failure to the
/// `InvalidArgument` kind spec.md §6.2 names for a malformed id.
pub fn parse_id(raw: &str, field: &str) -> Result<Uuid, AppError> {
    decode_id(raw).map_err(|_| AppError::InvalidArgument(field.into()))
}

pub fn parse_optional_id(raw: Option<&str>, field: &str) -> Result<Option<Uuid>, AppError> {
    raw.map(|s| parse_id(s, field)).transpose()
}

pub fn parse_page_token(raw: Option<&str>) -> Result<Option<PageToken>, AppError> {
    raw.map(|s| PageToken::decode(s)).transpose()
}

pub fn parse_children_page_token(raw: Option<&str>) -> Result<Option<ChildrenPageToken>, AppError> {
    raw.map(|s| ChildrenPageToken::decode(s)).transpose()
}

/// Clamps a caller-supplied limit to `(0, MAX_PAGE_LIMIT]`, defaulting to
/// `DEFAULT_PAGE_LIMIT` when absent. Every cursor-paginated read (spec.md
/// §4.4.3–5) shares this bound.
pub fn clamp_limit(raw: Option<i64>) -> i64 {
    raw.map(|n| n.clamp(1, MAX_PAGE_LIMIT))
        .unwrap_or(DEFAULT_PAGE_LIMIT)
}

/// The direction a caller's page token requests waiting on (spec.md §4.5
/// step 1) — an absent token or a request without `wait=true` both mean
/// "don't wait".
pub fn wait_direction(wait: Option<bool>, token: Option<PageToken>) -> Direction {
    if wait.unwrap_or(false) {
        token.map(|t| t.direction).unwrap_or(Direction::Unset)
    } else {
        Direction::Unset
    }
}

/// Converts [`validator::ValidationErrors`] into the `InvalidArgument` kind
/// (spec.md §7) with a human-readable message, shared across handlers to
/// avoid copy-pasting the same boilerplate.
pub fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::InvalidArgument(
        e.field_errors()
            .values()
            .flat_map(|v| v.iter())
            .filter_map(|e| e.message.as_ref())
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    )
}
