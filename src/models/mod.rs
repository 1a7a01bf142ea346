//! Domain structs for the reply-tree and feed engine (spec.md §3).
//!
//! Each entity has a `FromRow` struct used by the engine for database
//! round-trips, and (where the shape differs for the wire) a `*Dto` used by
//! handlers — ids are re-encoded to the Crockford base32 form (spec.md §6.2)
//! only at that boundary, never inside the engine itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::id::encode_id;

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDto {
    pub id: String,
    pub name: String,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        UserDto {
            id: encode_id(u.id),
            name: u.name,
        }
    }
}

// ============================================================================
// Session
// ============================================================================
//
// No standalone row model either: `auth/mod.rs`'s extractor updates
// `last_active_at` and reads back `user_id`/`scopes` with a bare
// `query_as::<_, (Uuid, Vec<String>)>`, since that's the only shape any
// caller needs out of the `sessions` table.

// ============================================================================
// Post
// ============================================================================

/// Raw `posts` row, as read straight off the table.
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_active_at: DateTime<Utc>,
    pub content: Option<String>,
    pub warning: Option<String>,
    pub author_user_id: Option<Uuid>,
}

/// A hydrated post as assembled by the engine: author resolved, and (when
/// requested) a `parent_post` populated along the ancestor chain.
///
/// `parent_post` is a populated lookup, not a shared owner (spec.md §3) — it
/// is rebuilt fresh on every read path, never a pointer into long-lived
/// storage, so the same post appearing at two chain positions produces two
/// independent copies rather than a cycle.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_active_at: DateTime<Utc>,
    pub content: Option<String>,
    pub warning: Option<String>,
    pub author: Option<User>,
    /// Id of the direct parent, when one exists. Populated by whichever read
    /// path discovered this post as someone's child (`PostChildrenByID`,
    /// `PostDescendantsByID`) — `None` when the post was looked up directly
    /// and its parentage wasn't part of the query (e.g. a bare `GetPost`
    /// with `parent_depth = 0`).
    pub parent_post_id: Option<Uuid>,
    pub parent_post: Option<Box<Post>>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            created_at: row.created_at,
            edited_at: row.edited_at,
            deleted_at: row.deleted_at,
            last_active_at: row.last_active_at,
            content: row.content,
            warning: row.warning,
            author: None,
            parent_post_id: None,
            parent_post: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDto {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_active_at: DateTime<Utc>,
    pub content: Option<String>,
    pub warning: Option<String>,
    pub author: Option<UserDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_post: Option<Box<PostDto>>,
}

impl From<Post> for PostDto {
    fn from(p: Post) -> Self {
        PostDto {
            id: encode_id(p.id),
            created_at: p.created_at,
            edited_at: p.edited_at,
            deleted_at: p.deleted_at,
            last_active_at: p.last_active_at,
            content: p.content,
            warning: p.warning,
            author: p.author.map(UserDto::from),
            parent_post_id: p.parent_post_id.map(encode_id),
            parent_post: p.parent_post.map(|boxed| Box::new(PostDto::from(*boxed))),
        }
    }
}

// ============================================================================
// PostAncestor (closure table) / Subscription / Publication
// ============================================================================
//
// None of these three tables has a standalone full-row model here: every
// read path that touches them selects exactly the columns that query needs
// into a local, query-scoped struct instead — `engine/posts.rs`'s `ChainRow`
// for `post_ancestors`, `engine/feed.rs`'s `FeedRow` for `publications`, and
// a bare `Vec<Uuid>` of channel ids for `subscriptions`. Only the wire-facing
// `PublicationDto` below is shared across call sites.

#[derive(Debug, Clone, Serialize)]
pub struct PublicationDto {
    pub post: PostDto,
    pub publisher: UserDto,
    pub channel_id: String,
    pub private: bool,
    pub published_at: DateTime<Utc>,
}

// ============================================================================
// Notification
// ============================================================================
//
// Same story as above: `engine/notifications.rs`'s own `NotificationRow`
// selects exactly the columns `Notifications` needs; only the wire-facing
// DTO is shared.

#[derive(Debug, Clone, Serialize)]
pub struct NotificationDto {
    pub id: String,
    pub r#type: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_post: Option<PostDto>,
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 10_000, message = "content must be 1-10000 characters"))]
    pub content: String,
    #[validate(length(max = 500, message = "warning must be at most 500 characters"))]
    pub warning: Option<String>,
    pub parent_post_id: Option<String>,
}
