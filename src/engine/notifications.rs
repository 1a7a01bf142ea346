//! `GetNotifications` (spec.md §4.4.5): `userID`'s notifications newest
//! first, cursor-paginated on `(created_at, id)`, each carrying the
//! replying post it refers to.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::engine::posts::posts_by_id;
use crate::error::AppResult;
use crate::models::Post;
use crate::pagetoken::{Direction, PageToken, TokenPair};

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    r#type: String,
    created_at: DateTime<Utc>,
    reply_post_id: Option<Uuid>,
}

pub struct NotificationEntry {
    pub id: Uuid,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub reply_post: Option<Post>,
}

pub async fn notifications(
    pool: &PgPool,
    user_id: Uuid,
    parent_depth: i32,
    page_token: Option<PageToken>,
    limit: i64,
) -> AppResult<(Vec<NotificationEntry>, TokenPair)> {
    let direction = page_token.map(|t| t.direction).unwrap_or(Direction::Unset);

    let rows: Vec<NotificationRow> = match page_token {
        Some(t) if t.direction == Direction::Older => {
            sqlx::query_as(
                "select id, type, created_at, reply_post_id
                 from notifications
                 where user_id = $1
                   and ((created_at < $2) or (created_at = $2 and id > $3))
                 order by created_at desc, id asc
                 limit $4",
            )
            .bind(user_id)
            .bind(t.timestamp)
            .bind(t.id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        Some(t) if t.direction == Direction::Newer => {
            sqlx::query_as(
                "select id, type, created_at, reply_post_id
                 from notifications
                 where user_id = $1
                   and ((created_at > $2) or (created_at = $2 and id < $3))
                 order by created_at desc, id asc
                 limit $4",
            )
            .bind(user_id)
            .bind(t.timestamp)
            .bind(t.id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        _ => {
            sqlx::query_as(
                "select id, type, created_at, reply_post_id
                 from notifications
                 where user_id = $1
                 order by created_at desc, id asc
                 limit $2",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    let mut reply_post_ids: Vec<Uuid> = rows.iter().filter_map(|r| r.reply_post_id).collect();
    reply_post_ids.sort_unstable();
    reply_post_ids.dedup();
    let mut posts: HashMap<Uuid, Post> = posts_by_id(pool, &reply_post_ids, parent_depth).await?;

    let entries: Vec<NotificationEntry> = rows
        .iter()
        .map(|r| NotificationEntry {
            id: r.id,
            kind: r.r#type.clone(),
            created_at: r.created_at,
            reply_post: r.reply_post_id.and_then(|id| posts.remove(&id)),
        })
        .collect();

    let pair = if rows.is_empty() {
        TokenPair {
            next: None,
            prev: page_token.map(|t| PageToken {
                timestamp: t.timestamp,
                id: t.id,
                direction: Direction::Newer,
            }),
        }
    } else {
        let first = &rows[0];
        let last = &rows[rows.len() - 1];
        let next = if rows.len() as i64 >= limit || direction == Direction::Newer {
            Some(PageToken {
                timestamp: last.created_at,
                id: last.id,
                direction: Direction::Older,
            })
        } else {
            None
        };
        TokenPair {
            next,
            prev: Some(PageToken {
                timestamp: first.created_at,
                id: first.id,
                direction: Direction::Newer,
            }),
        }
    };

    Ok((entries, pair))
}

/// The existence check `WaitForNotifications` re-runs on every long-poll
/// iteration: same predicate as `notifications`'s `Newer` branch, projected
/// to a boolean.
pub async fn notifications_has_newer_than(
    pool: &PgPool,
    user_id: Uuid,
    after: DateTime<Utc>,
    after_id: Uuid,
) -> AppResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "select exists(
             select 1 from notifications
             where user_id = $1
               and ((created_at > $2) or (created_at = $2 and id < $3))
         )",
    )
    .bind(user_id)
    .bind(after)
    .bind(after_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}
