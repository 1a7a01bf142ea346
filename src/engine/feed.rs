//! `GetFeed` (spec.md §4.4.4): every non-private `Publication` into a
//! channel `userID` subscribes to (including the user's own channel),
//! newest first, cursor-paginated on `(published_at, post_id)`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::engine::posts::posts_by_id;
use crate::error::AppResult;
use crate::models::{Post, User};
use crate::pagetoken::{Direction, PageToken, TokenPair};

#[derive(Debug, sqlx::FromRow)]
struct FeedRow {
    post_id: Uuid,
    channel_id: Uuid,
    publisher_user_id: Uuid,
    private: bool,
    published_at: DateTime<Utc>,
}

pub struct FeedEntry {
    pub post: Post,
    pub channel_id: Uuid,
    pub publisher: User,
    pub private: bool,
    pub published_at: DateTime<Utc>,
}

/// Returns the caller's feed page plus its `Next`/`Prev` token pair.
/// `parent_depth` is forwarded to `posts_by_id` so each entry's post arrives
/// with its ancestor chain already hydrated, exactly as `PostsByID` would
/// build it standalone (spec §4.4.1, reused rather than duplicated here).
pub async fn feed(
    pool: &PgPool,
    user_id: Uuid,
    parent_depth: i32,
    page_token: Option<PageToken>,
    limit: i64,
) -> AppResult<(Vec<FeedEntry>, TokenPair)> {
    let direction = page_token.map(|t| t.direction).unwrap_or(Direction::Unset);

    let rows: Vec<FeedRow> = match page_token {
        Some(t) if t.direction == Direction::Older => {
            sqlx::query_as(
                "select p.post_id, p.channel_id, p.publisher_user_id, p.private, p.published_at
                 from publications p
                 where (p.channel_id = $1
                        or (p.private = false and p.channel_id in (select channel_id from subscriptions where user_id = $1)))
                   and ((p.published_at < $2) or (p.published_at = $2 and p.post_id > $3))
                 order by p.published_at desc, p.post_id asc
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
                "select p.post_id, p.channel_id, p.publisher_user_id, p.private, p.published_at
                 from publications p
                 where (p.channel_id = $1
                        or (p.private = false and p.channel_id in (select channel_id from subscriptions where user_id = $1)))
                   and ((p.published_at > $2) or (p.published_at = $2 and p.post_id < $3))
                 order by p.published_at desc, p.post_id asc
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
                "select p.post_id, p.channel_id, p.publisher_user_id, p.private, p.published_at
                 from publications p
                 where (p.channel_id = $1
                        or (p.private = false and p.channel_id in (select channel_id from subscriptions where user_id = $1)))
                 order by p.published_at desc, p.post_id asc
                 limit $2",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    let post_ids: Vec<Uuid> = rows.iter().map(|r| r.post_id).collect();
    let mut posts = posts_by_id(pool, &post_ids, parent_depth).await?;

    let mut publisher_ids: Vec<Uuid> = rows.iter().map(|r| r.publisher_user_id).collect();
    publisher_ids.sort_unstable();
    publisher_ids.dedup();
    let publishers: HashMap<Uuid, User> = sqlx::query_as("select id, name from users where id = any($1)")
        .bind(&publisher_ids)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|u: User| (u.id, u))
        .collect();

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let post = match posts.remove(&row.post_id) {
            Some(post) => post,
            None => continue,
        };
        let publisher = match publishers.get(&row.publisher_user_id) {
            Some(u) => u.clone(),
            None => continue,
        };
        entries.push(FeedEntry {
            post,
            channel_id: row.channel_id,
            publisher,
            private: row.private,
            published_at: row.published_at,
        });
    }

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
                timestamp: last.published_at,
                id: last.post_id,
                direction: Direction::Older,
            })
        } else {
            None
        };
        TokenPair {
            next,
            prev: Some(PageToken {
                timestamp: first.published_at,
                id: first.post_id,
                direction: Direction::Newer,
            }),
        }
    };

    Ok((entries, pair))
}

/// The existence check `WaitForFeed` re-runs on every long-poll iteration:
/// same visibility predicate as `feed`'s `Newer` branch, projected to a
/// boolean.
pub async fn feed_has_newer_than(
    pool: &PgPool,
    user_id: Uuid,
    after: DateTime<Utc>,
    after_id: Uuid,
) -> AppResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "select exists(
             select 1
             from publications p
             where (p.channel_id = $1
                    or (p.private = false and p.channel_id in (select channel_id from subscriptions where user_id = $1)))
               and ((p.published_at > $2) or (p.published_at = $2 and p.post_id < $3))
         )",
    )
    .bind(user_id)
    .bind(after)
    .bind(after_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}
