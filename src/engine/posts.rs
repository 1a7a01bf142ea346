//! The post-graph operations: `CreatePost`, `DeletePost`, `PostsByID`,
//! `PostChildrenByID`, `PostDescendantsByID` (spec.md §4.3, §4.4.1–3).
//!
//! Every read path here follows the deferred-join idiom (spec.md §4.4): a
//! skeleton query for ids and ordering fields, then batched id-keyed
//! hydration queries, never a per-row fetch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::bus::Bus;
use crate::db::tx::Tx;
use crate::error::{AppError, AppResult};
use crate::id::encode_id;
use crate::models::{Post, PostRow, User};
use crate::pagetoken::{ChildrenPageToken, Direction, PageToken, TokenPair};

// ============================================================================
// Shared hydration helpers
// ============================================================================

async fn fetch_skeleton(pool: &PgPool, ids: &[Uuid]) -> AppResult<HashMap<Uuid, PostRow>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<PostRow> = sqlx::query_as(
        "select id, created_at, edited_at, deleted_at, last_active_at, content, warning, author_user_id
         from posts
         where id = any($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| (r.id, r)).collect())
}

async fn fetch_users(pool: &PgPool, ids: &[Uuid]) -> AppResult<HashMap<Uuid, User>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<User> = sqlx::query_as("select id, name from users where id = any($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|u| (u.id, u)).collect())
}

fn row_to_post(row: &PostRow, users: &HashMap<Uuid, User>) -> Post {
    Post {
        id: row.id,
        created_at: row.created_at,
        edited_at: row.edited_at,
        deleted_at: row.deleted_at,
        last_active_at: row.last_active_at,
        content: row.content.clone(),
        warning: row.warning.clone(),
        author: row.author_user_id.and_then(|id| users.get(&id).cloned()),
        parent_post_id: None,
        parent_post: None,
    }
}

/// Given a descendant's ordered ancestor chain (ascending distance, nearest
/// parent first) and a map of already-hydrated ancestor posts, builds the
/// nested `parent_post` chain spec.md §9 describes: id-indexed lookups
/// materialized into a list at assembly time, never a shared owning link.
fn build_parent_chain(chain: &[Uuid], ancestor_posts: &HashMap<Uuid, Post>) -> Option<Box<Post>> {
    let mut built: Option<Box<Post>> = None;
    for ancestor_id in chain.iter().rev() {
        match ancestor_posts.get(ancestor_id) {
            Some(ancestor) => {
                let mut node = ancestor.clone();
                node.parent_post = built.take();
                built = Some(Box::new(node));
            }
            None => break,
        }
    }
    built
}

// ============================================================================
// PostsByID (spec §4.4.1)
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ChainRow {
    descendant_id: Uuid,
    ancestor_id: Uuid,
}

pub async fn posts_by_id(
    pool: &PgPool,
    ids: &[Uuid],
    parent_depth: i32,
) -> AppResult<HashMap<Uuid, Post>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let skeleton = fetch_skeleton(pool, ids).await?;

    let mut chains: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut ancestors: HashMap<Uuid, PostRow> = HashMap::new();

    if parent_depth > 0 {
        let chain_rows: Vec<ChainRow> = sqlx::query_as(
            "select descendant_id, ancestor_id
             from post_ancestors
             where descendant_id = any($1) and distance > 0 and distance <= $2
             order by descendant_id, distance asc",
        )
        .bind(ids)
        .bind(parent_depth)
        .fetch_all(pool)
        .await?;

        for row in chain_rows {
            chains.entry(row.descendant_id).or_default().push(row.ancestor_id);
        }

        let mut ancestor_ids: Vec<Uuid> = chains.values().flatten().copied().collect();
        ancestor_ids.sort_unstable();
        ancestor_ids.dedup();
        ancestors = fetch_skeleton(pool, &ancestor_ids).await?;
    }

    // Author lookups are deferred and batched across both the primary and
    // the parent layers in a single round trip (spec §4.4.1).
    let mut author_ids: Vec<Uuid> = skeleton
        .values()
        .chain(ancestors.values())
        .filter_map(|r| r.author_user_id)
        .collect();
    author_ids.sort_unstable();
    author_ids.dedup();
    let users = fetch_users(pool, &author_ids).await?;

    let ancestor_posts: HashMap<Uuid, Post> = ancestors
        .iter()
        .map(|(id, row)| (*id, row_to_post(row, &users)))
        .collect();

    let mut result = HashMap::with_capacity(skeleton.len());
    for (id, row) in &skeleton {
        let mut post = row_to_post(row, &users);
        if let Some(chain) = chains.get(id) {
            post.parent_post_id = chain.first().copied();
            post.parent_post = build_parent_chain(chain, &ancestor_posts);
        }
        result.insert(*id, post);
    }

    Ok(result)
}

// ============================================================================
// PostChildrenByID (spec §4.4.2)
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ChildRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    last_active_at: DateTime<Utc>,
    content: Option<String>,
    warning: Option<String>,
    author_user_id: Option<Uuid>,
    parent_post_id: Uuid,
}

const LEVEL1_NO_TOKEN: &str = "
    select posts.id, posts.created_at, posts.edited_at, posts.deleted_at, posts.last_active_at,
           posts.content, posts.warning, posts.author_user_id, $1::uuid as parent_post_id
    from posts
    join post_ancestors pa on pa.descendant_id = posts.id and pa.distance = 1
    where pa.ancestor_id = $1
    order by posts.last_active_at desc, posts.created_at desc, posts.id asc
    limit $2
";

const LEVEL1_WITH_TOKEN: &str = "
    select posts.id, posts.created_at, posts.edited_at, posts.deleted_at, posts.last_active_at,
           posts.content, posts.warning, posts.author_user_id, $1::uuid as parent_post_id
    from posts
    join post_ancestors pa on pa.descendant_id = posts.id and pa.distance = 1
    where pa.ancestor_id = $1
      and (posts.last_active_at, posts.created_at, posts.id) < ($2, $3, $4)
    order by posts.last_active_at desc, posts.created_at desc, posts.id asc
    limit $5
";

const LEVEL_N: &str = "
    select id, created_at, edited_at, deleted_at, last_active_at, content, warning, author_user_id, parent_post_id
    from (
        select posts.id, posts.created_at, posts.edited_at, posts.deleted_at, posts.last_active_at,
               posts.content, posts.warning, posts.author_user_id, pa.ancestor_id as parent_post_id,
               row_number() over (
                   partition by pa.ancestor_id
                   order by posts.last_active_at desc, posts.created_at desc, posts.id asc
               ) as rn
        from posts
        join post_ancestors pa on pa.descendant_id = posts.id and pa.distance = 1
        where pa.ancestor_id = any($1)
    ) ranked
    where rn <= $2
    order by parent_post_id, last_active_at desc, created_at desc, id asc
";

/// Returns a flat, level-order list of `postID`'s descendants down to
/// `childDepth`, plus the companion `DescendantsPageToken` anchored at the
/// subtree's single newest post (spec §4.4.2). `pageToken` paginates only
/// the top level; deeper levels always return their first `childLimit`.
pub async fn post_children_by_id(
    pool: &PgPool,
    post_id: Uuid,
    child_depth: i32,
    child_limit: i64,
    toplevel_limit: i64,
    page_token: Option<ChildrenPageToken>,
) -> AppResult<(Vec<Post>, Option<PageToken>)> {
    let level1: Vec<ChildRow> = match page_token {
        Some(t) => {
            sqlx::query_as(LEVEL1_WITH_TOKEN)
                .bind(post_id)
                .bind(t.last_active_at)
                .bind(t.created_at)
                .bind(t.id)
                .bind(toplevel_limit)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as(LEVEL1_NO_TOKEN)
                .bind(post_id)
                .bind(toplevel_limit)
                .fetch_all(pool)
                .await?
        }
    };

    let mut all_rows: Vec<ChildRow> = Vec::new();
    let mut parent_ids: Vec<Uuid> = level1.iter().map(|r| r.id).collect();
    all_rows.extend(level1);

    let mut level = 2;
    while level <= child_depth && !parent_ids.is_empty() {
        let rows: Vec<ChildRow> = sqlx::query_as(LEVEL_N)
            .bind(&parent_ids)
            .bind(child_limit)
            .fetch_all(pool)
            .await?;
        if rows.is_empty() {
            break;
        }
        parent_ids = rows.iter().map(|r| r.id).collect();
        all_rows.extend(rows);
        level += 1;
    }

    let mut author_ids: Vec<Uuid> = all_rows.iter().filter_map(|r| r.author_user_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();
    let users = fetch_users(pool, &author_ids).await?;

    let posts: Vec<Post> = all_rows
        .into_iter()
        .map(|r| Post {
            id: r.id,
            created_at: r.created_at,
            edited_at: r.edited_at,
            deleted_at: r.deleted_at,
            last_active_at: r.last_active_at,
            content: r.content,
            warning: r.warning,
            author: r.author_user_id.and_then(|id| users.get(&id).cloned()),
            parent_post_id: Some(r.parent_post_id),
            parent_post: None,
        })
        .collect();

    let newest: Option<(DateTime<Utc>, Uuid)> = sqlx::query_as(
        "select posts.created_at, posts.id
         from posts
         join post_ancestors pa on pa.descendant_id = posts.id
         where pa.ancestor_id = $1 and pa.distance > 0
         order by posts.created_at desc, posts.id asc
         limit 1",
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await?;

    let companion = newest.map(|(timestamp, id)| PageToken {
        timestamp,
        id,
        direction: Direction::Newer,
    });

    Ok((posts, companion))
}

// ============================================================================
// PostDescendantsByID (spec §4.4.3)
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct DescendantRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    last_active_at: DateTime<Utc>,
    content: Option<String>,
    warning: Option<String>,
    author_user_id: Option<Uuid>,
}

pub async fn post_descendants_by_id(
    pool: &PgPool,
    post_id: Uuid,
    child_depth: i32,
    page_token: Option<PageToken>,
    limit: i64,
) -> AppResult<(Vec<Post>, TokenPair)> {
    let direction = page_token.map(|t| t.direction).unwrap_or(Direction::Unset);

    let rows: Vec<DescendantRow> = match page_token {
        Some(t) if t.direction == Direction::Older => {
            sqlx::query_as(
                "select posts.id, posts.created_at, posts.edited_at, posts.deleted_at,
                        posts.last_active_at, posts.content, posts.warning, posts.author_user_id
                 from posts
                 join post_ancestors pa on pa.descendant_id = posts.id
                 where pa.ancestor_id = $1 and pa.distance > 0 and pa.distance <= $2
                   and ((posts.created_at < $3) or (posts.created_at = $3 and posts.id > $4))
                 order by posts.created_at desc, posts.id asc
                 limit $5",
            )
            .bind(post_id)
            .bind(child_depth)
            .bind(t.timestamp)
            .bind(t.id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        Some(t) if t.direction == Direction::Newer => {
            sqlx::query_as(
                "select posts.id, posts.created_at, posts.edited_at, posts.deleted_at,
                        posts.last_active_at, posts.content, posts.warning, posts.author_user_id
                 from posts
                 join post_ancestors pa on pa.descendant_id = posts.id
                 where pa.ancestor_id = $1 and pa.distance > 0 and pa.distance <= $2
                   and ((posts.created_at > $3) or (posts.created_at = $3 and posts.id < $4))
                 order by posts.created_at desc, posts.id asc
                 limit $5",
            )
            .bind(post_id)
            .bind(child_depth)
            .bind(t.timestamp)
            .bind(t.id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        _ => {
            sqlx::query_as(
                "select posts.id, posts.created_at, posts.edited_at, posts.deleted_at,
                        posts.last_active_at, posts.content, posts.warning, posts.author_user_id
                 from posts
                 join post_ancestors pa on pa.descendant_id = posts.id
                 where pa.ancestor_id = $1 and pa.distance > 0 and pa.distance <= $2
                 order by posts.created_at desc, posts.id asc
                 limit $3",
            )
            .bind(post_id)
            .bind(child_depth)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    // Ancestor chain truncated at the branching ancestor (postID itself) —
    // every row between the descendant and postID, postID included, but
    // nothing above it (spec §4.4.3).
    let mut chains: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    if !ids.is_empty() {
        let chain_rows: Vec<ChainRow> = sqlx::query_as(
            "select pa.descendant_id, pa.ancestor_id
             from post_ancestors pa
             join post_ancestors root on root.descendant_id = pa.descendant_id and root.ancestor_id = $2
             where pa.descendant_id = any($1) and pa.distance >= 1 and pa.distance <= root.distance
             order by pa.descendant_id, pa.distance asc",
        )
        .bind(&ids)
        .bind(post_id)
        .fetch_all(pool)
        .await?;
        for row in chain_rows {
            chains.entry(row.descendant_id).or_default().push(row.ancestor_id);
        }
    }

    let mut ancestor_ids: Vec<Uuid> = chains.values().flatten().copied().collect();
    ancestor_ids.sort_unstable();
    ancestor_ids.dedup();
    let ancestor_skeleton = fetch_skeleton(pool, &ancestor_ids).await?;

    let mut author_ids: Vec<Uuid> = rows
        .iter()
        .filter_map(|r| r.author_user_id)
        .chain(ancestor_skeleton.values().filter_map(|r| r.author_user_id))
        .collect();
    author_ids.sort_unstable();
    author_ids.dedup();
    let users = fetch_users(pool, &author_ids).await?;

    let ancestor_posts: HashMap<Uuid, Post> = ancestor_skeleton
        .iter()
        .map(|(id, row)| (*id, row_to_post(row, &users)))
        .collect();

    let posts: Vec<Post> = rows
        .iter()
        .map(|r| {
            let mut post = Post {
                id: r.id,
                created_at: r.created_at,
                edited_at: r.edited_at,
                deleted_at: r.deleted_at,
                last_active_at: r.last_active_at,
                content: r.content.clone(),
                warning: r.warning.clone(),
                author: r.author_user_id.and_then(|id| users.get(&id).cloned()),
                parent_post_id: None,
                parent_post: None,
            };
            if let Some(chain) = chains.get(&r.id) {
                post.parent_post_id = chain.first().copied();
                post.parent_post = build_parent_chain(chain, &ancestor_posts);
            }
            post
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

    Ok((posts, pair))
}

// ============================================================================
// CreatePost (spec §4.3)
// ============================================================================

pub struct NewPost {
    pub author_id: Uuid,
    pub content: String,
    pub warning: Option<String>,
    pub parent_post_id: Option<Uuid>,
}

/// Runs the full post-creation sequence inside `tx`: insert, extend the
/// closure, bump ancestor activity, fan out the publication or notification,
/// and queue the on-commit wake-ups. Nothing here publishes to the bus
/// directly — every `Bus::publish` call is wrapped in `tx.on_commit` so an
/// aborted transaction can never wake a reader (spec §4.3 step 7, §8
/// property 7).
pub async fn create_post(tx: &mut Tx<'_>, new_post: NewPost) -> AppResult<Post> {
    let author: User = sqlx::query_as("select id, name from users where id = $1")
        .bind(new_post.author_id)
        .fetch_optional(&mut *tx.conn())
        .await?
        .ok_or_else(|| AppError::NotFound("author".into()))?;

    if let Some(parent_id) = new_post.parent_post_id {
        let parent_exists: bool =
            sqlx::query_scalar("select exists(select 1 from posts where id = $1)")
                .bind(parent_id)
                .fetch_one(&mut *tx.conn())
                .await?;
        if !parent_exists {
            return Err(AppError::NotFound("parent_post_id".into()));
        }
    }

    let (post_id, created_at, last_active_at): (Uuid, DateTime<Utc>, DateTime<Utc>) =
        sqlx::query_as(
            "insert into posts (author_user_id, content, warning)
             values ($1, $2, $3)
             returning id, created_at, last_active_at",
        )
        .bind(new_post.author_id)
        .bind(&new_post.content)
        .bind(&new_post.warning)
        .fetch_one(&mut *tx.conn())
        .await?;

    sqlx::query("insert into post_ancestors (descendant_id, ancestor_id, distance) values ($1, $1, 0)")
        .bind(post_id)
        .execute(&mut *tx.conn())
        .await?;

    let mut path: Vec<Uuid> = Vec::new();

    if let Some(parent_id) = new_post.parent_post_id {
        sqlx::query(
            "insert into post_ancestors (descendant_id, ancestor_id, distance)
             select $1, ancestor_id, distance + 1
             from post_ancestors
             where descendant_id = $2",
        )
        .bind(post_id)
        .bind(parent_id)
        .execute(&mut *tx.conn())
        .await?;

        let ancestor_rows: Vec<(Uuid,)> = sqlx::query_as(
            "select ancestor_id from post_ancestors where descendant_id = $1 order by distance asc",
        )
        .bind(parent_id)
        .fetch_all(&mut *tx.conn())
        .await?;
        path = ancestor_rows.into_iter().map(|(id,)| id).collect();

        sqlx::query(
            "update posts set last_active_at = now()
             where id in (select ancestor_id from post_ancestors where descendant_id = $1 and distance > 0)",
        )
        .bind(post_id)
        .execute(&mut *tx.conn())
        .await?;
    }

    if path.is_empty() {
        sqlx::query(
            "insert into publications (post_id, channel_id, publisher_user_id, private)
             values ($1, $2, $2, false)",
        )
        .bind(post_id)
        .bind(author.id)
        .execute(&mut *tx.conn())
        .await?;

        let mut fanout: Vec<Uuid> = sqlx::query_scalar(
            "select user_id from subscriptions where channel_id = $1",
        )
        .bind(author.id)
        .fetch_all(&mut *tx.conn())
        .await?;
        fanout.push(author.id);
        fanout.sort_unstable();
        fanout.dedup();

        tx.on_commit(move |bus: &Bus| {
            for user_id in fanout {
                bus.publish(&format!("user:{}", encode_id(user_id)));
            }
        });
    } else {
        let parent_author: Option<Uuid> = sqlx::query_scalar(
            "select author_user_id from posts where id = $1",
        )
        .bind(new_post.parent_post_id.expect("path non-empty implies a parent"))
        .fetch_one(&mut *tx.conn())
        .await?;

        if let Some(parent_author_id) = parent_author {
            sqlx::query(
                "insert into notifications (type, user_id, reply_post_id)
                 values ('reply', $1, $2)",
            )
            .bind(parent_author_id)
            .bind(post_id)
            .execute(&mut *tx.conn())
            .await?;

            let path_for_wakeups = path.clone();
            tx.on_commit(move |bus: &Bus| {
                bus.publish(&format!("notifications:{}", encode_id(parent_author_id)));
                for ancestor_id in path_for_wakeups {
                    bus.publish(&format!("descendants:{}", encode_id(ancestor_id)));
                }
            });
        } else {
            let path_for_wakeups = path.clone();
            tx.on_commit(move |bus: &Bus| {
                for ancestor_id in path_for_wakeups {
                    bus.publish(&format!("descendants:{}", encode_id(ancestor_id)));
                }
            });
        }
    }

    Ok(Post {
        id: post_id,
        created_at,
        edited_at: None,
        deleted_at: None,
        last_active_at,
        content: Some(new_post.content),
        warning: new_post.warning,
        author: Some(author),
        parent_post_id: new_post.parent_post_id,
        parent_post: None,
    })
}

// ============================================================================
// DeletePost (spec §4.3 DESIGN NOTES, §8 property 2)
// ============================================================================

/// Tombstones `post_id`: blanks content/warning, sets `deleted_at`, and
/// deletes every `Publication` row referencing it. The row itself is never
/// physically removed (spec §3's Post lifecycle).
pub async fn delete_post(tx: &mut Tx<'_>, post_id: Uuid) -> AppResult<()> {
    sqlx::query(
        "update posts
         set deleted_at = now(), content = null, warning = null
         where id = $1 and deleted_at is null",
    )
    .bind(post_id)
    .execute(&mut *tx.conn())
    .await?;

    sqlx::query("delete from publications where post_id = $1")
        .bind(post_id)
        .execute(&mut *tx.conn())
        .await?;

    Ok(())
}

/// Fetches just enough of a post to check existence and authorship, for
/// `DeletePost`'s permission gate (spec §6.1: "only the author may delete").
pub async fn post_author(pool: &PgPool, post_id: Uuid) -> AppResult<Option<Uuid>> {
    let row: Option<(Option<Uuid>,)> =
        sqlx::query_as("select author_user_id from posts where id = $1 and deleted_at is null")
            .bind(post_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(author,)| author))
}

// ============================================================================
// Wait coordinator support (spec §4.5)
// ============================================================================

/// The existence check `WaitForPostDescendants` re-runs on every long-poll
/// iteration: same visibility predicate as `PostDescendantsByID`'s `Newer`
/// branch, just projected down to a boolean.
pub async fn post_has_descendant_newer_than(
    pool: &PgPool,
    post_id: Uuid,
    child_depth: i32,
    after: DateTime<Utc>,
    after_id: Uuid,
) -> AppResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "select exists(
             select 1
             from posts
             join post_ancestors pa on pa.descendant_id = posts.id
             where pa.ancestor_id = $1 and pa.distance > 0 and pa.distance <= $2
               and ((posts.created_at > $3) or (posts.created_at = $3 and posts.id < $4))
         )",
    )
    .bind(post_id)
    .bind(child_depth)
    .bind(after)
    .bind(after_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}
