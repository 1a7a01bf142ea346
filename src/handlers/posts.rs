//! HTTP handlers for the post-graph RPCs (spec.md §6.1, SPEC_FULL.md §6.1.A):
//! `GetPost`, `CreatePost`, `GetPostChildren`, `GetPostDescendants`,
//! `DeletePost`. Each handler is a thin transport adapter — request decoding,
//! an `AuthUser` extraction where required, one call into `crate::engine`,
//! and DTO assembly. No query logic lives here.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::AuthUser;
use crate::db::tx::{AccessMode, Tx};
use crate::engine::posts::{
    self, create_post as engine_create_post, delete_post as engine_delete_post, NewPost,
};
use crate::error::{AppError, AppResult};
use crate::id::encode_id;
use crate::models::{CreatePostRequest, PostDto};
use crate::pagetoken::{Direction, TokenPair};
use crate::state::AppState;
use crate::wait::wait_for;

use super::shared::{
    clamp_limit, parse_children_page_token, parse_id, parse_optional_id, parse_page_token,
    validation_error, wait_direction, DEFAULT_CHILD_DEPTH, DEFAULT_CHILD_LIMIT,
    DEFAULT_PARENT_DEPTH, DEFAULT_TOPLEVEL_LIMIT,
};

#[derive(Debug, Serialize, Default)]
pub struct TokenPairDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

impl From<TokenPair> for TokenPairDto {
    fn from(pair: TokenPair) -> Self {
        TokenPairDto {
            next: pair.next.map(|t| t.encode()),
            prev: pair.prev.map(|t| t.encode()),
        }
    }
}

// ============================================================================
// GetPost
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GetPostQuery {
    pub parent_depth: Option<i32>,
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(query): Query<GetPostQuery>,
) -> AppResult<Json<PostDto>> {
    let id = parse_id(&post_id, "post_id")?;
    let parent_depth = query.parent_depth.unwrap_or(DEFAULT_PARENT_DEPTH);

    let mut found = posts::posts_by_id(&state.pool, &[id], parent_depth).await?;
    let post = found
        .remove(&id)
        .ok_or_else(|| AppError::NotFound("post_id".into()))?;

    Ok(Json(post.into()))
}

// ============================================================================
// CreatePost
// ============================================================================

pub async fn create_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostDto>)> {
    req.validate().map_err(validation_error)?;

    let parent_post_id = parse_optional_id(req.parent_post_id.as_deref(), "parent_post_id")?;

    let mut tx = Tx::begin(&state.pool, AccessMode::ReadWrite).await?;
    let post = engine_create_post(
        &mut tx,
        NewPost {
            author_id: auth_user.user_id(),
            content: req.content,
            warning: req.warning,
            parent_post_id,
        },
    )
    .await?;
    tx.commit(&state.bus).await?;

    Ok((StatusCode::CREATED, Json(post.into())))
}

// ============================================================================
// GetPostChildren
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GetPostChildrenQuery {
    pub child_depth: Option<i32>,
    pub child_limit: Option<i64>,
    pub toplevel_limit: Option<i64>,
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostChildrenResponse {
    pub posts: Vec<PostDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descendants_page_token: Option<String>,
}

pub async fn get_post_children(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(query): Query<GetPostChildrenQuery>,
) -> AppResult<Json<PostChildrenResponse>> {
    let id = parse_id(&post_id, "post_id")?;
    let child_depth = query.child_depth.unwrap_or(DEFAULT_CHILD_DEPTH).max(1);
    let child_limit = query.child_limit.unwrap_or(DEFAULT_CHILD_LIMIT).max(1);
    let toplevel_limit = query
        .toplevel_limit
        .map(|n| n.clamp(1, super::shared::MAX_PAGE_LIMIT))
        .unwrap_or(DEFAULT_TOPLEVEL_LIMIT);
    let page_token = parse_children_page_token(query.page_token.as_deref())?;

    let (posts, companion) =
        posts::post_children_by_id(&state.pool, id, child_depth, child_limit, toplevel_limit, page_token)
            .await?;

    Ok(Json(PostChildrenResponse {
        posts: posts.into_iter().map(PostDto::from).collect(),
        descendants_page_token: companion.map(|t| t.encode()),
    }))
}

// ============================================================================
// GetPostDescendants
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GetPostDescendantsQuery {
    pub child_depth: Option<i32>,
    pub page_token: Option<String>,
    pub limit: Option<i64>,
    pub wait: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PostDescendantsResponse {
    pub posts: Vec<PostDto>,
    pub page_tokens: TokenPairDto,
}

pub async fn get_post_descendants(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(query): Query<GetPostDescendantsQuery>,
) -> AppResult<Json<PostDescendantsResponse>> {
    let id = parse_id(&post_id, "post_id")?;
    let child_depth = query.child_depth.unwrap_or(DEFAULT_CHILD_DEPTH).max(1);
    let limit = clamp_limit(query.limit);
    let page_token = parse_page_token(query.page_token.as_deref())?;

    let direction = wait_direction(query.wait, page_token);
    if direction == Direction::Newer {
        let token = page_token.expect("Newer direction implies a token");
        let topic = format!("descendants:{}", encode_id(id));
        wait_for(&state.bus, &topic, direction, || {
            posts::post_has_descendant_newer_than(&state.pool, id, child_depth, token.timestamp, token.id)
        })
        .await?;
    }

    let (posts, pair) =
        posts::post_descendants_by_id(&state.pool, id, child_depth, page_token, limit).await?;

    Ok(Json(PostDescendantsResponse {
        posts: posts.into_iter().map(PostDto::from).collect(),
        page_tokens: pair.into(),
    }))
}

// ============================================================================
// DeletePost
// ============================================================================

pub async fn delete_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<String>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let id = parse_id(&post_id, "post_id")?;

    let author = posts::post_author(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("post_id".into()))?;

    if author != auth_user.user_id() {
        return Err(AppError::PermissionDenied);
    }

    let mut tx = Tx::begin(&state.pool, AccessMode::ReadWrite).await?;
    engine_delete_post(&mut tx, id).await?;
    tx.commit(&state.bus).await?;

    Ok((StatusCode::OK, Json(json!({}))))
}
