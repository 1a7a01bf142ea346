//! `GetFeed` (spec.md §6.1, §4.4.4).

use axum::{extract::{Query, State}, Json};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::engine::feed::{self, FeedEntry};
use crate::error::AppResult;
use crate::id::encode_id;
use crate::models::{PostDto, PublicationDto, UserDto};
use crate::pagetoken::Direction;
use crate::state::AppState;
use crate::wait::wait_for;

use super::posts::TokenPairDto;
use super::shared::{clamp_limit, parse_page_token, wait_direction, DEFAULT_PARENT_DEPTH};

impl From<FeedEntry> for PublicationDto {
    fn from(entry: FeedEntry) -> Self {
        PublicationDto {
            post: PostDto::from(entry.post),
            publisher: UserDto::from(entry.publisher),
            channel_id: encode_id(entry.channel_id),
            private: entry.private,
            published_at: entry.published_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GetFeedQuery {
    pub parent_depth: Option<i32>,
    pub page_token: Option<String>,
    pub limit: Option<i64>,
    pub wait: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub publications: Vec<PublicationDto>,
    pub page_tokens: TokenPairDto,
}

pub async fn get_feed(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<GetFeedQuery>,
) -> AppResult<Json<FeedResponse>> {
    let user_id = auth_user.user_id();
    let parent_depth = query.parent_depth.unwrap_or(DEFAULT_PARENT_DEPTH);
    let limit = clamp_limit(query.limit);
    let page_token = parse_page_token(query.page_token.as_deref())?;

    let direction = wait_direction(query.wait, page_token);
    if direction == Direction::Newer {
        let token = page_token.expect("Newer direction implies a token");
        let topic = format!("user:{}", encode_id(user_id));
        wait_for(&state.bus, &topic, direction, || {
            feed::feed_has_newer_than(&state.pool, user_id, token.timestamp, token.id)
        })
        .await?;
    }

    let (entries, pair) = feed::feed(&state.pool, user_id, parent_depth, page_token, limit).await?;

    Ok(Json(FeedResponse {
        publications: entries.into_iter().map(PublicationDto::from).collect(),
        page_tokens: pair.into(),
    }))
}
