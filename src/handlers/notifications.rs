//! `GetNotifications` (spec.md §6.1, §4.4.5).

use axum::{extract::{Query, State}, Json};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::engine::notifications::{self, NotificationEntry};
use crate::error::AppResult;
use crate::id::encode_id;
use crate::models::{NotificationDto, PostDto};
use crate::pagetoken::Direction;
use crate::state::AppState;
use crate::wait::wait_for;

use super::posts::TokenPairDto;
use super::shared::{clamp_limit, parse_page_token, wait_direction, DEFAULT_PARENT_DEPTH};

impl From<NotificationEntry> for NotificationDto {
    fn from(entry: NotificationEntry) -> Self {
        NotificationDto {
            id: encode_id(entry.id),
            r#type: entry.kind,
            created_at: entry.created_at,
            reply_post: entry.reply_post.map(PostDto::from),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GetNotificationsQuery {
    pub page_token: Option<String>,
    pub limit: Option<i64>,
    pub wait: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<NotificationDto>,
    pub page_tokens: TokenPairDto,
}

pub async fn get_notifications(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<GetNotificationsQuery>,
) -> AppResult<Json<NotificationsResponse>> {
    let user_id = auth_user.user_id();
    let limit = clamp_limit(query.limit);
    let page_token = parse_page_token(query.page_token.as_deref())?;

    let direction = wait_direction(query.wait, page_token);
    if direction == Direction::Newer {
        let token = page_token.expect("Newer direction implies a token");
        let topic = format!("notifications:{}", encode_id(user_id));
        wait_for(&state.bus, &topic, direction, || {
            notifications::notifications_has_newer_than(&state.pool, user_id, token.timestamp, token.id)
        })
        .await?;
    }

    // `GetNotifications` hydrates each referenced reply post with no parent
    // chain — the notification already names the post; callers that want its
    // ancestry fetch it separately via `GetPost`.
    let (entries, pair) = notifications::notifications(&state.pool, user_id, 0, page_token, limit).await?;

    Ok(Json(NotificationsResponse {
        notifications: entries.into_iter().map(NotificationDto::from).collect(),
        page_tokens: pair.into(),
    }))
}
