//! Bearer-token-to-principal resolution (spec.md §6.1's last paragraph).
//!
//! The RPC transport and auth middleware that maps an opaque bearer token to
//! a principal are named in spec.md §1 as out-of-scope external
//! collaborators; this extractor is the minimal concrete seam the core needs
//! so authenticated methods can be exercised at all (SPEC_FULL.md §1.A). The
//! bearer token *is* the session id: no JWT, no refresh flow — that
//! machinery belongs to the external auth collaborator, not this core.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated principal: a live `Session` row's owning user and
/// scopes. Fields are private — the only constructor is the
/// `FromRequestParts` impl, so a handler can never forge one via a struct
/// literal.
pub struct AuthUser {
    user_id: Uuid,
    scopes: Vec<String>,
}

impl AuthUser {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthenticated)?;

        let session_id =
            Uuid::parse_str(bearer.token()).map_err(|_| AppError::Unauthenticated)?;

        // Single `UPDATE ... RETURNING` both authenticates and bumps
        // activity, with no separate read-then-write round trip.
        let row = sqlx::query_as::<_, (Uuid, Vec<String>)>(
            "update sessions set last_active_at = now() where id = $1
             returning user_id, scopes",
        )
        .bind(session_id)
        .fetch_optional(&state.pool)
        .await?;

        let (user_id, scopes) = row.ok_or(AppError::Unauthenticated)?;

        Ok(AuthUser { user_id, scopes })
    }
}
