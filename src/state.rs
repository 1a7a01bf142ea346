use sqlx::PgPool;

use crate::bus::Bus;

/// Shared application state passed to all handlers and extractors.
///
/// `Bus` is cheaply cloneable (it wraps an `Arc` internally), so cloning
/// `AppState` for each request is inexpensive.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub bus: Bus,
}
