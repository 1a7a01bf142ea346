use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use threadline_server::bus::Bus;
use threadline_server::config::Config;
use threadline_server::state::AppState;
use threadline_server::{db, handlers};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "threadline_server=info,tower_http=info,sqlx=warn".parse().unwrap());

    if std::env::var("APP_ENV").as_deref() == Ok("production") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("threadline-server starting");

    let config = Config::from_env().expect("failed to load configuration");

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run database migrations");
    info!("database migrations applied");

    db::health_check(&pool)
        .await
        .expect("database health check failed");

    let app_state = AppState {
        pool,
        bus: Bus::new(),
    };

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/posts", post(handlers::posts::create_post))
        .route("/posts/:id", get(handlers::posts::get_post))
        .route("/posts/:id", delete(handlers::posts::delete_post))
        .route("/posts/:id/children", get(handlers::posts::get_post_children))
        .route(
            "/posts/:id/descendants",
            get(handlers::posts::get_post_descendants),
        )
        .route("/feed", get(handlers::feed::get_feed))
        .route("/notifications", get(handlers::notifications::get_notifications))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = config.server_addr();
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind to address");

    axum::serve(listener, app).await.expect("server failed to start");
}
