use social_feed::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(env: &Env) {
    // RUST_LOG overrides the default filter.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("social_feed=debug,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match env {
        Env::Local => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
        Env::Production => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();
    init_tracing(&config.env);

    tracing::info!(env = ?config.env, port = config.port, "starting social-feed");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: cannot connect to Postgres, check DATABASE_URL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: database migrations failed");

    let repo: RepositoryState = Arc::new(PostgresRepository::new(pool));
    let port = config.port;
    let app = create_router(AppState::new(repo, config));

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("FATAL: cannot bind HTTP listener");

    tracing::info!("listening on 0.0.0.0:{port}, docs at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server stopped unexpectedly");
}
