use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a bearer token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /users
        // Registration. The only user endpoint that does not require a token.
        .route("/users", post(handlers::create_user))
        // POST /login
        // Exchanges credentials for a six-hour bearer token.
        .route("/login", post(handlers::login))
}
