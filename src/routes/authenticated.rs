use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every route here sits behind the `auth_middleware` layer applied in `create_router`,
/// and each handler additionally receives the validated `AuthUser`. Owner-only checks
/// happen inside the handlers through `authz::ensure_owner`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Users ---
        // GET /users?user=<substring>
        .route("/users", get(handlers::search_users))
        // GET/PUT/DELETE /users/{id}
        // Mutations are owner-only.
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        // POST /users/{id}/follow, /users/{id}/stop-follow
        // Self-targeting is rejected with 403.
        .route("/users/{id}/follow", post(handlers::follow_user))
        .route("/users/{id}/stop-follow", post(handlers::stop_following_user))
        .route("/users/{id}/followers", get(handlers::get_followers))
        .route("/users/{id}/following", get(handlers::get_following))
        // POST /users/{id}/update-password
        .route(
            "/users/{id}/update-password",
            post(handlers::update_password),
        )
        .route("/users/{id}/publishes", get(handlers::get_user_publishes))
        // --- Publishes ---
        // POST creates, GET returns the caller's feed.
        .route(
            "/publishes",
            post(handlers::create_publish).get(handlers::get_feed),
        )
        // GET/PUT/DELETE /publishes/{id}
        // Mutations are author-only.
        .route(
            "/publishes/{id}",
            get(handlers::get_publish)
                .put(handlers::update_publish)
                .delete(handlers::delete_publish),
        )
        .route("/publishes/{id}/like", post(handlers::like_publish))
        .route("/publishes/{id}/unlike", post(handlers::unlike_publish))
}
