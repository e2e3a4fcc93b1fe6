use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::{Level, Span};

pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod routes;

use auth::AuthUser;
use routes::{authenticated, public};

pub use auth::TokenService;
pub use config::AppConfig;
pub use error::ApiError;
pub use password::PasswordHasher;
pub use repository::{PostgresRepository, Repository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document aggregated from every `#[utoipa::path]` handler and schema.
/// Served at `/api-docs/openapi.json`, browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_user, handlers::search_users, handlers::get_user,
        handlers::update_user, handlers::delete_user, handlers::follow_user,
        handlers::stop_following_user, handlers::get_followers, handlers::get_following,
        handlers::update_password, handlers::login, handlers::create_publish,
        handlers::get_feed, handlers::get_publish, handlers::update_publish,
        handlers::delete_publish, handlers::get_user_publishes, handlers::like_publish,
        handlers::unlike_publish
    ),
    components(
        schemas(
            models::User, models::Publish, models::UserPayload, models::PublishPayload,
            models::LoginRequest, models::PasswordChange,
        )
    ),
    tags(
        (name = "social-feed", description = "Users, follows and publishes")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may need, cloned cheaply into each handler. Besides the
/// repository pool nothing in here is mutable; the signing secret is only reachable
/// through `tokens`.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub tokens: TokenService,
    pub hasher: PasswordHasher,
    pub config: AppConfig,
}

impl AppState {
    /// Builds the state for `repo`, deriving the token service from `config`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            repo,
            tokens: TokenService::from_config(&config),
            hasher: PasswordHasher::new(),
            config,
        }
    }
}

// Sub-states handlers and extractors pull out of `AppState`.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// Layer guarding the authenticated route group. Extracting `AuthUser` validates the
/// bearer token; on failure the request ends with 401 before any handler runs.
async fn require_token(_caller: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

const REQUEST_ID: &str = "x-request-id";

/// Builds the full application: docs, public and authenticated routes, then request ids,
/// tracing and CORS around everything.
pub fn create_router(state: AppState) -> Router {
    let protected = authenticated::authenticated_routes()
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    let request_id = HeaderName::from_static(REQUEST_ID);
    let observability = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .layer(PropagateRequestIdLayer::new(request_id));

    app.layer(observability).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Per-request span carrying method, path and request id. Headers are not recorded, so
/// bearer tokens never reach the logs.
fn request_span(request: &axum::http::Request<axum::body::Body>) -> Span {
    let req_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        req_id = %req_id,
    )
}
