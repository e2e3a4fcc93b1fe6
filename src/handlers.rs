use crate::{
    AppState,
    auth::{AuthError, AuthUser},
    authz::{Account, ensure_owner},
    error::ApiError,
    extract::{Json, Path},
    models::{
        LoginRequest, PasswordChange, Publish, PublishPayload, Stage, User, UserId, UserPayload,
        UserSearch,
    },
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
};

/// Turns a unique-constraint violation on `users` into a client error; anything else
/// stays a persistence failure.
fn user_write_error(error: sqlx::Error) -> ApiError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Validation("nick or email already in use".into())
        }
        _ => ApiError::Persistence(error),
    }
}

/// A write naming a user row that no longer exists (a token can outlive its account)
/// violates a foreign key; that is reported as the user being missing.
fn user_reference_error(error: sqlx::Error) -> ApiError {
    match &error {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => ApiError::NotFound("user"),
        _ => ApiError::Persistence(error),
    }
}

// --- Users ---

/// create_user
///
/// [Public Route] Registers a new account. The submitted password is hashed before it
/// reaches the repository and is never echoed back.
#[utoipa::path(
    post,
    path = "/users",
    request_body = UserPayload,
    responses(
        (status = 201, description = "Registered", body = User),
        (status = 400, description = "Validation failed"),
        (status = 422, description = "Unparseable body")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<UserPayload>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    payload.prepare(Stage::Register, &state.hasher)?;

    let user = state
        .repo
        .create_user(&payload)
        .await
        .map_err(user_write_error)?;

    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// search_users
///
/// [Authenticated Route] Case-insensitive substring search over name and nick.
#[utoipa::path(
    get,
    path = "/users",
    params(UserSearch),
    responses((status = 200, description = "Matching users", body = [User]))
)]
pub async fn search_users(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(search): Query<UserSearch>,
) -> Result<Json<Vec<User>>, ApiError> {
    let needle = search.user.unwrap_or_default().to_lowercase();
    Ok(Json(state.repo.search_users(&needle).await?))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    state
        .repo
        .get_user(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("user"))
}

/// update_user
///
/// [Authenticated Route] Owner-only profile update (name, nick, email).
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UserPayload,
    responses(
        (status = 204, description = "Updated"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    payload: Result<Json<UserPayload>, ApiError>,
) -> Result<StatusCode, ApiError> {
    ensure_owner(&Account(id), &user, "cannot update another user")?;

    let Json(mut payload) = payload?;
    payload.prepare(Stage::Update, &state.hasher)?;

    state
        .repo
        .update_user(id, &payload)
        .await
        .map_err(user_write_error)?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(StatusCode::NO_CONTENT)
}

/// delete_user
///
/// [Authenticated Route] Owner-only account removal. Tokens already issued for the
/// account stay valid until they expire.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    ensure_owner(&Account(id), &user, "cannot delete another user")?;

    if !state.repo.delete_user(id).await? {
        return Err(ApiError::NotFound("user"));
    }

    tracing::info!(user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// follow_user
///
/// [Authenticated Route] The caller starts following `{id}`. Following twice is a no-op.
#[utoipa::path(
    post,
    path = "/users/{id}/follow",
    params(("id" = i64, Path, description = "User to follow")),
    responses(
        (status = 204, description = "Following"),
        (status = 403, description = "Cannot follow yourself"),
        (status = 404, description = "Target or caller account not found")
    )
)]
pub async fn follow_user(
    AuthUser { id: follower_id }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    if id == follower_id {
        return Err(ApiError::Forbidden("cannot follow yourself"));
    }

    if state.repo.get_user(id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }

    state
        .repo
        .follow(id, follower_id)
        .await
        .map_err(user_reference_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/users/{id}/stop-follow",
    params(("id" = i64, Path, description = "User to stop following")),
    responses(
        (status = 204, description = "Not following"),
        (status = 403, description = "Cannot unfollow yourself")
    )
)]
pub async fn stop_following_user(
    AuthUser { id: follower_id }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    if id == follower_id {
        return Err(ApiError::Forbidden("cannot unfollow yourself"));
    }

    state.repo.unfollow(id, follower_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/users/{id}/followers",
    params(("id" = i64, Path, description = "User ID")),
    responses((status = 200, description = "Followers", body = [User]))
)]
pub async fn get_followers(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.repo.get_followers(id).await?))
}

#[utoipa::path(
    get,
    path = "/users/{id}/following",
    params(("id" = i64, Path, description = "User ID")),
    responses((status = 200, description = "Followed users", body = [User]))
)]
pub async fn get_following(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.repo.get_following(id).await?))
}

/// update_password
///
/// [Authenticated Route] Owner-only password change. The current password must verify
/// against the stored hash; the new one is hashed before storage. Neither value is logged.
#[utoipa::path(
    post,
    path = "/users/{id}/update-password",
    params(("id" = i64, Path, description = "User ID")),
    request_body = PasswordChange,
    responses(
        (status = 204, description = "Password changed"),
        (status = 401, description = "Current password does not match"),
        (status = 403, description = "Not Owner")
    )
)]
pub async fn update_password(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    payload: Result<Json<PasswordChange>, ApiError>,
) -> Result<StatusCode, ApiError> {
    ensure_owner(&Account(id), &user, "cannot change another user's password")?;

    let Json(change) = payload?;
    change.validate()?;

    let stored = state
        .repo
        .get_password_hash(id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    state.hasher.verify(&stored, &change.current)?;

    let hash = state.hasher.hash(&change.new)?;
    if !state.repo.set_password_hash(id, &hash).await? {
        return Err(ApiError::NotFound("user"));
    }

    Ok(StatusCode::NO_CONTENT)
}

// --- Login ---

/// login
///
/// [Public Route] Exchanges email and password for a signed bearer token, returned as the
/// raw response body. Unknown email and wrong password are indistinguishable to the caller.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token", body = String, content_type = "text/plain"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<String, ApiError> {
    let credentials = state
        .repo
        .get_credentials(request.email.trim())
        .await?
        .ok_or(AuthError::CredentialsMismatch)?;

    state.hasher.verify(&credentials.password, &request.password)?;

    let subject = u64::try_from(credentials.id)
        .map_err(|_| ApiError::Internal(format!("user id {} out of range", credentials.id)))?;

    tracing::info!(user_id = credentials.id, "login succeeded");
    state.tokens.issue(subject)
}

// --- Publishes ---

#[utoipa::path(
    post,
    path = "/publishes",
    request_body = PublishPayload,
    responses(
        (status = 201, description = "Created", body = Publish),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Author account no longer exists")
    )
)]
pub async fn create_publish(
    AuthUser { id: author_id }: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<PublishPayload>,
) -> Result<(StatusCode, Json<Publish>), ApiError> {
    payload.prepare()?;

    let publish = state
        .repo
        .create_publish(author_id, &payload)
        .await
        .map_err(user_reference_error)?;
    Ok((StatusCode::CREATED, Json(publish)))
}

/// get_feed
///
/// [Authenticated Route] The caller's own publishes plus those of everyone they follow,
/// newest first.
#[utoipa::path(
    get,
    path = "/publishes",
    responses((status = 200, description = "Feed", body = [Publish]))
)]
pub async fn get_feed(
    AuthUser { id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Publish>>, ApiError> {
    Ok(Json(state.repo.get_feed(id).await?))
}

#[utoipa::path(
    get,
    path = "/publishes/{id}",
    params(("id" = i64, Path, description = "Publish ID")),
    responses(
        (status = 200, description = "Found", body = Publish),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_publish(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Publish>, ApiError> {
    state
        .repo
        .get_publish(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("publish"))
}

/// update_publish
///
/// [Authenticated Route] Owner-only. Ownership is decided before the body is even
/// parsed, so a non-author gets 403 whatever they send.
#[utoipa::path(
    put,
    path = "/publishes/{id}",
    params(("id" = i64, Path, description = "Publish ID")),
    request_body = PublishPayload,
    responses(
        (status = 204, description = "Updated"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_publish(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<PublishPayload>, ApiError>,
) -> Result<StatusCode, ApiError> {
    let stored = state
        .repo
        .get_publish(id)
        .await?
        .ok_or(ApiError::NotFound("publish"))?;
    ensure_owner(&stored, &user, "cannot update a publish you did not author")?;

    let Json(mut payload) = payload?;
    payload.prepare()?;

    if !state.repo.update_publish(id, &payload).await? {
        return Err(ApiError::NotFound("publish"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/publishes/{id}",
    params(("id" = i64, Path, description = "Publish ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_publish(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let stored = state
        .repo
        .get_publish(id)
        .await?
        .ok_or(ApiError::NotFound("publish"))?;
    ensure_owner(&stored, &user, "cannot delete a publish you did not author")?;

    if !state.repo.delete_publish(id).await? {
        return Err(ApiError::NotFound("publish"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/users/{id}/publishes",
    params(("id" = i64, Path, description = "Author ID")),
    responses((status = 200, description = "Publishes by the user", body = [Publish]))
)]
pub async fn get_user_publishes(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<Publish>>, ApiError> {
    Ok(Json(state.repo.get_publishes_by_user(id).await?))
}

#[utoipa::path(
    post,
    path = "/publishes/{id}/like",
    params(("id" = i64, Path, description = "Publish ID")),
    responses(
        (status = 204, description = "Liked"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn like_publish(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.repo.like_publish(id).await? {
        return Err(ApiError::NotFound("publish"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/publishes/{id}/unlike",
    params(("id" = i64, Path, description = "Publish ID")),
    responses(
        (status = 204, description = "Unliked"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn unlike_publish(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.repo.unlike_publish(id).await? {
        return Err(ApiError::NotFound("publish"));
    }
    Ok(StatusCode::NO_CONTENT)
}
