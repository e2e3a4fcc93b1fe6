use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{config::AppConfig, error::ApiError, models::UserId};

/// Lifetime of every issued token.
pub const TOKEN_TTL_HOURS: i64 = 6;

/// Claims
///
/// The payload signed into every bearer token. Tokens are stateless: nothing is stored
/// server-side, so a token stays valid until `exp` whatever happens to the user afterwards.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Always `true` for tokens issued by this service.
    pub authorized: bool,
    /// Expiration time, seconds since the Unix epoch.
    pub exp: i64,
    /// The subject: id of the user the token was issued to.
    pub user_id: u64,
}

/// AuthError
///
/// Every way a presented token (or credential) can fail. All of them map to 401.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed or missing token")]
    Malformed,
    #[error("unexpected signing algorithm")]
    AlgorithmMismatch,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token claims are invalid")]
    InvalidClaims,
    #[error("invalid credentials")]
    CredentialsMismatch,
}

/// TokenService
///
/// Issues and validates signed claims. Built once from `AppConfig` and shared through the
/// application state; the signing secret lives only here.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("validation", &self.validation)
            .finish()
    }
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        // Only the HMAC family is accepted; a token whose header names any other algorithm
        // is rejected before its signature is even looked at.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret)
    }

    /// Issues a token for `user_id` expiring `TOKEN_TTL_HOURS` from now.
    pub fn issue(&self, user_id: u64) -> Result<String, ApiError> {
        self.issue_at(user_id, Utc::now())
    }

    /// Issues a token as if it had been created at `issued_at`.
    pub fn issue_at(&self, user_id: u64, issued_at: DateTime<Utc>) -> Result<String, ApiError> {
        let claims = Claims {
            authorized: true,
            exp: (issued_at + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
            user_id,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
    }

    /// Verifies structure, algorithm, signature and expiry, returning the decoded claims.
    ///
    /// A readable header is checked first, so a JSON failure past that point can only come
    /// from a signed payload whose claims do not fit `Claims` (e.g. a missing or
    /// non-numeric `user_id`).
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode_header(token).map_err(|_| AuthError::Malformed)?;

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidAlgorithm => AuthError::AlgorithmMismatch,
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                ErrorKind::MissingRequiredClaim(_) | ErrorKind::Json(_) => AuthError::InvalidClaims,
                _ => AuthError::Malformed,
            })
    }

    /// Validates the token and returns its subject.
    pub fn extract_subject(&self, token: &str) -> Result<u64, AuthError> {
        self.validate(token).map(|claims| claims.user_id)
    }
}

/// bearer_token
///
/// Pulls `<token>` out of an `Authorization: Bearer <token>` header. A missing or
/// malformed header yields an empty string, which then fails validation.
pub fn bearer_token(headers: &HeaderMap) -> &str {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return "";
    };

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => token,
        _ => "",
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
}

/// Resolving `AuthUser` only validates the bearer token; there is no database lookup.
/// Rejects with 401 on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenService::from_ref(state);
        let subject = tokens.extract_subject(bearer_token(&parts.headers))?;

        let id = UserId::try_from(subject).map_err(|_| AuthError::InvalidClaims)?;
        Ok(AuthUser { id })
    }
}
