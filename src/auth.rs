use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub identity: Identity,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(username: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            identity: Identity {
                username: username.into(),
            },
            exp: (now + ttl).timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
        }
    }
}

/// Bearer token from the `Authorization` header, if one was sent.
/// A missing or malformed header is not a rejection here; the ownership
/// check decides what that means.
#[derive(Debug, Clone, Default)]
pub struct BearerToken(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await {
            Ok(TypedHeader(Authorization(bearer))) => Ok(Self(Some(bearer.token().to_string()))),
            Err(rejection) => {
                debug!("no bearer token: {rejection}");
                Ok(Self(None))
            }
        }
    }
}

impl BearerToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Verifies HS256 tokens signed with the service secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims.identity)
    }

    /// Ownership guard: passes only when a valid token names `username`.
    pub fn belongs_to(&self, token: Option<&str>, username: &str) -> Result<Identity, AppError> {
        let Some(token) = token else {
            debug!(username, "rejected request without token");
            return Err(AppError::Forbidden);
        };

        let identity = self.verify(token).map_err(|err| {
            warn!(username, "rejected token: {err}");
            AppError::Forbidden
        })?;

        if identity.username != username {
            warn!(
                username,
                token_user = %identity.username,
                "token does not belong to path user"
            );
            return Err(AppError::Forbidden);
        }

        Ok(identity)
    }
}

/// Signs a token for `username` valid for `ttl`.
pub fn issue_token(secret: &str, username: &str, ttl: Duration) -> Result<String, AppError> {
    let claims = Claims::new(username, ttl);
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AppError::Other(err.into()))
}
