use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::db::{StoreError, UserStore};
use crate::models::user::{NewUser, User, UserRole, UserStatus};

const BCRYPT_COST: u32 = 10;

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: UserRole,
    pub exp: u64,
}

/// Issues and checks HS256 session tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + self.ttl.as_secs();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(AuthError::Token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

/// Hash a password on the blocking pool.
pub async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AuthError::Worker(e.to_string()))?
        .map_err(AuthError::Hash)
}

/// Check a password against a stored bcrypt hash on the blocking pool.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Worker(e.to_string()))?
        .map_err(AuthError::Hash)
}

/// Create an active admin account unless the username already exists.
/// Returns whether an account was created.
pub async fn ensure_admin(
    users: &dyn UserStore,
    username: &str,
    password: &str,
) -> Result<bool, BootstrapError> {
    if users.find_user_by_username(username).await?.is_some() {
        return Ok(false);
    }
    let admin = users
        .insert_user(NewUser {
            username: username.to_string(),
            password_hash: hash_password(password.to_string()).await?,
            nickname: username.to_string(),
            role: UserRole::Admin,
            status: UserStatus::Active,
        })
        .await?;
    tracing::info!(user_id = %admin.id, username = %admin.username, "Bootstrapped admin account");
    Ok(true)
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to sign token: {0}")]
    Token(jsonwebtoken::errors::Error),

    #[error("invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("blocking task failed: {0}")]
    Worker(String),
}
