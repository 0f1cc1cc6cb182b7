//! Authentication: bcrypt password hashes, HS256 session tokens, and the `AuthUser` extractor.
//!
//! Tokens carry the user id and role so role checks never touch the store.
//! A token stays valid until `exp` even if the user's role changes meanwhile.

use std::sync::Arc;

use axum::{
  async_trait,
  extract::FromRequestParts,
  http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use uuid::Uuid;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::AuthSettings;
use crate::domain::{Role, User, UserStats};
use crate::error::ApiError;
use crate::state::AppState;
use crate::util::normalize_email;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 2;

#[derive(Debug, Error)]
pub enum AuthError {
  #[error("no token provided")]
  MissingToken,
  #[error("invalid or expired token")]
  InvalidToken,
  #[error("role not allowed")]
  Forbidden,
  #[error("password hashing failed: {0}")]
  Hash(String),
  #[error("token encoding failed: {0}")]
  Encode(String),
}

/// JWT payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
  pub sub: String,
  pub role: Role,
  pub name: String,
  pub email: String,
  pub iat: i64,
  pub exp: i64,
}

/// Signing material plus hashing cost, built once at startup.
#[derive(Clone)]
pub struct AuthKeys {
  encoding: EncodingKey,
  decoding: DecodingKey,
  pub ttl_secs: i64,
  pub bcrypt_cost: u32,
}

impl AuthKeys {
  pub fn new(settings: &AuthSettings) -> Self {
    let secret = settings.jwt_secret.as_bytes();
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
      ttl_secs: settings.token_ttl_secs,
      bcrypt_cost: settings.bcrypt_cost,
    }
  }
}

pub fn hash_password(plain: &str, cost: u32) -> Result<String, AuthError> {
  bcrypt::hash(plain, cost).map_err(|e| AuthError::Hash(e.to_string()))
}

/// A malformed stored hash verifies as false rather than erroring.
pub fn verify_password(plain: &str, hash: &str) -> bool {
  match bcrypt::verify(plain, hash) {
    Ok(ok) => ok,
    Err(e) => {
      warn!(target: "auth", error = %e, "Stored password hash could not be verified");
      false
    }
  }
}

/// Hash on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password_async(plain: String, cost: u32) -> Result<String, AuthError> {
  tokio::task::spawn_blocking(move || hash_password(&plain, cost))
    .await
    .map_err(|e| AuthError::Hash(e.to_string()))?
}

pub async fn verify_password_async(plain: String, hash: String) -> bool {
  tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
    .await
    .unwrap_or(false)
}

pub fn issue_token(user: &User, keys: &AuthKeys) -> Result<String, AuthError> {
  let now = Utc::now().timestamp();
  let claims = Claims {
    sub: user.id.clone(),
    role: user.role,
    name: user.name.clone(),
    email: user.email.clone(),
    iat: now,
    exp: now + keys.ttl_secs,
  };
  encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
    .map_err(|e| AuthError::Encode(e.to_string()))
}

pub fn verify_token(token: &str, keys: &AuthKeys) -> Result<Claims, AuthError> {
  let mut validation = Validation::new(Algorithm::HS256);
  validation.leeway = 0;
  decode::<Claims>(token, &keys.decoding, &validation)
    .map(|data| data.claims)
    .map_err(|e| {
      debug!(target: "auth", error = %e, "Token rejected");
      AuthError::InvalidToken
    })
}

/// Input for creating an account, before validation.
#[derive(Debug, Default)]
pub struct NewAccount {
  pub name: Option<String>,
  pub email: Option<String>,
  pub password: Option<String>,
  pub role: Role,
}

/// Validate, hash and store a new user. Email uniqueness is enforced by the store.
#[instrument(level = "info", skip(state, new), fields(role = new.role.as_str()))]
pub async fn create_account(state: &AppState, new: NewAccount) -> Result<User, ApiError> {
  let (Some(name), Some(email), Some(password)) = (
    new.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    new.email.map(|e| normalize_email(&e)).filter(|e| !e.is_empty()),
    new.password.filter(|p| !p.is_empty()),
  ) else {
    return Err(ApiError::bad_request("Name, email and password are required"));
  };
  if name.chars().count() < MIN_NAME_LEN {
    return Err(ApiError::bad_request(format!("Name must be at least {MIN_NAME_LEN} characters")));
  }
  if !email.contains('@') {
    return Err(ApiError::bad_request("Email is invalid"));
  }
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(ApiError::bad_request(format!("Password must be at least {MIN_PASSWORD_LEN} characters")));
  }
  if state.store.find_user_by_email(&email).await?.is_some() {
    return Err(ApiError::conflict("Email is already registered"));
  }

  let password_hash = hash_password_async(password, state.auth.bcrypt_cost).await?;
  let now = Utc::now();
  let user = User {
    id: Uuid::new_v4().to_string(),
    name,
    email,
    password_hash,
    role: new.role,
    stats: UserStats::default(),
    created_at: now,
    updated_at: now,
  };
  state.store.insert_user(&user).await.map_err(|e| match e {
    crate::store::StoreError::Conflict(_) => ApiError::conflict("Email is already registered"),
    other => other.into(),
  })?;
  info!(target: "auth", user = %user.id, role = user.role.as_str(), "Account created");
  Ok(user)
}

/// Check credentials. Unknown email and wrong password look the same to the caller.
#[instrument(level = "info", skip_all)]
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> Result<User, ApiError> {
  let invalid = || ApiError::Unauthorized("Invalid credentials".into());
  let user = state.store.find_user_by_email(&normalize_email(email)).await?.ok_or_else(invalid)?;
  if !verify_password_async(password.to_string(), user.password_hash.clone()).await {
    warn!(target: "auth", user = %user.id, "Wrong password");
    return Err(invalid());
  }
  Ok(user)
}

/// Authenticated caller, extracted from `Authorization: Bearer <token>`.
#[derive(Clone, Debug)]
pub struct AuthUser {
  pub id: String,
  pub role: Role,
  pub name: String,
}

impl AuthUser {
  /// Role gate. An empty list admits any logged-in user.
  pub fn require(&self, allowed: &[Role]) -> Result<&Self, ApiError> {
    if allowed.is_empty() || allowed.contains(&self.role) {
      Ok(self)
    } else {
      warn!(target: "auth", user = %self.id, role = self.role.as_str(), "Role not allowed");
      Err(AuthError::Forbidden.into())
    }
  }

  pub fn require_admin(&self) -> Result<&Self, ApiError> {
    self.require(&[Role::Admin])
  }
}

impl From<Claims> for AuthUser {
  fn from(c: Claims) -> Self {
    Self { id: c.sub, role: c.role, name: c.name }
  }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
  let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
  value.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
    let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
    let claims = verify_token(token, &state.auth)?;
    Ok(claims.into())
  }
}
