//! Credentials: argon2 password hashing, HS256 access tokens, opaque refresh
//! tokens, and the [`CurrentActor`] extractor.

use argon2::{
  Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier as _,
  password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
  Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use visiomed_core::{
  Error, Result,
  authz::{Actor, CredentialVerifier, load_actor},
  identity::PasswordHasher,
  store::Store,
};

use crate::{AppState, error::ApiError};

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Argon2id with the crate's default parameters, PHC-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
  fn hash(&self, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map(|h| h.to_string())
      .map_err(|e| Error::invalid(format!("password cannot be hashed: {e}")))
  }

  fn verify(&self, password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
      Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
    })
  }

  fn recognizes(&self, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| parsed.algorithm.as_str().starts_with("argon2"))
  }
}

// ─── Access tokens ───────────────────────────────────────────────────────────

const ACCESS: &str = "access";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
  /// Identity id.
  sub: String,
  exp: i64,
  iat: i64,
  typ: String,
}

/// Signs and verifies HS256 access tokens, and sets the refresh-token lifetime.
#[derive(Clone)]
pub struct JwtCredentials {
  encoding:    EncodingKey,
  decoding:    DecodingKey,
  access_ttl:  Duration,
  refresh_ttl: Duration,
}

impl JwtCredentials {
  pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
      access_ttl,
      refresh_ttl,
    }
  }

  pub fn access_ttl(&self) -> Duration { self.access_ttl }

  /// When a refresh token issued at `now` stops being usable.
  pub fn refresh_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    now + self.refresh_ttl
  }

  /// Sign an access token for `identity_id`.
  pub fn issue(&self, identity_id: i64, now: DateTime<Utc>) -> Result<String> {
    let claims = Claims {
      sub: identity_id.to_string(),
      exp: (now + self.access_ttl).timestamp(),
      iat: now.timestamp(),
      typ: ACCESS.to_owned(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
      .map_err(|e| Error::Storage(Box::new(e)))
  }
}

impl CredentialVerifier for JwtCredentials {
  fn verify(&self, token: &str) -> Result<i64> {
    let data = decode::<Claims>(
      token,
      &self.decoding,
      &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
      tracing::debug!(error = %e, "rejected access token");
      Error::AuthenticationFailed
    })?;
    if data.claims.typ != ACCESS {
      return Err(Error::AuthenticationFailed);
    }
    data
      .claims
      .sub
      .parse()
      .map_err(|_| Error::AuthenticationFailed)
  }
}

// ─── Refresh tokens ──────────────────────────────────────────────────────────

/// A fresh opaque refresh token and the digest that is stored for it.
pub fn new_refresh_token() -> (String, String) {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  let token = hex::encode(bytes);
  let digest = digest_token(&token);
  (token, digest)
}

/// SHA-256 of a refresh token, hex-encoded.
pub fn digest_token(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// The credential of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

/// The authenticated, active caller. Rejects with 401 otherwise.
pub struct CurrentActor(pub Actor);

impl<S: Store> FromRequestParts<AppState<S>> for CurrentActor {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> std::result::Result<Self, Self::Rejection> {
    let actor = load_actor(
      state.store.as_ref(),
      state.tokens.as_ref(),
      bearer_token(&parts.headers),
    )
    .await?;
    Ok(Self(actor))
  }
}
