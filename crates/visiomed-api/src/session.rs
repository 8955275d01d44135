//! Handlers for `/auth` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/auth/login` | Body: `{"login":"<email or username>","password":"..."}` |
//! | `POST` | `/auth/refresh` | Body: `{"refresh_token":"..."}`; the old token is consumed |
//! | `GET`  | `/auth/me` | The caller's identity, roles and permissions |

use std::collections::BTreeSet;

use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use visiomed_core::{
  Error,
  identity::{Identity, PasswordHasher as _},
  store::{IdentityStore, NewSession, SessionStore, Store},
};

use crate::{
  AppState,
  auth::{CurrentActor, digest_token, new_refresh_token},
  error::ApiError,
  extract::Body,
};

#[derive(Debug, Serialize)]
pub struct TokenPair {
  pub access_token:  String,
  pub refresh_token: String,
  pub token_type:    &'static str,
  /// Access-token lifetime in seconds.
  pub expires_in:    i64,
}

/// Sign an access token and open a refresh session for `identity_id`.
async fn issue_pair<S: Store>(
  state: &AppState<S>,
  identity_id: i64,
) -> Result<TokenPair, ApiError> {
  let now = Utc::now();
  let access_token = state.tokens.issue(identity_id, now)?;
  let (refresh_token, token_hash) = new_refresh_token();
  state
    .store
    .insert_session(NewSession {
      token_hash,
      identity_id,
      expires_at: state.tokens.refresh_expiry(now),
    })
    .await?;
  Ok(TokenPair {
    access_token,
    refresh_token,
    token_type: "bearer",
    expires_in: state.tokens.access_ttl().num_seconds(),
  })
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  /// Email or username.
  pub login:    String,
  pub password: String,
}

/// `POST /auth/login`
pub async fn login<S: Store>(
  State(state): State<AppState<S>>,
  Body(body): Body<LoginBody>,
) -> Result<Json<TokenPair>, ApiError> {
  let login = body.login.trim().to_owned();
  let credentials = state.store.find_credentials(login.clone()).await?;

  let identity = match credentials {
    Some(c) if state.hasher.verify(&body.password, &c.password_hash) => c.identity,
    _ => {
      tracing::warn!(%login, "login refused: unknown login or wrong password");
      return Err(Error::AuthenticationFailed.into());
    }
  };
  if !identity.active {
    tracing::warn!(%login, "login refused: identity is inactive");
    return Err(Error::AuthenticationFailed.into());
  }

  tracing::info!(identity_id = identity.id, "login");
  Ok(Json(issue_pair(&state, identity.id).await?))
}

// ─── Refresh ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
  pub refresh_token: String,
}

/// `POST /auth/refresh`: rotate a refresh token into a new pair.
pub async fn refresh<S: Store>(
  State(state): State<AppState<S>>,
  Body(body): Body<RefreshBody>,
) -> Result<Json<TokenPair>, ApiError> {
  let session = state
    .store
    .take_session(digest_token(body.refresh_token.trim()), Utc::now())
    .await?
    .ok_or(Error::AuthenticationFailed)?;

  let active = state
    .store
    .get_identity(session.identity_id)
    .await?
    .is_some_and(|i| i.active);
  if !active {
    return Err(Error::AuthenticationFailed.into());
  }
  Ok(Json(issue_pair(&state, session.identity_id).await?))
}

// ─── Me ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Me {
  #[serde(flatten)]
  pub identity:    Identity,
  pub roles:       Vec<String>,
  pub permissions: BTreeSet<String>,
}

/// `GET /auth/me`
pub async fn me<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<Me>, ApiError> {
  let roles = state
    .store
    .roles_of(actor.id())
    .await?
    .into_iter()
    .map(|r| r.name)
    .collect();
  Ok(Json(Me {
    identity: actor.identity,
    roles,
    permissions: actor.permissions,
  }))
}
