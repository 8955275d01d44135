//! Handlers for `/users` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/users` | `?kind&active&skip&limit` |
//! | `POST`   | `/users` | Body: [`IdentityDraft`]; kind attributes inline |
//! | `GET`    | `/users/{key}` | Numeric id or public id; the identity itself, or a user manager |
//! | `PATCH`  | `/users/{id}` | Body: [`IdentityPatch`]; the kind cannot change |
//! | `DELETE` | `/users/{id}` | 204 |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use visiomed_core::{
  Error,
  authz::{Requirement, authorize, permissions},
  identity::{Identity, IdentityDraft, IdentityKey, IdentityPatch},
  store::{IdentityFilter, IdentityStore, Page, SessionStore, Store},
};

use crate::{
  AppState,
  auth::CurrentActor,
  error::ApiError,
  extract::{Body, Params},
};

fn managers() -> Requirement { Requirement::admin_or(permissions::USER_MANAGE) }

/// `GET /users`
pub async fn list<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Params(filter): Params<IdentityFilter>,
  Params(page): Params<Page>,
) -> Result<Json<Vec<Identity>>, ApiError> {
  authorize(&actor, &managers())?;
  Ok(Json(state.store.list_identities(filter, page).await?))
}

/// `POST /users`
pub async fn create<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Body(draft): Body<IdentityDraft>,
) -> Result<impl IntoResponse, ApiError> {
  authorize(&actor, &managers())?;
  let new = draft.validate(state.hasher.as_ref())?;
  let identity = state.store.insert_identity(new).await?;
  tracing::info!(
    identity_id = identity.id,
    kind = %identity.kind(),
    created_by = actor.id(),
    "identity created"
  );
  Ok((StatusCode::CREATED, Json(identity)))
}

/// `GET /users/{key}`
pub async fn get_one<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(key): Path<String>,
) -> Result<Json<Identity>, ApiError> {
  let identity = match key.parse::<IdentityKey>()? {
    IdentityKey::Id(id) => {
      authorize(&actor, &Requirement::self_or(id, managers()))?;
      state.store.get_identity(id).await?
    }
    IdentityKey::PublicId(public_id) => {
      state.store.get_identity_by_public_id(public_id).await?
    }
  }
  .ok_or_else(|| Error::not_found("identity", &key))?;
  authorize(&actor, &Requirement::self_or(identity.id, managers()))?;
  Ok(Json(identity))
}

/// `PATCH /users/{id}`
///
/// Deactivating an identity or changing its password closes its refresh
/// sessions.
pub async fn update<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Body(patch): Body<IdentityPatch>,
) -> Result<Json<Identity>, ApiError> {
  authorize(&actor, &managers())?;
  let current = state
    .store
    .get_identity(id)
    .await?
    .ok_or_else(|| Error::not_found("identity", id))?;

  let changes = patch.validate(&current, state.hasher.as_ref())?;
  let closes_sessions =
    changes.active == Some(false) || changes.password_hash.is_some();
  let identity = state.store.update_identity(id, changes).await?;

  if closes_sessions {
    let closed = state.store.revoke_sessions(id).await?;
    tracing::debug!(identity_id = id, closed, "sessions revoked");
  }
  Ok(Json(identity))
}

/// `DELETE /users/{id}`
pub async fn delete_one<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  authorize(&actor, &managers())?;
  state.store.delete_identity(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
