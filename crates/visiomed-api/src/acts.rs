//! Handlers for `/acts`: billing records.
//!
//! | Method        | Path | Requirement |
//! |---------------|------|-------------|
//! | `GET`         | `/acts` | authenticated; `?patient&doctor_id&status&from&to&skip&limit` |
//! | `GET`         | `/acts/{id}` | authenticated |
//! | `POST`        | `/acts` | administrator, doctor, clerk or `act.create` |
//! | `PUT`/`PATCH` | `/acts/{id}` | administrator, clerk or `act.update` |
//! | `DELETE`      | `/acts/{id}` | administrator or `act.delete` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use visiomed_core::{
  Error,
  authz::{Requirement, authorize, permissions},
  billing::{BillingDraft, BillingPatch, BillingRecord},
  identity::IdentityKind,
  store::{BillingFilter, BillingStore, Page, Store},
};

use crate::{
  AppState,
  auth::CurrentActor,
  error::ApiError,
  extract::{Body, Params},
};

/// `GET /acts`
pub async fn list<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Params(filter): Params<BillingFilter>,
  Params(page): Params<Page>,
) -> Result<Json<Vec<BillingRecord>>, ApiError> {
  Ok(Json(state.store.list_billing_records(filter, page).await?))
}

/// `GET /acts/{id}`
pub async fn get_one<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Path(id): Path<i64>,
) -> Result<Json<BillingRecord>, ApiError> {
  let record = state
    .store
    .get_billing_record(id)
    .await?
    .ok_or_else(|| Error::not_found("billing record", id))?;
  Ok(Json(record))
}

/// `POST /acts`: price the act and store it with its amount snapshot.
pub async fn create<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Body(draft): Body<BillingDraft>,
) -> Result<impl IntoResponse, ApiError> {
  authorize(
    &actor,
    &Requirement::kinds_or(
      &[IdentityKind::Administrator, IdentityKind::Doctor, IdentityKind::Clerk],
      permissions::ACT_CREATE,
    ),
  )?;
  let today = Utc::now().date_naive();
  let new = draft
    .price(state.store.as_ref(), Some(actor.id()), today)
    .await?;
  let record = state.store.insert_billing_record(new).await?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `PUT /acts/{id}` and `PATCH /acts/{id}`. Never re-prices.
pub async fn update<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Body(patch): Body<BillingPatch>,
) -> Result<Json<BillingRecord>, ApiError> {
  authorize(
    &actor,
    &Requirement::kinds_or(
      &[IdentityKind::Administrator, IdentityKind::Clerk],
      permissions::ACT_UPDATE,
    ),
  )?;
  let changes = patch.validate(state.store.as_ref()).await?;
  Ok(Json(state.store.update_billing_record(id, changes).await?))
}

/// `DELETE /acts/{id}`
pub async fn delete_one<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  authorize(&actor, &Requirement::admin_or(permissions::ACT_DELETE))?;
  state.store.delete_billing_record(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
