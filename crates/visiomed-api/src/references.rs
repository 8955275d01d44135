//! Handlers for reference data: `/services`, `/act-types`, `/coverage-types`.
//!
//! Reads need any authenticated caller; writes need an administrator or
//! `reference.manage`. Deactivate rather than delete anything already billed:
//! deleting a referenced row is refused with 422.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use visiomed_core::{
  Error,
  authz::{Requirement, authorize, permissions},
  reference::{ActType, CoverageType, NewActType, NewReference, ReferencePatch, Service},
  store::{Page, ReferenceStore, Store},
};

use crate::{
  AppState,
  auth::CurrentActor,
  error::ApiError,
  extract::{Body, Params},
};

fn managers() -> Requirement {
  Requirement::admin_or(permissions::REFERENCE_MANAGE)
}

// ─── Services ────────────────────────────────────────────────────────────────

pub async fn list_services<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Params(page): Params<Page>,
) -> Result<Json<Vec<Service>>, ApiError> {
  Ok(Json(state.store.list_services(page).await?))
}

pub async fn get_service<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Path(id): Path<i64>,
) -> Result<Json<Service>, ApiError> {
  let service = state
    .store
    .get_service(id)
    .await?
    .ok_or_else(|| Error::not_found("service", id))?;
  Ok(Json(service))
}

pub async fn create_service<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Body(input): Body<NewReference>,
) -> Result<impl IntoResponse, ApiError> {
  authorize(&actor, &managers())?;
  let service = state.store.insert_service(input.validate()?).await?;
  Ok((StatusCode::CREATED, Json(service)))
}

pub async fn update_service<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Body(patch): Body<ReferencePatch>,
) -> Result<Json<Service>, ApiError> {
  authorize(&actor, &managers())?;
  Ok(Json(state.store.update_service(id, patch.validate()?).await?))
}

pub async fn delete_service<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  authorize(&actor, &managers())?;
  state.store.delete_service(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Act types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActTypeParams {
  pub service_id: Option<i64>,
}

/// `GET /act-types[?service_id]`
pub async fn list_act_types<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Params(params): Params<ActTypeParams>,
  Params(page): Params<Page>,
) -> Result<Json<Vec<ActType>>, ApiError> {
  Ok(Json(state.store.list_act_types(params.service_id, page).await?))
}

pub async fn get_act_type<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Path(id): Path<i64>,
) -> Result<Json<ActType>, ApiError> {
  let act_type = state
    .store
    .get_act_type(id)
    .await?
    .ok_or_else(|| Error::not_found("act type", id))?;
  Ok(Json(act_type))
}

pub async fn create_act_type<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Body(input): Body<NewActType>,
) -> Result<impl IntoResponse, ApiError> {
  authorize(&actor, &managers())?;
  let act_type = state.store.insert_act_type(input.validate()?).await?;
  Ok((StatusCode::CREATED, Json(act_type)))
}

pub async fn update_act_type<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Body(patch): Body<ReferencePatch>,
) -> Result<Json<ActType>, ApiError> {
  authorize(&actor, &managers())?;
  Ok(Json(state.store.update_act_type(id, patch.validate()?).await?))
}

pub async fn delete_act_type<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  authorize(&actor, &managers())?;
  state.store.delete_act_type(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Coverage types ──────────────────────────────────────────────────────────

pub async fn list_coverage_types<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Params(page): Params<Page>,
) -> Result<Json<Vec<CoverageType>>, ApiError> {
  Ok(Json(state.store.list_coverage_types(page).await?))
}

pub async fn get_coverage_type<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Path(id): Path<i64>,
) -> Result<Json<CoverageType>, ApiError> {
  let coverage = state
    .store
    .get_coverage_type(id)
    .await?
    .ok_or_else(|| Error::not_found("coverage type", id))?;
  Ok(Json(coverage))
}

pub async fn create_coverage_type<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Body(input): Body<NewReference>,
) -> Result<impl IntoResponse, ApiError> {
  authorize(&actor, &managers())?;
  let coverage = state.store.insert_coverage_type(input.validate()?).await?;
  Ok((StatusCode::CREATED, Json(coverage)))
}

pub async fn update_coverage_type<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Body(patch): Body<ReferencePatch>,
) -> Result<Json<CoverageType>, ApiError> {
  authorize(&actor, &managers())?;
  Ok(Json(state.store.update_coverage_type(id, patch.validate()?).await?))
}

pub async fn delete_coverage_type<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  authorize(&actor, &managers())?;
  state.store.delete_coverage_type(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
