//! Handlers for `/roles` and `/permissions`.
//!
//! Reads need any authenticated caller; writes need an administrator or
//! `role.manage`.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use visiomed_core::{
  Error,
  authz::{Requirement, authorize, permissions},
  role::{NewPermission, NewRole, Permission, PermissionPatch, Role, RolePatch},
  store::{Page, RoleStore, Store},
};

use crate::{
  AppState,
  auth::CurrentActor,
  error::ApiError,
  extract::{Body, Params},
};

fn managers() -> Requirement { Requirement::admin_or(permissions::ROLE_MANAGE) }

// ─── Roles ───────────────────────────────────────────────────────────────────

pub async fn list_roles<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Params(page): Params<Page>,
) -> Result<Json<Vec<Role>>, ApiError> {
  Ok(Json(state.store.list_roles(page).await?))
}

pub async fn get_role<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Path(id): Path<i64>,
) -> Result<Json<Role>, ApiError> {
  let role = state
    .store
    .get_role(id)
    .await?
    .ok_or_else(|| Error::not_found("role", id))?;
  Ok(Json(role))
}

pub async fn create_role<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Body(input): Body<NewRole>,
) -> Result<impl IntoResponse, ApiError> {
  authorize(&actor, &managers())?;
  let role = state.store.insert_role(input.validate()?).await?;
  Ok((StatusCode::CREATED, Json(role)))
}

pub async fn update_role<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Body(patch): Body<RolePatch>,
) -> Result<Json<Role>, ApiError> {
  authorize(&actor, &managers())?;
  Ok(Json(state.store.update_role(id, patch.validate()?).await?))
}

pub async fn delete_role<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  authorize(&actor, &managers())?;
  state.store.delete_role(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Permissions ─────────────────────────────────────────────────────────────

pub async fn list_permissions<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Params(page): Params<Page>,
) -> Result<Json<Vec<Permission>>, ApiError> {
  Ok(Json(state.store.list_permissions(page).await?))
}

pub async fn get_permission<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Path(id): Path<i64>,
) -> Result<Json<Permission>, ApiError> {
  let permission = state
    .store
    .get_permission(id)
    .await?
    .ok_or_else(|| Error::not_found("permission", id))?;
  Ok(Json(permission))
}

pub async fn create_permission<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Body(input): Body<NewPermission>,
) -> Result<impl IntoResponse, ApiError> {
  authorize(&actor, &managers())?;
  let permission = state.store.insert_permission(input.validate()?).await?;
  Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn update_permission<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Body(patch): Body<PermissionPatch>,
) -> Result<Json<Permission>, ApiError> {
  authorize(&actor, &managers())?;
  Ok(Json(state.store.update_permission(id, patch.validate()?).await?))
}

pub async fn delete_permission<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  authorize(&actor, &managers())?;
  state.store.delete_permission(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
