//! Handlers for `/tariffs` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/tariffs` | `?service_id&act_type_id&coverage_type_id&skip&limit` |
//! | `GET`    | `/tariffs/active` | `?service_id&act_type_id&coverage_type_id[&date]`; `{"tariff": null}` when none applies |
//! | `GET`    | `/tariffs/{id}` | |
//! | `POST`   | `/tariffs` | Body: [`NewTariff`] |
//! | `PATCH`  | `/tariffs/{id}` | amount and window only |
//! | `DELETE` | `/tariffs/{id}` | 204 |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use visiomed_core::{
  Error,
  authz::{Requirement, authorize, permissions},
  store::{Page, PricingStore, Store},
  tariff::{NewTariff, Tariff, TariffFilter, TariffKey, TariffPatch, TariffResolver},
};

use crate::{
  AppState,
  auth::CurrentActor,
  error::ApiError,
  extract::{Body, Params},
};

fn managers() -> Requirement { Requirement::admin_or(permissions::TARIFF_MANAGE) }

/// `GET /tariffs`
pub async fn list<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Params(filter): Params<TariffFilter>,
  Params(page): Params<Page>,
) -> Result<Json<Vec<Tariff>>, ApiError> {
  Ok(Json(state.store.list_tariffs(filter, page).await?))
}

/// `GET /tariffs/{id}`
pub async fn get_one<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Path(id): Path<i64>,
) -> Result<Json<Tariff>, ApiError> {
  let tariff = state
    .store
    .get_tariff(id)
    .await?
    .ok_or_else(|| Error::not_found("tariff", id))?;
  Ok(Json(tariff))
}

/// `POST /tariffs`
pub async fn create<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Body(input): Body<NewTariff>,
) -> Result<impl IntoResponse, ApiError> {
  authorize(&actor, &managers())?;
  let tariff = state.store.insert_tariff(input.validate()?).await?;
  Ok((StatusCode::CREATED, Json(tariff)))
}

/// `PATCH /tariffs/{id}`
pub async fn update<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Body(patch): Body<TariffPatch>,
) -> Result<Json<Tariff>, ApiError> {
  authorize(&actor, &managers())?;
  let current = state
    .store
    .get_tariff(id)
    .await?
    .ok_or_else(|| Error::not_found("tariff", id))?;
  let patch = patch.validate(&current)?;
  Ok(Json(state.store.update_tariff(id, patch).await?))
}

/// `DELETE /tariffs/{id}`
pub async fn delete_one<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  authorize(&actor, &managers())?;
  state.store.delete_tariff(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Simulation ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActiveParams {
  pub service_id:       i64,
  pub act_type_id:      i64,
  pub coverage_type_id: i64,
  /// Defaults to today.
  pub date:             Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ActiveTariff {
  pub date:   NaiveDate,
  pub tariff: Option<Tariff>,
}

/// `GET /tariffs/active`: price simulation. An absent tariff is an answer.
pub async fn active<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(_): CurrentActor,
  Params(params): Params<ActiveParams>,
) -> Result<Json<ActiveTariff>, ApiError> {
  let date = params.date.unwrap_or_else(|| Utc::now().date_naive());
  let key = TariffKey {
    service_id:       params.service_id,
    act_type_id:      params.act_type_id,
    coverage_type_id: params.coverage_type_id,
  };
  let tariff = TariffResolver::new(state.store.as_ref())
    .simulate(key, date)
    .await?;
  Ok(Json(ActiveTariff { date, tariff }))
}
