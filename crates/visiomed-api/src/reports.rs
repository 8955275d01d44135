//! Handlers for `/reports`: the financial summary and its flat export.
//!
//! Both take `?start_date=YYYY-MM-DD&end_date=YYYY-MM-DD`, inclusive, and
//! need an administrator, a viewer or `report.view`.

use axum::{
  Json,
  extract::State,
  http::{HeaderValue, header},
  response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;
use visiomed_core::{
  Error,
  authz::{Requirement, authorize, permissions},
  identity::IdentityKind,
  report::{EXPORT_HEADERS, FinancialAggregator, FinancialSummary, Period, export_rows},
  store::Store,
};

use crate::{AppState, auth::CurrentActor, error::ApiError, extract::Params};

#[derive(Debug, Deserialize)]
pub struct PeriodParams {
  pub start_date: NaiveDate,
  pub end_date:   NaiveDate,
}

fn readers() -> Requirement {
  Requirement::kinds_or(
    &[IdentityKind::Administrator, IdentityKind::Viewer],
    permissions::REPORT_VIEW,
  )
}

/// `GET /reports/financial-summary`
pub async fn financial_summary<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Params(params): Params<PeriodParams>,
) -> Result<Json<FinancialSummary>, ApiError> {
  authorize(&actor, &readers())?;
  let period = Period::new(params.start_date, params.end_date)?;
  let summary = FinancialAggregator::new(state.store.as_ref())
    .summarize(period)
    .await?;
  Ok(Json(summary))
}

/// `GET /reports/export`: the period's billing lines as a download.
pub async fn export<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Params(params): Params<PeriodParams>,
) -> Result<Response, ApiError> {
  authorize(&actor, &readers())?;
  let period = Period::new(params.start_date, params.end_date)?;
  let lines = FinancialAggregator::new(state.store.as_ref())
    .export(period)
    .await?;
  let artifact = state.exporter.export(&EXPORT_HEADERS, &export_rows(&lines))?;

  let filename = format!(
    "billing_{}_{}.{}",
    period.start.format("%Y%m%d"),
    period.end.format("%Y%m%d"),
    artifact.file_extension
  );
  let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
    .map_err(|e| Error::Storage(Box::new(e)))?;
  Ok(
    (
      [
        (header::CONTENT_TYPE, HeaderValue::from_static(artifact.content_type)),
        (header::CONTENT_DISPOSITION, disposition),
      ],
      artifact.bytes,
    )
      .into_response(),
  )
}
