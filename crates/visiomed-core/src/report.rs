//! Financial reporting over billing records.
//!
//! Pure read-side aggregation: the store supplies the flat
//! [`BillingLine`]s of a period and [`summarize`] rolls them up.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, billing::PaymentStatus, store::BillingStore};

/// An inclusive range of act dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
  pub start: NaiveDate,
  pub end:   NaiveDate,
}

impl Period {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
    if start > end {
      return Err(Error::invalid(format!(
        "start_date {start} is after end_date {end}"
      )));
    }
    Ok(Self { start, end })
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start <= date && date <= self.end
  }
}

/// One billing record joined with the labels reports print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingLine {
  pub record_id:     i64,
  pub public_id:     Uuid,
  pub act_date:      NaiveDate,
  /// "Surname Given name".
  pub patient:       String,
  pub service_id:    i64,
  pub service:       String,
  pub act_type_id:   i64,
  pub act_type:      String,
  pub coverage_type: String,
  pub doctor_id:     i64,
  pub doctor:        String,
  pub amount:        Decimal,
  pub status:        PaymentStatus,
}

/// Count and revenue of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
  pub label:  String,
  pub acts:   u64,
  pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialSummary {
  pub period:        Period,
  pub total_revenue: Decimal,
  pub total_acts:    u64,
  pub by_service:    Vec<Breakdown>,
  pub by_act_type:   Vec<Breakdown>,
  pub by_doctor:     Vec<Breakdown>,
}

/// Roll `lines` up by service, act type and doctor.
///
/// Lines outside `period` are ignored. Each breakdown is sorted by amount,
/// highest first; groups with equal amounts come in no particular order.
pub fn summarize(period: Period, lines: &[BillingLine]) -> FinancialSummary {
  let in_period: Vec<_> =
    lines.iter().filter(|l| period.contains(l.act_date)).collect();

  FinancialSummary {
    period,
    total_revenue: in_period.iter().map(|l| l.amount).sum(),
    total_acts: in_period.len() as u64,
    by_service: group(&in_period, |l| (l.service_id, &l.service)),
    by_act_type: group(&in_period, |l| (l.act_type_id, &l.act_type)),
    by_doctor: group(&in_period, |l| (l.doctor_id, &l.doctor)),
  }
}

/// Groups by id so two services sharing a display name stay apart.
fn group<'a>(
  lines: &[&'a BillingLine],
  key: impl Fn(&'a BillingLine) -> (i64, &'a String),
) -> Vec<Breakdown> {
  let mut groups: HashMap<i64, Breakdown> = HashMap::new();
  for line in lines {
    let (id, label) = key(line);
    let entry = groups.entry(id).or_insert_with(|| Breakdown {
      label:  label.clone(),
      acts:   0,
      amount: Decimal::ZERO,
    });
    entry.acts += 1;
    entry.amount += line.amount;
  }
  let mut out: Vec<_> = groups.into_values().collect();
  out.sort_by(|a, b| b.amount.cmp(&a.amount));
  out
}

// ─── Flat export ─────────────────────────────────────────────────────────────

pub const EXPORT_HEADERS: [&str; 8] = [
  "Date", "Patient", "Service", "Act", "Coverage", "Doctor", "Amount", "Status",
];

/// One row per line, in the order given, matching [`EXPORT_HEADERS`].
pub fn export_rows(lines: &[BillingLine]) -> Vec<Vec<String>> {
  lines
    .iter()
    .map(|l| {
      vec![
        l.act_date.format("%Y-%m-%d").to_string(),
        l.patient.clone(),
        l.service.clone(),
        l.act_type.clone(),
        l.coverage_type.clone(),
        l.doctor.clone(),
        l.amount.round_dp(2).to_string(),
        l.status.to_string(),
      ]
    })
    .collect()
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

/// The two reporting reads: a financial summary and a flat export.
pub struct FinancialAggregator<'a, S> {
  store: &'a S,
}

impl<'a, S: BillingStore> FinancialAggregator<'a, S> {
  pub fn new(store: &'a S) -> Self { Self { store } }

  pub async fn summarize(&self, period: Period) -> Result<FinancialSummary> {
    let lines = self.store.billing_lines(period).await?;
    let summary = summarize(period, &lines);
    tracing::debug!(
      start = %period.start,
      end = %period.end,
      acts = summary.total_acts,
      revenue = %summary.total_revenue,
      "financial summary computed"
    );
    Ok(summary)
  }

  /// Billing lines of the period, ascending by act date.
  pub async fn export(&self, period: Period) -> Result<Vec<BillingLine>> {
    let mut lines = self.store.billing_lines(period).await?;
    lines.sort_by_key(|l| (l.act_date, l.record_id));
    Ok(lines)
  }
}
