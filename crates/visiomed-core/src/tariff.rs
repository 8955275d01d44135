//! Tariffs and temporal tariff resolution.
//!
//! A tariff prices one (service, act type, coverage type) triple over a
//! validity window `[date_begin, date_end]`. New pricing is introduced by
//! inserting a new tariff row, never by rewriting the amount of an old one, so
//! the history of billing snapshots stays explainable.
//!
//! Windows for the same triple may overlap; nothing rejects that at write
//! time. Resolution settles it by letting the most recently introduced rule
//! (latest `date_begin`) win.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, patch::nullable, store::PricingStore};

// ─── Types ───────────────────────────────────────────────────────────────────

/// The combination a tariff prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TariffKey {
  pub service_id:       i64,
  pub act_type_id:      i64,
  pub coverage_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
  pub id:         i64,
  pub public_id:  Uuid,
  #[serde(flatten)]
  pub key:        TariffKey,
  pub amount:     Decimal,
  pub date_begin: NaiveDate,
  /// Last day the tariff applies; open-ended when absent.
  pub date_end:   Option<NaiveDate>,
  pub created_at: DateTime<Utc>,
}

impl Tariff {
  /// Whether this tariff is in force on `date`.
  pub fn covers(&self, date: NaiveDate) -> bool {
    self.date_begin <= date && self.date_end.is_none_or(|end| end >= date)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTariff {
  #[serde(flatten)]
  pub key:        TariffKey,
  pub amount:     Decimal,
  pub date_begin: NaiveDate,
  pub date_end:   Option<NaiveDate>,
}

/// Partial update. The priced triple is not patchable: pricing a different
/// combination is a new tariff.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TariffPatch {
  pub amount:     Option<Decimal>,
  pub date_begin: Option<NaiveDate>,
  /// `Some(None)` reopens the window.
  #[serde(default, deserialize_with = "nullable")]
  pub date_end:   Option<Option<NaiveDate>>,
}

/// Filters for listing tariffs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TariffFilter {
  pub service_id:       Option<i64>,
  pub act_type_id:      Option<i64>,
  pub coverage_type_id: Option<i64>,
}

impl NewTariff {
  pub fn validate(mut self) -> Result<Self> {
    self.amount = check_amount(self.amount)?;
    check_window(self.date_begin, self.date_end)?;
    Ok(self)
  }
}

impl TariffPatch {
  /// Validate against the stored tariff so the resulting window stays sane.
  pub fn validate(mut self, current: &Tariff) -> Result<Self> {
    self.amount = self.amount.map(check_amount).transpose()?;
    check_window(
      self.date_begin.unwrap_or(current.date_begin),
      self.date_end.unwrap_or(current.date_end),
    )?;
    Ok(self)
  }
}

fn check_amount(amount: Decimal) -> Result<Decimal> {
  if amount.is_sign_negative() {
    return Err(Error::invalid("amount cannot be negative"));
  }
  Ok(amount.round_dp(2))
}

fn check_window(begin: NaiveDate, end: Option<NaiveDate>) -> Result<()> {
  match end {
    Some(end) if end < begin => Err(Error::invalid(format!(
      "date_end {end} precedes date_begin {begin}"
    ))),
    _ => Ok(()),
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Selects the tariff in force for a combination on a reference date.
///
/// Read-only: resolution is a function of stored tariffs and the date, and
/// performs no writes.
pub struct TariffResolver<'a, P> {
  store: &'a P,
}

impl<'a, P: PricingStore> TariffResolver<'a, P> {
  pub fn new(store: &'a P) -> Self { Self { store } }

  /// The single tariff in force on `date`, or [`Error::TariffNotFound`].
  pub async fn resolve(&self, key: TariffKey, date: NaiveDate) -> Result<Tariff> {
    let tariff = self.store.active_tariff(key, date).await?;
    match tariff {
      Some(tariff) => {
        tracing::debug!(
          tariff_id = tariff.id,
          amount = %tariff.amount,
          %date,
          "resolved tariff"
        );
        Ok(tariff)
      }
      None => Err(Error::TariffNotFound {
        service_id: key.service_id,
        act_type_id: key.act_type_id,
        coverage_type_id: key.coverage_type_id,
        date,
      }),
    }
  }

  /// Price simulation: an absent tariff is an answer, not a failure.
  pub async fn simulate(
    &self,
    key: TariffKey,
    date: NaiveDate,
  ) -> Result<Option<Tariff>> {
    match self.resolve(key, date).await {
      Ok(tariff) => Ok(Some(tariff)),
      Err(Error::TariffNotFound { .. }) => Ok(None),
      Err(e) => Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::Page;

  /// Answers `active_tariff` from a fixed list with the same rule the SQL
  /// backend applies.
  struct FixedTariffs(Vec<Tariff>);

  impl PricingStore for FixedTariffs {
    async fn insert_tariff(&self, _: NewTariff) -> Result<Tariff> { unimplemented!() }
    async fn get_tariff(&self, _: i64) -> Result<Option<Tariff>> { unimplemented!() }
    async fn list_tariffs(&self, _: TariffFilter, _: Page) -> Result<Vec<Tariff>> { unimplemented!() }
    async fn update_tariff(&self, _: i64, _: TariffPatch) -> Result<Tariff> { unimplemented!() }
    async fn delete_tariff(&self, _: i64) -> Result<Tariff> { unimplemented!() }

    async fn active_tariff(
      &self,
      key: TariffKey,
      date: NaiveDate,
    ) -> Result<Option<Tariff>> {
      Ok(
        self
          .0
          .iter()
          .filter(|t| t.key == key && t.covers(date))
          .max_by_key(|t| t.date_begin)
          .cloned(),
      )
    }
  }

  const KEY: TariffKey = TariffKey {
    service_id:       1,
    act_type_id:      2,
    coverage_type_id: 3,
  };

  fn date(s: &str) -> NaiveDate { s.parse().unwrap() }

  fn tariff(id: i64, amount: i64, begin: &str, end: Option<&str>) -> Tariff {
    Tariff {
      id,
      public_id: Uuid::new_v4(),
      key: KEY,
      amount: Decimal::new(amount, 0),
      date_begin: date(begin),
      date_end: end.map(date),
      created_at: Utc::now(),
    }
  }

  #[tokio::test]
  async fn resolves_the_version_in_force() {
    let store = FixedTariffs(vec![
      tariff(1, 10_000, "2024-01-01", None),
      tariff(2, 12_000, "2024-06-01", None),
    ]);
    let resolver = TariffResolver::new(&store);

    let march = resolver.resolve(KEY, date("2024-03-15")).await.unwrap();
    assert_eq!(march.amount, Decimal::new(10_000, 0));

    let july = resolver.resolve(KEY, date("2024-07-01")).await.unwrap();
    assert_eq!(july.amount, Decimal::new(12_000, 0));

    let before = resolver.resolve(KEY, date("2023-12-01")).await;
    assert!(matches!(before, Err(Error::TariffNotFound { .. })));
  }

  #[tokio::test]
  async fn simulate_turns_absence_into_none() {
    let store = FixedTariffs(vec![tariff(1, 5_000, "2024-01-01", Some("2024-01-31"))]);
    let resolver = TariffResolver::new(&store);

    assert!(resolver.simulate(KEY, date("2024-01-31")).await.unwrap().is_some());
    assert!(resolver.simulate(KEY, date("2024-02-01")).await.unwrap().is_none());
  }

  #[test]
  fn end_date_is_inclusive() {
    let t = tariff(1, 1, "2024-01-01", Some("2024-01-31"));
    assert!(t.covers(date("2024-01-01")));
    assert!(t.covers(date("2024-01-31")));
    assert!(!t.covers(date("2024-02-01")));
    assert!(!t.covers(date("2023-12-31")));
  }

  #[test]
  fn inverted_window_is_rejected() {
    let new = NewTariff {
      key:        KEY,
      amount:     Decimal::new(100, 0),
      date_begin: date("2024-02-01"),
      date_end:   Some(date("2024-01-01")),
    };
    assert!(new.validate().is_err());
  }

  #[test]
  fn patch_null_end_reopens_the_window() {
    let current = tariff(1, 100, "2024-01-01", Some("2024-01-31"));

    let reopen: TariffPatch = serde_json::from_str(r#"{"date_end": null}"#).unwrap();
    assert_eq!(reopen.validate(&current).unwrap().date_end, Some(None));

    let untouched: TariffPatch = serde_json::from_str(r#"{"amount": "120"}"#).unwrap();
    assert_eq!(untouched.validate(&current).unwrap().date_end, None);

    let inverted: TariffPatch =
      serde_json::from_str(r#"{"date_end": "2023-12-01"}"#).unwrap();
    assert!(inverted.validate(&current).is_err());
  }

  #[test]
  fn negative_amount_is_rejected() {
    let new = NewTariff {
      key:        KEY,
      amount:     Decimal::new(-1, 0),
      date_begin: date("2024-02-01"),
      date_end:   None,
    };
    assert!(new.validate().is_err());
  }
}
