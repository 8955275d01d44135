//! Billing records: medical acts performed on patients.
//!
//! The amount of a record is a snapshot taken when the record is created,
//! either resolved from the tariff in force on the act date or entered
//! explicitly. Later tariff changes never touch it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  identity::IdentityKind,
  patch::nullable,
  store::{IdentityStore, PricingStore, ReferenceStore},
  tariff::{TariffKey, TariffResolver},
};

/// Payment state of a billing record.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
  #[default]
  Unpaid,
  Paid,
  Free,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRecord {
  pub id:                 i64,
  pub public_id:          Uuid,
  pub patient_surname:    String,
  pub patient_given_name: String,
  /// Coverage reference number (purchase order / coverage voucher).
  pub coverage_reference: Option<String>,
  pub act_date:           NaiveDate,
  /// Billing code of the act, e.g. `K20`.
  pub billing_code:       Option<String>,
  pub observations:       Option<String>,
  /// Amount frozen at creation.
  pub amount:             Decimal,
  pub status:             PaymentStatus,
  pub act_type_id:        i64,
  pub coverage_type_id:   i64,
  pub doctor_id:          i64,
  /// The identity that entered the record, if it still exists.
  pub created_by:         Option<i64>,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
}

// ─── Creation ────────────────────────────────────────────────────────────────

/// Unpriced creation request, as received from a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingDraft {
  pub patient_surname:    String,
  pub patient_given_name: String,
  pub coverage_reference: Option<String>,
  /// Defaults to the current day.
  pub act_date:           Option<NaiveDate>,
  pub billing_code:       Option<String>,
  pub observations:       Option<String>,
  /// Manual override; when absent the tariff in force is used.
  pub amount:             Option<Decimal>,
  #[serde(default)]
  pub status:             PaymentStatus,
  pub act_type_id:        i64,
  pub coverage_type_id:   i64,
  pub doctor_id:          i64,
}

/// A priced record ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewBillingRecord {
  pub patient_surname:    String,
  pub patient_given_name: String,
  pub coverage_reference: Option<String>,
  pub act_date:           NaiveDate,
  pub billing_code:       Option<String>,
  pub observations:       Option<String>,
  pub amount:             Decimal,
  pub status:             PaymentStatus,
  pub act_type_id:        i64,
  pub coverage_type_id:   i64,
  pub doctor_id:          i64,
  pub created_by:         Option<i64>,
}

impl BillingDraft {
  /// Check the references and take the amount snapshot.
  ///
  /// The act type's service plus the coverage type and act date select the
  /// tariff. Without an explicit amount, a missing tariff is a
  /// [`Error::BusinessRuleViolation`].
  pub async fn price<S>(
    self,
    store: &S,
    created_by: Option<i64>,
    today: NaiveDate,
  ) -> Result<NewBillingRecord>
  where
    S: ReferenceStore + PricingStore + IdentityStore,
  {
    let patient_surname = check_patient("patient_surname", &self.patient_surname)?;
    let patient_given_name =
      check_patient("patient_given_name", &self.patient_given_name)?;
    let act_date = self.act_date.unwrap_or(today);

    let act_type = store
      .get_act_type(self.act_type_id)
      .await?
      .ok_or_else(|| Error::not_found("act type", self.act_type_id))?;
    if !act_type.active {
      return Err(Error::BusinessRuleViolation(format!(
        "act type {} is inactive",
        act_type.code
      )));
    }

    let coverage = store
      .get_coverage_type(self.coverage_type_id)
      .await?
      .ok_or_else(|| Error::not_found("coverage type", self.coverage_type_id))?;
    if !coverage.active {
      return Err(Error::BusinessRuleViolation(format!(
        "coverage type {} is inactive",
        coverage.code
      )));
    }

    ensure_doctor(store, self.doctor_id).await?;

    let amount = match self.amount {
      Some(amount) => check_amount(amount)?,
      None => {
        let key = TariffKey {
          service_id:       act_type.service_id,
          act_type_id:      act_type.id,
          coverage_type_id: coverage.id,
        };
        match TariffResolver::new(store).resolve(key, act_date).await {
          Ok(tariff) => tariff.amount,
          Err(Error::TariffNotFound { .. }) => {
            return Err(Error::BusinessRuleViolation(format!(
              "no tariff in force for act type {} and coverage type {} on \
               {act_date}, and no explicit amount was given",
              act_type.code, coverage.code
            )));
          }
          Err(e) => return Err(e),
        }
      }
    };

    Ok(NewBillingRecord {
      patient_surname,
      patient_given_name,
      coverage_reference: self.coverage_reference.and_then(non_blank),
      act_date,
      billing_code: self.billing_code.and_then(non_blank),
      observations: self.observations.and_then(non_blank),
      amount,
      status: self.status,
      act_type_id: act_type.id,
      coverage_type_id: coverage.id,
      doctor_id: self.doctor_id,
      created_by,
    })
  }
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// Field-level partial update, as received from a caller.
///
/// Changing the act type, coverage type or date does not re-price the record;
/// only an explicit `amount` changes the snapshot.
///
/// `coverage_reference`, `billing_code` and `observations` are cleared by an
/// explicit `null` (or a blank string) and left alone when absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingPatch {
  pub patient_surname:    Option<String>,
  pub patient_given_name: Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub coverage_reference: Option<Option<String>>,
  pub act_date:           Option<NaiveDate>,
  #[serde(default, deserialize_with = "nullable")]
  pub billing_code:       Option<Option<String>>,
  #[serde(default, deserialize_with = "nullable")]
  pub observations:       Option<Option<String>>,
  pub amount:             Option<Decimal>,
  pub status:             Option<PaymentStatus>,
  pub act_type_id:        Option<i64>,
  pub coverage_type_id:   Option<i64>,
  pub doctor_id:          Option<i64>,
}

/// A validated [`BillingPatch`].
///
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct BillingChanges {
  pub patient_surname:    Option<String>,
  pub patient_given_name: Option<String>,
  pub coverage_reference: Option<Option<String>>,
  pub act_date:           Option<NaiveDate>,
  pub billing_code:       Option<Option<String>>,
  pub observations:       Option<Option<String>>,
  pub amount:             Option<Decimal>,
  pub status:             Option<PaymentStatus>,
  pub act_type_id:        Option<i64>,
  pub coverage_type_id:   Option<i64>,
  pub doctor_id:          Option<i64>,
}

impl BillingPatch {
  pub async fn validate<S>(self, store: &S) -> Result<BillingChanges>
  where
    S: ReferenceStore + IdentityStore,
  {
    if let Some(id) = self.act_type_id
      && store.get_act_type(id).await?.is_none()
    {
      return Err(Error::not_found("act type", id));
    }
    if let Some(id) = self.coverage_type_id
      && store.get_coverage_type(id).await?.is_none()
    {
      return Err(Error::not_found("coverage type", id));
    }
    if let Some(id) = self.doctor_id {
      ensure_doctor(store, id).await?;
    }

    Ok(BillingChanges {
      patient_surname: self
        .patient_surname
        .as_deref()
        .map(|v| check_patient("patient_surname", v))
        .transpose()?,
      patient_given_name: self
        .patient_given_name
        .as_deref()
        .map(|v| check_patient("patient_given_name", v))
        .transpose()?,
      coverage_reference: self.coverage_reference.map(optional_text),
      act_date: self.act_date,
      billing_code: self.billing_code.map(optional_text),
      observations: self.observations.map(optional_text),
      amount: self.amount.map(check_amount).transpose()?,
      status: self.status,
      act_type_id: self.act_type_id,
      coverage_type_id: self.coverage_type_id,
      doctor_id: self.doctor_id,
    })
  }
}

// ─── Checks ──────────────────────────────────────────────────────────────────

async fn ensure_doctor<S: IdentityStore>(store: &S, id: i64) -> Result<()> {
  let identity = store
    .get_identity(id)
    .await?
    .ok_or_else(|| Error::not_found("doctor", id))?;
  if identity.kind() != IdentityKind::Doctor {
    return Err(Error::BusinessRuleViolation(format!(
      "identity {id} is a {}, not a doctor",
      identity.kind()
    )));
  }
  Ok(())
}

fn check_patient(field: &str, raw: &str) -> Result<String> {
  let name = raw.trim();
  if name.is_empty() || name.chars().count() > 100 {
    return Err(Error::invalid(format!("{field} must be 1 to 100 characters")));
  }
  Ok(name.to_owned())
}

fn check_amount(amount: Decimal) -> Result<Decimal> {
  if amount.is_sign_negative() {
    return Err(Error::invalid("amount cannot be negative"));
  }
  Ok(amount.round_dp(2))
}

fn non_blank(value: String) -> Option<String> {
  let trimmed = value.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn optional_text(value: Option<String>) -> Option<String> { value.and_then(non_blank) }
