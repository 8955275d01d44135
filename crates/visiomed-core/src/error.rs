//! Error taxonomy shared by every layer of the back office.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("{entity} with {field}={value} already exists")]
  AlreadyExists {
    entity: &'static str,
    field:  &'static str,
    value:  String,
  },

  /// Missing, malformed, expired or unknown credential.
  #[error("authentication failed")]
  AuthenticationFailed,

  /// A valid actor lacking the required kind, permission or ownership.
  #[error("permission denied")]
  PermissionDenied,

  #[error("business rule violated: {0}")]
  BusinessRuleViolation(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// No tariff is in force for the requested combination and date.
  #[error("no active tariff for service {service_id}, act type {act_type_id}, coverage type {coverage_type_id} on {date}")]
  TariffNotFound {
    service_id:       i64,
    act_type_id:      i64,
    coverage_type_id: i64,
    date:             chrono::NaiveDate,
  },

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::NotFound { entity, id: id.to_string() }
  }

  pub fn already_exists(
    entity: &'static str,
    field: &'static str,
    value: impl ToString,
  ) -> Self {
    Self::AlreadyExists { entity, field, value: value.to_string() }
  }

  pub fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidInput(message.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
