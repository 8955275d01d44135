//! Reference data: services (departments), act types and coverage types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A medical department, e.g. `CARDIO` (Cardiologie).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
  pub id:          i64,
  pub public_id:   Uuid,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub active:      bool,
  pub created_at:  DateTime<Utc>,
}

/// A billable procedure offered by one service. Its code is unique within
/// that service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActType {
  pub id:          i64,
  pub public_id:   Uuid,
  pub service_id:  i64,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub active:      bool,
  pub created_at:  DateTime<Utc>,
}

/// A payer category, e.g. insurance or cash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageType {
  pub id:          i64,
  pub public_id:   Uuid,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub active:      bool,
  pub created_at:  DateTime<Utc>,
}

fn default_true() -> bool { true }

/// Creation input shared by services and coverage types.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReference {
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  #[serde(default = "default_true")]
  pub active:      bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewActType {
  pub service_id:  i64,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  #[serde(default = "default_true")]
  pub active:      bool,
}

/// Partial update shared by every kind of reference data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferencePatch {
  pub code:        Option<String>,
  pub name:        Option<String>,
  pub description: Option<String>,
  pub active:      Option<bool>,
}

impl NewReference {
  pub fn validate(mut self) -> Result<Self> {
    self.code = check_code(&self.code)?;
    self.name = check_name(&self.name)?;
    Ok(self)
  }
}

impl NewActType {
  pub fn validate(mut self) -> Result<Self> {
    self.code = check_code(&self.code)?;
    self.name = check_name(&self.name)?;
    Ok(self)
  }
}

impl ReferencePatch {
  pub fn validate(mut self) -> Result<Self> {
    self.code = self.code.as_deref().map(check_code).transpose()?;
    self.name = self.name.as_deref().map(check_name).transpose()?;
    Ok(self)
  }
}

/// Business codes are stored upper-case so lookups are case-insensitive.
fn check_code(raw: &str) -> Result<String> {
  let code = raw.trim().to_uppercase();
  if code.is_empty() || code.len() > 50 || code.contains(char::is_whitespace)
  {
    return Err(Error::invalid(format!("invalid code {raw:?}")));
  }
  Ok(code)
}

fn check_name(raw: &str) -> Result<String> {
  let name = raw.trim();
  if name.is_empty() || name.chars().count() > 200 {
    return Err(Error::invalid("name must be 1 to 200 characters"));
  }
  Ok(name.to_owned())
}
