//! Functional roles and the permissions they bundle.
//!
//! Roles are data: administrators create them at runtime and attach them to
//! identities of any kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// An atomic capability label such as `act.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
  pub id:          i64,
  pub public_id:   Uuid,
  pub label:       String,
  pub description: Option<String>,
  pub created_at:  DateTime<Utc>,
}

/// A named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
  pub id:          i64,
  pub public_id:   Uuid,
  pub name:        String,
  pub description: Option<String>,
  pub permissions: Vec<Permission>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPermission {
  pub label:       String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionPatch {
  pub label:       Option<String>,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
  pub name:           String,
  pub description:    Option<String>,
  #[serde(default)]
  pub permission_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolePatch {
  pub name:           Option<String>,
  pub description:    Option<String>,
  /// When present, replaces the role's whole permission set.
  pub permission_ids: Option<Vec<i64>>,
}

impl NewPermission {
  pub fn validate(mut self) -> Result<Self> {
    self.label = check_label(&self.label)?;
    Ok(self)
  }
}

impl PermissionPatch {
  pub fn validate(mut self) -> Result<Self> {
    self.label = self.label.as_deref().map(check_label).transpose()?;
    Ok(self)
  }
}

impl NewRole {
  pub fn validate(mut self) -> Result<Self> {
    self.name = check_role_name(&self.name)?;
    self.permission_ids.sort_unstable();
    self.permission_ids.dedup();
    Ok(self)
  }
}

impl RolePatch {
  pub fn validate(mut self) -> Result<Self> {
    self.name = self.name.as_deref().map(check_role_name).transpose()?;
    if let Some(ids) = &mut self.permission_ids {
      ids.sort_unstable();
      ids.dedup();
    }
    Ok(self)
  }
}

/// Labels are lowercase, dot-separated words: `report.view`.
fn check_label(raw: &str) -> Result<String> {
  let label = raw.trim().to_lowercase();
  let well_formed = !label.is_empty()
    && label.len() <= 100
    && label.split('.').all(|part| {
      !part.is_empty()
        && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
  if well_formed {
    Ok(label)
  } else {
    Err(Error::invalid(format!("invalid permission label {raw:?}")))
  }
}

fn check_role_name(raw: &str) -> Result<String> {
  let name = raw.trim();
  if name.is_empty() || name.chars().count() > 50 {
    return Err(Error::invalid("role name must be 1 to 50 characters"));
  }
  Ok(name.to_owned())
}
