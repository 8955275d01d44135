//! Authorization gate.
//!
//! Two independent layers are evaluated against an authenticated [`Actor`]:
//! the coarse kind check (is this an administrator?) and the data-driven
//! permission check (does any attached role grant `report.view`?). Endpoint
//! requirements compose both with [`Requirement::AnyOf`], so granting a role
//! widens access without code changes.
//!
//! "Who are you" and "what may you do" fail differently:
//! [`Error::AuthenticationFailed`] versus [`Error::PermissionDenied`].

use std::collections::BTreeSet;

use crate::{
  Error, Result,
  identity::{Identity, IdentityKind},
  store::IdentityStore,
};

/// Permission labels the HTTP surface checks for.
pub mod permissions {
  pub const USER_MANAGE: &str = "user.manage";
  pub const ROLE_MANAGE: &str = "role.manage";
  pub const REFERENCE_MANAGE: &str = "reference.manage";
  pub const TARIFF_MANAGE: &str = "tariff.manage";
  pub const ACT_CREATE: &str = "act.create";
  pub const ACT_UPDATE: &str = "act.update";
  pub const ACT_DELETE: &str = "act.delete";
  pub const REPORT_VIEW: &str = "report.view";
  pub const AUDIT_VIEW: &str = "audit.view";
}

// ─── Credential seam ─────────────────────────────────────────────────────────

/// Decodes an opaque bearer credential into the identity id it names.
///
/// Any failure (bad signature, expiry, wrong token type) is reported as
/// [`Error::AuthenticationFailed`].
pub trait CredentialVerifier: Send + Sync {
  fn verify(&self, token: &str) -> Result<i64>;
}

// ─── Actor ───────────────────────────────────────────────────────────────────

/// An authenticated, active identity and the permissions its roles grant.
#[derive(Debug, Clone)]
pub struct Actor {
  pub identity:    Identity,
  pub permissions: BTreeSet<String>,
}

impl Actor {
  pub fn id(&self) -> i64 { self.identity.id }

  pub fn kind(&self) -> IdentityKind { self.identity.kind() }

  pub fn has_permission(&self, label: &str) -> bool {
    self.permissions.contains(label)
  }
}

/// Verify `bearer` and load the actor it names.
pub async fn load_actor<S, V>(
  store: &S,
  verifier: &V,
  bearer: Option<&str>,
) -> Result<Actor>
where
  S: IdentityStore,
  V: CredentialVerifier + ?Sized,
{
  let token = bearer.ok_or(Error::AuthenticationFailed)?;
  let id = verifier.verify(token)?;
  let identity = store
    .get_identity(id)
    .await?
    .ok_or(Error::AuthenticationFailed)?;
  if !identity.active {
    tracing::debug!(identity_id = id, "credential names an inactive identity");
    return Err(Error::AuthenticationFailed);
  }
  let permissions = store.permissions_of(id).await?;
  Ok(Actor {
    identity,
    permissions,
  })
}

// ─── Requirements ────────────────────────────────────────────────────────────

/// A privilege a protected operation demands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
  /// The actor's kind equals this one.
  Kind(IdentityKind),
  /// Some attached role grants this label.
  Permission(&'static str),
  /// The actor is identity `id`, or else `otherwise` holds.
  SelfOr {
    id:        i64,
    otherwise: Box<Requirement>,
  },
  AnyOf(Vec<Requirement>),
}

impl Requirement {
  pub fn admin() -> Self { Self::Kind(IdentityKind::Administrator) }

  /// Administrator, or any identity whose roles grant `label`.
  pub fn admin_or(label: &'static str) -> Self {
    Self::AnyOf(vec![Self::admin(), Self::Permission(label)])
  }

  /// One of `kinds`, or any identity whose roles grant `label`.
  pub fn kinds_or(kinds: &[IdentityKind], label: &'static str) -> Self {
    let mut any: Vec<_> = kinds.iter().copied().map(Self::Kind).collect();
    any.push(Self::Permission(label));
    Self::AnyOf(any)
  }

  pub fn self_or(id: i64, otherwise: Requirement) -> Self {
    Self::SelfOr {
      id,
      otherwise: Box::new(otherwise),
    }
  }

  pub fn is_satisfied_by(&self, actor: &Actor) -> bool {
    match self {
      Self::Kind(kind) => actor.kind() == *kind,
      Self::Permission(label) => actor.has_permission(label),
      Self::SelfOr { id, otherwise } => {
        actor.id() == *id || otherwise.is_satisfied_by(actor)
      }
      Self::AnyOf(all) => all.iter().any(|r| r.is_satisfied_by(actor)),
    }
  }
}

/// Check `requirement` against `actor`.
pub fn authorize(actor: &Actor, requirement: &Requirement) -> Result<()> {
  if requirement.is_satisfied_by(actor) {
    Ok(())
  } else {
    tracing::debug!(
      actor_id = actor.id(),
      kind = %actor.kind(),
      ?requirement,
      "permission denied"
    );
    Err(Error::PermissionDenied)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::identity::KindProfile;

  fn actor(id: i64, profile: KindProfile, permissions: &[&str]) -> Actor {
    Actor {
      identity:    Identity {
        id,
        public_id: Uuid::new_v4(),
        email: format!("user{id}@clinic.test"),
        username: format!("user{id}"),
        surname: "Ndiaye".into(),
        given_name: "Moussa".into(),
        active: true,
        profile,
        created_at: Utc::now(),
        updated_at: Utc::now(),
      },
      permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
  }

  fn doctor(id: i64, permissions: &[&str]) -> Actor {
    actor(
      id,
      KindProfile::Doctor {
        registration_number: None,
        specialty:           None,
      },
      permissions,
    )
  }

  #[test]
  fn doctor_without_user_manage_cannot_manage_users() {
    let doc = doctor(5, &[permissions::ACT_CREATE]);
    let err = authorize(&doc, &Requirement::admin_or(permissions::USER_MANAGE))
      .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied));
  }

  #[test]
  fn doctor_can_read_own_profile() {
    let doc = doctor(5, &[]);
    let own = Requirement::self_or(5, Requirement::admin_or(permissions::USER_MANAGE));
    assert!(authorize(&doc, &own).is_ok());

    let other =
      Requirement::self_or(6, Requirement::admin_or(permissions::USER_MANAGE));
    assert!(authorize(&doc, &other).is_err());
  }

  #[test]
  fn a_role_widens_access_without_changing_kind() {
    let doc = doctor(5, &[permissions::USER_MANAGE]);
    assert!(
      authorize(&doc, &Requirement::admin_or(permissions::USER_MANAGE)).is_ok()
    );
    assert!(authorize(&doc, &Requirement::admin()).is_err());
  }

  #[test]
  fn administrator_passes_kind_check() {
    let admin = actor(1, KindProfile::Administrator, &[]);
    assert!(
      authorize(&admin, &Requirement::admin_or(permissions::AUDIT_VIEW)).is_ok()
    );
  }

  #[test]
  fn kinds_or_accepts_listed_kinds() {
    let req = Requirement::kinds_or(
      &[IdentityKind::Administrator, IdentityKind::Viewer],
      permissions::REPORT_VIEW,
    );
    let viewer = actor(3, KindProfile::Viewer { department_scope: None }, &[]);
    assert!(req.is_satisfied_by(&viewer));
    assert!(!req.is_satisfied_by(&doctor(4, &[])));
    assert!(req.is_satisfied_by(&doctor(4, &[permissions::REPORT_VIEW])));
  }
}
