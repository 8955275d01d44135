//! Identities: the actors of the back office.
//!
//! An identity belongs to exactly one [`IdentityKind`] for its whole life. The
//! kind decides which extra attributes the identity physically carries; they
//! live in the kind-tagged [`KindProfile`], so an administrator never exposes
//! a (meaningless) registration number and a doctor never exposes a desk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The closed set of identity kinds.
#[derive(
  Debug,
  Clone,
  Copy,
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
pub enum IdentityKind {
  Administrator,
  Doctor,
  Clerk,
  Viewer,
}

impl IdentityKind {
  /// Parse a kind supplied by a caller, rejecting anything outside the set.
  pub fn parse(raw: &str) -> Result<Self> {
    raw.trim().parse().map_err(|_| {
      Error::invalid(format!(
        "unknown identity kind {raw:?}; expected administrator, doctor, \
         clerk or viewer"
      ))
    })
  }
}

// ─── Kind-specific attributes ────────────────────────────────────────────────

/// The attributes an identity carries because of its kind.
///
/// Serialised inline with the identity: `{"kind": "doctor",
/// "registration_number": ..., "specialty": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindProfile {
  Administrator,
  Doctor {
    /// Professional registration number; unique across doctors when set.
    registration_number: Option<String>,
    specialty:           Option<String>,
  },
  Clerk {
    desk: Option<String>,
  },
  Viewer {
    /// The department this viewer may read.
    department_scope: Option<String>,
  },
}

/// Every kind-specific attribute a caller may send, whatever the kind.
///
/// Which of them are acceptable depends on the kind of the identity they are
/// applied to; see [`KindProfile::from_attributes`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindAttributes {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub registration_number: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub specialty:           Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub desk:                Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub department_scope:    Option<String>,
}

impl KindAttributes {
  pub fn is_empty(&self) -> bool { self.supplied().is_empty() }

  fn supplied(&self) -> Vec<&'static str> {
    let mut names = Vec::new();
    if self.registration_number.is_some() {
      names.push("registration_number");
    }
    if self.specialty.is_some() {
      names.push("specialty");
    }
    if self.desk.is_some() {
      names.push("desk");
    }
    if self.department_scope.is_some() {
      names.push("department_scope");
    }
    names
  }

  /// Fail if any supplied attribute is not in `allowed`.
  fn ensure_only(&self, kind: IdentityKind, allowed: &[&str]) -> Result<()> {
    let foreign: Vec<_> = self
      .supplied()
      .into_iter()
      .filter(|name| !allowed.contains(name))
      .collect();
    if foreign.is_empty() {
      Ok(())
    } else {
      Err(Error::invalid(format!(
        "attribute(s) {} not valid for kind {kind}",
        foreign.join(", ")
      )))
    }
  }
}

impl KindProfile {
  pub fn kind(&self) -> IdentityKind {
    match self {
      Self::Administrator => IdentityKind::Administrator,
      Self::Doctor { .. } => IdentityKind::Doctor,
      Self::Clerk { .. } => IdentityKind::Clerk,
      Self::Viewer { .. } => IdentityKind::Viewer,
    }
  }

  /// Build the profile for `kind`. Attributes that do not belong to the kind
  /// are rejected rather than silently dropped.
  pub fn from_attributes(
    kind: IdentityKind,
    attributes: KindAttributes,
  ) -> Result<Self> {
    let empty = match kind {
      IdentityKind::Administrator => Self::Administrator,
      IdentityKind::Doctor => Self::Doctor {
        registration_number: None,
        specialty:           None,
      },
      IdentityKind::Clerk => Self::Clerk { desk: None },
      IdentityKind::Viewer => Self::Viewer {
        department_scope: None,
      },
    };
    empty.patched(attributes)
  }

  /// Return a copy with `attributes` applied on top. The kind never changes.
  pub fn patched(&self, attributes: KindAttributes) -> Result<Self> {
    let kind = self.kind();
    let mut next = self.clone();
    match &mut next {
      Self::Administrator => attributes.ensure_only(kind, &[])?,
      Self::Doctor {
        registration_number,
        specialty,
      } => {
        attributes.ensure_only(kind, &["registration_number", "specialty"])?;
        if let Some(v) = attributes.registration_number {
          *registration_number = non_blank(v);
        }
        if let Some(v) = attributes.specialty {
          *specialty = non_blank(v);
        }
      }
      Self::Clerk { desk } => {
        attributes.ensure_only(kind, &["desk"])?;
        if let Some(v) = attributes.desk {
          *desk = non_blank(v);
        }
      }
      Self::Viewer { department_scope } => {
        attributes.ensure_only(kind, &["department_scope"])?;
        if let Some(v) = attributes.department_scope {
          *department_scope = non_blank(v);
        }
      }
    }
    Ok(next)
  }

  pub fn registration_number(&self) -> Option<&str> {
    match self {
      Self::Doctor {
        registration_number,
        ..
      } => registration_number.as_deref(),
      _ => None,
    }
  }
}

fn non_blank(value: String) -> Option<String> {
  let trimmed = value.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// An actor of the system, reconstructed with whichever profile its kind
/// carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub id:         i64,
  /// Opaque, unguessable identifier used in external-facing data.
  pub public_id:  Uuid,
  pub email:      String,
  pub username:   String,
  pub surname:    String,
  pub given_name: String,
  pub active:     bool,
  #[serde(flatten)]
  pub profile:    KindProfile,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Identity {
  pub fn kind(&self) -> IdentityKind { self.profile.kind() }

  /// "Given Surname", as printed on reports.
  pub fn display_name(&self) -> String {
    format!("{} {}", self.given_name, self.surname)
  }
}

/// How a caller names an identity in a path: the numeric id, or the public id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKey {
  Id(i64),
  PublicId(Uuid),
}

impl std::str::FromStr for IdentityKey {
  type Err = Error;

  fn from_str(raw: &str) -> Result<Self> {
    if let Ok(id) = raw.parse() {
      return Ok(Self::Id(id));
    }
    Uuid::parse_str(raw)
      .map(Self::PublicId)
      .map_err(|_| Error::invalid(format!("invalid identity key {raw:?}")))
  }
}

/// An identity together with its stored password hash. Only the login path
/// ever reads this.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub identity:      Identity,
  pub password_hash: String,
}

// ─── Password hashing seam ───────────────────────────────────────────────────

/// One-way credential hashing. The algorithm is chosen by the implementor.
pub trait PasswordHasher: Send + Sync {
  fn hash(&self, password: &str) -> Result<String>;

  /// `false` for a wrong password and for an unparseable stored hash alike.
  fn verify(&self, password: &str, hash: &str) -> bool;

  /// Whether `hash` is in a format [`verify`](Self::verify) can check.
  fn recognizes(&self, hash: &str) -> bool;
}

// ─── Creation ────────────────────────────────────────────────────────────────

fn default_true() -> bool { true }

/// Unvalidated identity creation request, as received from a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityDraft {
  pub email:      String,
  pub username:   String,
  pub surname:    String,
  pub given_name: String,
  #[serde(default = "default_true")]
  pub active:     bool,
  /// Raw kind; validated against [`IdentityKind`].
  pub kind:       String,
  pub password:   String,
  #[serde(flatten)]
  pub attributes: KindAttributes,
  #[serde(default)]
  pub role_ids:   Vec<i64>,
}

/// A validated identity ready to be inserted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewIdentity {
  pub email:         String,
  pub username:      String,
  pub surname:       String,
  pub given_name:    String,
  pub active:        bool,
  pub profile:       KindProfile,
  pub password_hash: String,
  pub role_ids:      Vec<i64>,
}

impl IdentityDraft {
  /// The single creation path: validate the kind and its attributes, check
  /// base fields, and replace the cleartext password with its hash.
  pub fn validate(self, hasher: &dyn PasswordHasher) -> Result<NewIdentity> {
    self.build(|password| {
      check_password(password)?;
      hasher.hash(password)
    })
  }

  /// [`validate`](Self::validate) for a credential hashed ahead of time, such
  /// as the configured bootstrap administrator. `password` is ignored; the
  /// hash must be one `hasher` can later verify.
  pub fn validate_hashed(
    self,
    password_hash: String,
    hasher: &dyn PasswordHasher,
  ) -> Result<NewIdentity> {
    self.build(|_| {
      if hasher.recognizes(&password_hash) {
        Ok(password_hash)
      } else {
        Err(Error::invalid("password_hash is not a recognised password hash"))
      }
    })
  }

  fn build(
    self,
    credential: impl FnOnce(&str) -> Result<String>,
  ) -> Result<NewIdentity> {
    let kind = IdentityKind::parse(&self.kind)?;
    let profile = KindProfile::from_attributes(kind, self.attributes)?;
    let email = check_email(&self.email)?;
    let username = check_username(&self.username)?;
    let surname = check_name("surname", &self.surname)?;
    let given_name = check_name("given_name", &self.given_name)?;
    let password_hash = credential(&self.password)?;

    Ok(NewIdentity {
      email,
      username,
      surname,
      given_name,
      active: self.active,
      profile,
      password_hash,
      role_ids: dedup(self.role_ids),
    })
  }
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// Field-level partial update as received from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityPatch {
  pub email:      Option<String>,
  pub username:   Option<String>,
  pub surname:    Option<String>,
  pub given_name: Option<String>,
  pub active:     Option<bool>,
  pub password:   Option<String>,
  /// Accepted only so that an attempted kind change can be refused loudly.
  pub kind:       Option<String>,
  #[serde(flatten)]
  pub attributes: KindAttributes,
  /// When present, replaces the identity's whole role set.
  pub role_ids:   Option<Vec<i64>>,
}

/// A validated partial update. Has no kind field: the kind is not updatable.
#[derive(Debug, Clone, Default)]
pub struct IdentityChanges {
  pub email:         Option<String>,
  pub username:      Option<String>,
  pub surname:       Option<String>,
  pub given_name:    Option<String>,
  pub active:        Option<bool>,
  pub password_hash: Option<String>,
  pub profile:       Option<KindProfile>,
  pub role_ids:      Option<Vec<i64>>,
}

impl IdentityPatch {
  /// Validate the patch against the identity it will be applied to.
  pub fn validate(
    self,
    current: &Identity,
    hasher: &dyn PasswordHasher,
  ) -> Result<IdentityChanges> {
    if let Some(raw) = &self.kind
      && IdentityKind::parse(raw)? != current.kind()
    {
      return Err(Error::invalid("the kind of an identity cannot be changed"));
    }

    let profile = if self.attributes.is_empty() {
      None
    } else {
      Some(current.profile.patched(self.attributes)?)
    };

    let password_hash = match self.password {
      Some(password) => {
        check_password(&password)?;
        Some(hasher.hash(&password)?)
      }
      None => None,
    };

    Ok(IdentityChanges {
      email: self.email.as_deref().map(check_email).transpose()?,
      username: self.username.as_deref().map(check_username).transpose()?,
      surname: self
        .surname
        .as_deref()
        .map(|v| check_name("surname", v))
        .transpose()?,
      given_name: self
        .given_name
        .as_deref()
        .map(|v| check_name("given_name", v))
        .transpose()?,
      active: self.active,
      password_hash,
      profile,
      role_ids: self.role_ids.map(dedup),
    })
  }
}

// ─── Field checks ────────────────────────────────────────────────────────────

fn check_email(raw: &str) -> Result<String> {
  let email = raw.trim().to_lowercase();
  match email.split_once('@') {
    Some((local, domain))
      if !local.is_empty() && domain.contains('.') && email.len() <= 255 =>
    {
      Ok(email)
    }
    _ => Err(Error::invalid(format!("invalid email address {raw:?}"))),
  }
}

fn check_username(raw: &str) -> Result<String> {
  let username = raw.trim();
  let len = username.chars().count();
  if !(3..=50).contains(&len) || username.contains(char::is_whitespace) {
    return Err(Error::invalid(
      "username must be 3 to 50 characters without spaces",
    ));
  }
  Ok(username.to_owned())
}

fn check_name(field: &str, raw: &str) -> Result<String> {
  let name = raw.trim();
  if name.is_empty() || name.chars().count() > 100 {
    return Err(Error::invalid(format!(
      "{field} must be 1 to 100 characters"
    )));
  }
  Ok(name.to_owned())
}

fn check_password(password: &str) -> Result<()> {
  if password.chars().count() < 8 {
    return Err(Error::invalid("password must be at least 8 characters"));
  }
  Ok(())
}

fn dedup(mut ids: Vec<i64>) -> Vec<i64> {
  ids.sort_unstable();
  ids.dedup();
  ids
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Reversing;

  impl PasswordHasher for Reversing {
    fn hash(&self, password: &str) -> Result<String> {
      Ok(password.chars().rev().collect())
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
      password.chars().rev().collect::<String>() == hash
    }

    fn recognizes(&self, hash: &str) -> bool { !hash.is_empty() }
  }

  fn draft(kind: &str) -> IdentityDraft {
    IdentityDraft {
      email:      "Awa.Diop@Example.org".into(),
      username:   "adiop".into(),
      surname:    "Diop".into(),
      given_name: "Awa".into(),
      active:     true,
      kind:       kind.into(),
      password:   "correct horse".into(),
      attributes: KindAttributes::default(),
      role_ids:   vec![3, 1, 3],
    }
  }

  fn identity(profile: KindProfile) -> Identity {
    Identity {
      id: 7,
      public_id: Uuid::new_v4(),
      email: "awa.diop@example.org".into(),
      username: "adiop".into(),
      surname: "Diop".into(),
      given_name: "Awa".into(),
      active: true,
      profile,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn doctor_draft_keeps_doctor_attributes() {
    let mut d = draft("doctor");
    d.attributes.registration_number = Some("SN-0042".into());
    d.attributes.specialty = Some("Cardiologie".into());

    let new = d.validate(&Reversing).unwrap();
    assert_eq!(new.profile, KindProfile::Doctor {
      registration_number: Some("SN-0042".into()),
      specialty:           Some("Cardiologie".into()),
    });
    assert_eq!(new.email, "awa.diop@example.org");
    assert_eq!(new.role_ids, vec![1, 3]);
  }

  #[test]
  fn password_is_never_kept_in_cleartext() {
    let new = draft("clerk").validate(&Reversing).unwrap();
    assert_ne!(new.password_hash, "correct horse");
    assert!(Reversing.verify("correct horse", &new.password_hash));
  }

  #[test]
  fn prehashed_draft_runs_the_same_checks() {
    let mut d = draft("administrator");
    d.password = String::new();
    let new = d.clone().validate_hashed("esroh tcerroc".into(), &Reversing).unwrap();
    assert_eq!(new.profile, KindProfile::Administrator);
    assert_eq!(new.email, "awa.diop@example.org");
    assert!(Reversing.verify("correct horse", &new.password_hash));

    let err = d.clone().validate_hashed(String::new(), &Reversing).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(m) if m.contains("password_hash")));

    d.username = "has spaces".into();
    let err = d.validate_hashed("esroh tcerroc".into(), &Reversing).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn identity_key_reads_ids_and_public_ids() {
    assert_eq!("42".parse::<IdentityKey>().unwrap(), IdentityKey::Id(42));
    let public_id = Uuid::new_v4();
    assert_eq!(
      public_id.to_string().parse::<IdentityKey>().unwrap(),
      IdentityKey::PublicId(public_id)
    );
    let err = "clerk.a".parse::<IdentityKey>().unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn unknown_kind_is_rejected() {
    let err = draft("nurse").validate(&Reversing).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn attributes_of_another_kind_are_rejected() {
    let mut d = draft("clerk");
    d.attributes.specialty = Some("Radiologie".into());
    let err = d.validate(&Reversing).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(m) if m.contains("specialty")));
  }

  #[test]
  fn short_password_is_rejected() {
    let mut d = draft("viewer");
    d.password = "short".into();
    assert!(d.validate(&Reversing).is_err());
  }

  #[test]
  fn serialised_profile_omits_other_kinds_fields() {
    let admin = identity(KindProfile::Administrator);
    let json = serde_json::to_value(&admin).unwrap();
    assert_eq!(json["kind"], "administrator");
    assert!(json.get("registration_number").is_none());
    assert!(json.get("desk").is_none());

    let doctor = identity(KindProfile::Doctor {
      registration_number: None,
      specialty:           Some("Pédiatrie".into()),
    });
    let json = serde_json::to_value(&doctor).unwrap();
    assert_eq!(json["kind"], "doctor");
    assert!(json["registration_number"].is_null());
    assert_eq!(json["specialty"], "Pédiatrie");
    assert!(json.get("department_scope").is_none());
  }

  #[test]
  fn patch_cannot_change_kind() {
    let current = identity(KindProfile::Clerk { desk: None });
    let patch = IdentityPatch {
      kind: Some("administrator".into()),
      ..Default::default()
    };
    let err = patch.validate(&current, &Reversing).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn patch_restating_the_same_kind_is_accepted() {
    let current = identity(KindProfile::Clerk { desk: None });
    let patch = IdentityPatch {
      kind: Some("clerk".into()),
      attributes: KindAttributes {
        desk: Some("Guichet 2".into()),
        ..Default::default()
      },
      ..Default::default()
    };
    let changes = patch.validate(&current, &Reversing).unwrap();
    assert_eq!(
      changes.profile,
      Some(KindProfile::Clerk {
        desk: Some("Guichet 2".into()),
      })
    );
  }

  #[test]
  fn patch_rejects_attributes_foreign_to_the_stored_kind() {
    let current = identity(KindProfile::Viewer {
      department_scope: Some("Cardiologie".into()),
    });
    let patch = IdentityPatch {
      attributes: KindAttributes {
        desk: Some("3".into()),
        ..Default::default()
      },
      ..Default::default()
    };
    assert!(patch.validate(&current, &Reversing).is_err());
  }

  #[test]
  fn patch_hashes_a_new_password() {
    let current = identity(KindProfile::Administrator);
    let patch = IdentityPatch {
      password: Some("another secret".into()),
      ..Default::default()
    };
    let changes = patch.validate(&current, &Reversing).unwrap();
    let hash = changes.password_hash.unwrap();
    assert!(Reversing.verify("another secret", &hash));
  }
}
