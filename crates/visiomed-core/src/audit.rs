//! Audit trail capture.
//!
//! [`AuditInterceptor`] is the transport-independent half of the audit
//! wrapper: given the facts of an inbound request it decides whether the
//! request is auditable and who made it, and once the outcome is known it
//! produces the [`NewAuditRecord`] to persist. Per request the states are
//!
//! ```text
//! {anonymous, authenticated} x {read (skip), mutation} x {failure (skip), success (log)}
//! ```
//!
//! Attribution never gates the operation: an undecodable credential yields a
//! null actor, not a rejection.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{authz::CredentialVerifier, store::AuditStore};

/// The mutation an audit record describes.
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
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum AuditAction {
  Create,
  Update,
  Delete,
}

impl AuditAction {
  /// `POST` creates, `PUT` and `PATCH` update, `DELETE` deletes. Any other
  /// verb is not audited.
  pub fn from_method(method: &str) -> Option<Self> {
    match method.to_ascii_uppercase().as_str() {
      "POST" => Some(Self::Create),
      "PUT" | "PATCH" => Some(Self::Update),
      "DELETE" => Some(Self::Delete),
      _ => None,
    }
  }
}

/// An immutable journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
  pub id:             i64,
  pub public_id:      Uuid,
  /// `None` when the request carried no decodable credential.
  pub actor_id:       Option<i64>,
  pub client_address: Option<String>,
  pub action:         AuditAction,
  pub resource_type:  String,
  pub resource_id:    Option<String>,
  pub changes:        Option<Value>,
  pub created_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
  pub actor_id:       Option<i64>,
  pub client_address: Option<String>,
  pub action:         AuditAction,
  pub resource_type:  String,
  pub resource_id:    Option<String>,
  pub changes:        Option<Value>,
}

// ─── Resource paths ──────────────────────────────────────────────────────────

/// The resource a request path addresses: `/acts/42` is type `acts`, id `42`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
  pub resource_type: String,
  pub resource_id:   Option<String>,
}

impl ResourceRef {
  /// First path segment is the type, the second (if any) the id.
  pub fn from_path(path: &str) -> Option<Self> {
    let mut segments = path
      .split('?')
      .next()
      .unwrap_or_default()
      .split('/')
      .filter(|s| !s.is_empty());
    let resource_type = segments.next()?.to_owned();
    let resource_id = segments.next().map(str::to_owned);
    Some(Self {
      resource_type,
      resource_id,
    })
  }
}

// ─── Interceptor ─────────────────────────────────────────────────────────────

/// What the interceptor needs to know about a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestFacts<'a> {
  pub method:         &'a str,
  pub path:           &'a str,
  /// The raw bearer credential, if the request carried one.
  pub bearer:         Option<&'a str>,
  pub client_address: Option<&'a str>,
}

/// Decides which requests are audited and how they are attributed.
pub struct AuditInterceptor<V> {
  verifier:  V,
  prefix:    String,
  untracked: BTreeSet<String>,
}

impl<V: CredentialVerifier> AuditInterceptor<V> {
  /// An interceptor that tracks every resource type.
  pub fn new(verifier: V) -> Self {
    Self {
      verifier,
      prefix: String::new(),
      untracked: BTreeSet::new(),
    }
  }

  /// Strip `prefix` (e.g. `/api/v1`) before reading resource segments.
  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into().trim_end_matches('/').to_owned();
    self
  }

  /// Never audit requests to `resource_type`.
  pub fn ignoring(mut self, resource_type: impl Into<String>) -> Self {
    self.untracked.insert(resource_type.into());
    self
  }

  /// Start auditing a request. `None` means the request is skipped whatever
  /// its outcome.
  pub fn begin(&self, facts: RequestFacts<'_>) -> Option<PendingAudit> {
    let action = AuditAction::from_method(facts.method)?;
    let path = facts
      .path
      .strip_prefix(self.prefix.as_str())
      .unwrap_or(facts.path);
    let resource = ResourceRef::from_path(path)?;
    if self.untracked.contains(&resource.resource_type) {
      return None;
    }

    let actor_id = facts
      .bearer
      .and_then(|token| self.verifier.verify(token).ok());
    if actor_id.is_none() {
      tracing::debug!(
        path = facts.path,
        "mutation without a decodable credential; auditing with no actor"
      );
    }

    Some(PendingAudit {
      actor_id,
      client_address: facts.client_address.map(str::to_owned),
      action,
      resource,
      changes: None,
    })
  }
}

/// An auditable request whose outcome is not known yet.
#[derive(Debug, Clone)]
pub struct PendingAudit {
  actor_id:       Option<i64>,
  client_address: Option<String>,
  action:         AuditAction,
  resource:       ResourceRef,
  changes:        Option<Value>,
}

/// Keys never copied into a changes payload.
const REDACTED: &[&str] = &["password", "password_hash", "refresh_token"];

impl PendingAudit {
  pub fn action(&self) -> AuditAction { self.action }

  pub fn actor_id(&self) -> Option<i64> { self.actor_id }

  pub fn resource(&self) -> &ResourceRef { &self.resource }

  /// Attach the request payload as the record's changes, minus secrets.
  pub fn with_changes(mut self, body: Value) -> Self {
    let body = match body {
      Value::Object(mut map) => {
        for key in REDACTED {
          map.remove(*key);
        }
        Value::Object(map)
      }
      Value::Null => return self,
      other => other,
    };
    self.changes = Some(body);
    self
  }

  /// Settle the request. Failed outcomes leave no trail. `created_id` fills
  /// in the resource id of a creation whose path carried none.
  pub fn complete(
    self,
    success: bool,
    created_id: Option<String>,
  ) -> Option<NewAuditRecord> {
    if !success {
      return None;
    }
    let resource_id = self.resource.resource_id.or(match self.action {
      AuditAction::Create => created_id,
      _ => None,
    });
    Some(NewAuditRecord {
      actor_id: self.actor_id,
      client_address: self.client_address,
      action: self.action,
      resource_type: self.resource.resource_type,
      resource_id,
      changes: self.changes,
    })
  }
}

/// Persist `record` in its own store call. Failures are logged and swallowed:
/// audit never surfaces to the caller.
pub async fn persist<S: AuditStore>(store: &S, record: NewAuditRecord) {
  let action = record.action;
  let resource_type = record.resource_type.clone();
  match store.append_audit(record).await {
    Ok(saved) => tracing::debug!(
      audit_id = saved.id,
      %action,
      resource_type = %saved.resource_type,
      "audit record written"
    ),
    Err(e) => tracing::error!(
      %action,
      %resource_type,
      error = %e,
      "failed to write audit record"
    ),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{Error, Result};

  /// Accepts tokens of the form `id:<n>`.
  struct PrefixVerifier;

  impl CredentialVerifier for PrefixVerifier {
    fn verify(&self, token: &str) -> Result<i64> {
      token
        .strip_prefix("id:")
        .and_then(|n| n.parse().ok())
        .ok_or(Error::AuthenticationFailed)
    }
  }

  fn interceptor() -> AuditInterceptor<PrefixVerifier> {
    AuditInterceptor::new(PrefixVerifier).with_prefix("/api/v1")
  }

  fn facts<'a>(method: &'a str, path: &'a str, bearer: Option<&'a str>) -> RequestFacts<'a> {
    RequestFacts {
      method,
      path,
      bearer,
      client_address: Some("10.0.0.7"),
    }
  }

  #[test]
  fn verbs_map_to_actions() {
    assert_eq!(AuditAction::from_method("POST"), Some(AuditAction::Create));
    assert_eq!(AuditAction::from_method("put"), Some(AuditAction::Update));
    assert_eq!(AuditAction::from_method("PATCH"), Some(AuditAction::Update));
    assert_eq!(AuditAction::from_method("DELETE"), Some(AuditAction::Delete));
    assert_eq!(AuditAction::from_method("GET"), None);
    assert_eq!(AuditAction::from_method("OPTIONS"), None);
  }

  #[test]
  fn path_segments_give_type_and_id() {
    assert_eq!(
      ResourceRef::from_path("/acts/42?x=1"),
      Some(ResourceRef {
        resource_type: "acts".into(),
        resource_id:   Some("42".into()),
      })
    );
    assert_eq!(
      ResourceRef::from_path("/tariffs/"),
      Some(ResourceRef {
        resource_type: "tariffs".into(),
        resource_id:   None,
      })
    );
    assert_eq!(ResourceRef::from_path("/"), None);
  }

  #[test]
  fn reads_are_skipped() {
    assert!(interceptor().begin(facts("GET", "/api/v1/acts/1", Some("id:1"))).is_none());
  }

  #[test]
  fn ignored_resource_types_are_skipped() {
    let login = || facts("POST", "/api/v1/auth/login", None);
    assert!(interceptor().begin(login()).is_some());
    assert!(interceptor().ignoring("auth").begin(login()).is_none());
  }

  #[test]
  fn successful_update_is_logged_with_actor() {
    let pending = interceptor()
      .begin(facts("PATCH", "/api/v1/acts/9", Some("id:3")))
      .unwrap();
    assert_eq!(pending.actor_id(), Some(3));

    let record = pending.complete(true, None).unwrap();
    assert_eq!(record.action, AuditAction::Update);
    assert_eq!(record.resource_type, "acts");
    assert_eq!(record.resource_id.as_deref(), Some("9"));
    assert_eq!(record.client_address.as_deref(), Some("10.0.0.7"));
  }

  #[test]
  fn failed_mutation_leaves_no_record() {
    let pending = interceptor()
      .begin(facts("DELETE", "/api/v1/users/2", Some("id:1")))
      .unwrap();
    assert!(pending.complete(false, None).is_none());
  }

  #[test]
  fn undecodable_credential_gives_null_actor() {
    let pending = interceptor()
      .begin(facts("POST", "/api/v1/services", Some("garbage")))
      .unwrap();
    let record = pending.complete(true, Some("17".into())).unwrap();
    assert_eq!(record.actor_id, None);
    assert_eq!(record.resource_id.as_deref(), Some("17"));
  }

  #[test]
  fn created_id_does_not_override_path_id() {
    let pending = interceptor()
      .begin(facts("PUT", "/api/v1/acts/5", Some("id:1")))
      .unwrap();
    let record = pending.complete(true, Some("99".into())).unwrap();
    assert_eq!(record.resource_id.as_deref(), Some("5"));
  }

  #[test]
  fn secrets_are_stripped_from_changes() {
    let pending = interceptor()
      .begin(facts("POST", "/api/v1/users", Some("id:1")))
      .unwrap()
      .with_changes(json!({ "email": "a@b.sn", "password": "hunter2hunter2" }));
    let record = pending.complete(true, None).unwrap();
    assert_eq!(record.changes, Some(json!({ "email": "a@b.sn" })));
  }
}
