//! Store traits and the query types they accept.
//!
//! The traits are implemented by storage backends (e.g.
//! `visiomed-store-sqlite`). Higher layers depend on these abstractions only.
//! Every method is one unit of work against the backing store; multi-row
//! writes (an identity and its roles, a role and its permissions) are atomic.
//!
//! All methods return `Send` futures so the traits can be used from a
//! multi-threaded runtime (tokio with `axum`).

use std::{collections::BTreeSet, future::Future};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  Result,
  audit::{AuditAction, AuditRecord, NewAuditRecord},
  billing::{BillingChanges, BillingRecord, NewBillingRecord, PaymentStatus},
  identity::{Credentials, Identity, IdentityChanges, IdentityKind, NewIdentity},
  reference::{
    ActType, CoverageType, NewActType, NewReference, ReferencePatch, Service,
  },
  report::{BillingLine, Period},
  role::{NewPermission, NewRole, Permission, PermissionPatch, Role, RolePatch},
  tariff::{NewTariff, Tariff, TariffFilter, TariffKey, TariffPatch},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Offset pagination, `?skip=0&limit=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Page {
  pub skip:  u32,
  pub limit: u32,
}

impl Page {
  pub const MAX_LIMIT: u32 = 500;

  /// The effective limit, capped at [`Page::MAX_LIMIT`].
  pub fn limit(&self) -> u32 { self.limit.min(Self::MAX_LIMIT) }
}

impl Default for Page {
  fn default() -> Self { Self { skip: 0, limit: 100 } }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityFilter {
  pub kind:   Option<IdentityKind>,
  pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingFilter {
  /// Case-insensitive substring of the patient's surname or given name.
  pub patient:   Option<String>,
  pub doctor_id: Option<i64>,
  pub status:    Option<PaymentStatus>,
  pub from:      Option<NaiveDate>,
  pub to:        Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
  pub actor_id:      Option<i64>,
  pub action:        Option<AuditAction>,
  pub resource_type: Option<String>,
  pub resource_id:   Option<String>,
}

/// A stored refresh-token session. The token itself is never stored, only its
/// digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  pub id:          i64,
  pub token_hash:  String,
  pub identity_id: i64,
  pub expires_at:  DateTime<Utc>,
  pub revoked_at:  Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
  pub token_hash:  String,
  pub identity_id: i64,
  pub expires_at:  DateTime<Utc>,
}

// ─── Identities, roles, permissions ──────────────────────────────────────────

pub trait IdentityStore: Send + Sync {
  /// Insert an identity with its kind-specific row and role links.
  ///
  /// Fails with `AlreadyExists` on a duplicate email, username or doctor
  /// registration number and with `NotFound` on an unknown role id.
  fn insert_identity(
    &self,
    input: NewIdentity,
  ) -> impl Future<Output = Result<Identity>> + Send + '_;

  /// Polymorphic fetch: the caller need not know the kind.
  fn get_identity(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Identity>>> + Send + '_;

  fn get_identity_by_public_id(
    &self,
    public_id: Uuid,
  ) -> impl Future<Output = Result<Option<Identity>>> + Send + '_;

  /// Look an identity up by email or, failing that, by username.
  fn find_credentials(
    &self,
    login: String,
  ) -> impl Future<Output = Result<Option<Credentials>>> + Send + '_;

  fn list_identities(
    &self,
    filter: IdentityFilter,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Identity>>> + Send + '_;

  fn count_identities(&self) -> impl Future<Output = Result<u64>> + Send + '_;

  /// Apply a partial update. The kind column is never written.
  fn update_identity(
    &self,
    id: i64,
    changes: IdentityChanges,
  ) -> impl Future<Output = Result<Identity>> + Send + '_;

  /// Remove an identity and return it as it was.
  fn delete_identity(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Identity>> + Send + '_;

  fn roles_of(
    &self,
    identity_id: i64,
  ) -> impl Future<Output = Result<Vec<Role>>> + Send + '_;

  /// Union of the permission labels of every role attached to the identity.
  fn permissions_of(
    &self,
    identity_id: i64,
  ) -> impl Future<Output = Result<BTreeSet<String>>> + Send + '_;
}

pub trait RoleStore: Send + Sync {
  fn insert_role(
    &self,
    input: NewRole,
  ) -> impl Future<Output = Result<Role>> + Send + '_;

  fn get_role(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Role>>> + Send + '_;

  fn list_roles(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Role>>> + Send + '_;

  fn update_role(
    &self,
    id: i64,
    patch: RolePatch,
  ) -> impl Future<Output = Result<Role>> + Send + '_;

  /// Remove a role. Links to identities and permissions go with it.
  fn delete_role(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Role>> + Send + '_;

  fn insert_permission(
    &self,
    input: NewPermission,
  ) -> impl Future<Output = Result<Permission>> + Send + '_;

  fn get_permission(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Permission>>> + Send + '_;

  fn list_permissions(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Permission>>> + Send + '_;

  fn update_permission(
    &self,
    id: i64,
    patch: PermissionPatch,
  ) -> impl Future<Output = Result<Permission>> + Send + '_;

  fn delete_permission(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Permission>> + Send + '_;
}

// ─── Reference data ──────────────────────────────────────────────────────────

pub trait ReferenceStore: Send + Sync {
  fn insert_service(
    &self,
    input: NewReference,
  ) -> impl Future<Output = Result<Service>> + Send + '_;

  fn get_service(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Service>>> + Send + '_;

  fn list_services(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Service>>> + Send + '_;

  fn update_service(
    &self,
    id: i64,
    patch: ReferencePatch,
  ) -> impl Future<Output = Result<Service>> + Send + '_;

  fn delete_service(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Service>> + Send + '_;

  fn insert_act_type(
    &self,
    input: NewActType,
  ) -> impl Future<Output = Result<ActType>> + Send + '_;

  fn get_act_type(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<ActType>>> + Send + '_;

  fn list_act_types(
    &self,
    service_id: Option<i64>,
    page: Page,
  ) -> impl Future<Output = Result<Vec<ActType>>> + Send + '_;

  fn update_act_type(
    &self,
    id: i64,
    patch: ReferencePatch,
  ) -> impl Future<Output = Result<ActType>> + Send + '_;

  fn delete_act_type(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<ActType>> + Send + '_;

  fn insert_coverage_type(
    &self,
    input: NewReference,
  ) -> impl Future<Output = Result<CoverageType>> + Send + '_;

  fn get_coverage_type(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<CoverageType>>> + Send + '_;

  fn list_coverage_types(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<CoverageType>>> + Send + '_;

  fn update_coverage_type(
    &self,
    id: i64,
    patch: ReferencePatch,
  ) -> impl Future<Output = Result<CoverageType>> + Send + '_;

  fn delete_coverage_type(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<CoverageType>> + Send + '_;
}

// ─── Pricing ─────────────────────────────────────────────────────────────────

/// Durable, versioned tariff records.
pub trait PricingStore: Send + Sync {
  /// Fails with `AlreadyExists` when the triple already has a tariff starting
  /// on the same `date_begin`.
  fn insert_tariff(
    &self,
    input: NewTariff,
  ) -> impl Future<Output = Result<Tariff>> + Send + '_;

  fn get_tariff(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Tariff>>> + Send + '_;

  fn list_tariffs(
    &self,
    filter: TariffFilter,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Tariff>>> + Send + '_;

  fn update_tariff(
    &self,
    id: i64,
    patch: TariffPatch,
  ) -> impl Future<Output = Result<Tariff>> + Send + '_;

  fn delete_tariff(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Tariff>> + Send + '_;

  /// The tariff for `key` in force on `date`: `date_begin <= date` and
  /// `date_end` unset or `>= date`. Among overlapping candidates the latest
  /// `date_begin` wins.
  fn active_tariff(
    &self,
    key: TariffKey,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<Tariff>>> + Send + '_;
}

// ─── Billing ─────────────────────────────────────────────────────────────────

pub trait BillingStore: Send + Sync {
  fn insert_billing_record(
    &self,
    input: NewBillingRecord,
  ) -> impl Future<Output = Result<BillingRecord>> + Send + '_;

  fn get_billing_record(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<BillingRecord>>> + Send + '_;

  fn list_billing_records(
    &self,
    filter: BillingFilter,
    page: Page,
  ) -> impl Future<Output = Result<Vec<BillingRecord>>> + Send + '_;

  fn update_billing_record(
    &self,
    id: i64,
    changes: BillingChanges,
  ) -> impl Future<Output = Result<BillingRecord>> + Send + '_;

  fn delete_billing_record(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<BillingRecord>> + Send + '_;

  /// Every billing record whose act date falls in `period` (inclusive),
  /// joined with the labels reports need, ascending by act date then id.
  fn billing_lines(
    &self,
    period: Period,
  ) -> impl Future<Output = Result<Vec<BillingLine>>> + Send + '_;
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// Append-only audit journal: records are inserted and read, never changed.
pub trait AuditStore: Send + Sync {
  fn append_audit(
    &self,
    input: NewAuditRecord,
  ) -> impl Future<Output = Result<AuditRecord>> + Send + '_;

  /// Newest first.
  fn list_audit(
    &self,
    filter: AuditFilter,
    page: Page,
  ) -> impl Future<Output = Result<Vec<AuditRecord>>> + Send + '_;
}

// ─── Sessions ────────────────────────────────────────────────────────────────

pub trait SessionStore: Send + Sync {
  fn insert_session(
    &self,
    input: NewSession,
  ) -> impl Future<Output = Result<Session>> + Send + '_;

  /// Consume an unrevoked, unexpired session: it is revoked and returned.
  /// Returns `None` when no usable session matches.
  fn take_session(
    &self,
    token_hash: String,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Session>>> + Send + '_;

  /// Revoke every open session of an identity; returns how many were closed.
  fn revoke_sessions(
    &self,
    identity_id: i64,
  ) -> impl Future<Output = Result<u64>> + Send + '_;
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// Everything the HTTP layer needs from one backend.
pub trait Store:
  IdentityStore
  + RoleStore
  + ReferenceStore
  + PricingStore
  + BillingStore
  + AuditStore
  + SessionStore
  + Clone
  + 'static
{
}

impl<T> Store for T where
  T: IdentityStore
    + RoleStore
    + ReferenceStore
    + PricingStore
    + BillingStore
    + AuditStore
    + SessionStore
    + Clone
    + 'static
{
}
