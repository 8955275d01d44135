//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings (microseconds, `Z`), dates are
//! `YYYY-MM-DD`, amounts are decimal strings and UUIDs are hyphenated
//! lowercase strings. Enumerations are stored by their `strum` names.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;
use visiomed_core::{
  audit::{AuditAction, AuditRecord},
  billing::{BillingRecord, PaymentStatus},
  identity::{Credentials, Identity, IdentityKind, KindProfile},
  reference::{ActType, CoverageType, Service},
  report::BillingLine,
  role::{Permission, Role},
  store::Session,
  tariff::{Tariff, TariffKey},
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

pub fn encode_amount(amount: Decimal) -> String { amount.round_dp(2).to_string() }

pub fn decode_amount(s: &str) -> Result<Decimal> {
  Decimal::from_str(s).map_err(|e| Error::Decode(format!("amount {s:?}: {e}")))
}

fn decode_enum<T: FromStr>(what: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

// ─── Identities ──────────────────────────────────────────────────────────────

/// Columns of [`RawIdentity`], for `identities i` joined with the kind tables.
pub const IDENTITY_COLUMNS: &str = "
  i.id, i.public_id, i.email, i.username, i.surname, i.given_name, i.active,
  i.kind, i.password_hash, i.created_at, i.updated_at,
  d.registration_number, d.specialty, c.desk, v.department_scope";

/// `FROM` clause matching [`IDENTITY_COLUMNS`].
pub const IDENTITY_FROM: &str = "
  identities i
  LEFT JOIN doctors d ON d.identity_id = i.id
  LEFT JOIN clerks  c ON c.identity_id = i.id
  LEFT JOIN viewers v ON v.identity_id = i.id";

/// Raw values of an `identities` row joined with every kind table.
pub struct RawIdentity {
  pub id:                  i64,
  pub public_id:           String,
  pub email:               String,
  pub username:            String,
  pub surname:             String,
  pub given_name:          String,
  pub active:              bool,
  pub kind:                String,
  pub password_hash:       String,
  pub created_at:          String,
  pub updated_at:          String,
  // kind tables; at most the ones of `kind` are non-null
  pub registration_number: Option<String>,
  pub specialty:           Option<String>,
  pub desk:                Option<String>,
  pub department_scope:    Option<String>,
}

impl RawIdentity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                  row.get(0)?,
      public_id:           row.get(1)?,
      email:               row.get(2)?,
      username:            row.get(3)?,
      surname:             row.get(4)?,
      given_name:          row.get(5)?,
      active:              row.get(6)?,
      kind:                row.get(7)?,
      password_hash:       row.get(8)?,
      created_at:          row.get(9)?,
      updated_at:          row.get(10)?,
      registration_number: row.get(11)?,
      specialty:           row.get(12)?,
      desk:                row.get(13)?,
      department_scope:    row.get(14)?,
    })
  }

  /// Rebuild the profile from the stored kind; columns of other kinds are
  /// ignored.
  pub fn into_credentials(self) -> Result<Credentials> {
    let profile = match decode_enum::<IdentityKind>("identity kind", &self.kind)? {
      IdentityKind::Administrator => KindProfile::Administrator,
      IdentityKind::Doctor => KindProfile::Doctor {
        registration_number: self.registration_number,
        specialty:           self.specialty,
      },
      IdentityKind::Clerk => KindProfile::Clerk { desk: self.desk },
      IdentityKind::Viewer => KindProfile::Viewer {
        department_scope: self.department_scope,
      },
    };
    Ok(Credentials {
      identity:      Identity {
        id: self.id,
        public_id: decode_uuid(&self.public_id)?,
        email: self.email,
        username: self.username,
        surname: self.surname,
        given_name: self.given_name,
        active: self.active,
        profile,
        created_at: decode_dt(&self.created_at)?,
        updated_at: decode_dt(&self.updated_at)?,
      },
      password_hash: self.password_hash,
    })
  }

  pub fn into_identity(self) -> Result<Identity> {
    Ok(self.into_credentials()?.identity)
  }
}

// ─── Roles and permissions ───────────────────────────────────────────────────

pub const PERMISSION_COLUMNS: &str =
  "p.id, p.public_id, p.label, p.description, p.created_at";

pub struct RawPermission {
  pub id:          i64,
  pub public_id:   String,
  pub label:       String,
  pub description: Option<String>,
  pub created_at:  String,
}

impl RawPermission {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      public_id:   row.get(1)?,
      label:       row.get(2)?,
      description: row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_permission(self) -> Result<Permission> {
    Ok(Permission {
      id:          self.id,
      public_id:   decode_uuid(&self.public_id)?,
      label:       self.label,
      description: self.description,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const ROLE_COLUMNS: &str = "r.id, r.public_id, r.name, r.description, r.created_at";

/// A `roles` row plus the permission rows linked to it.
pub struct RawRole {
  pub id:          i64,
  pub public_id:   String,
  pub name:        String,
  pub description: Option<String>,
  pub created_at:  String,
  pub permissions: Vec<RawPermission>,
}

impl RawRole {
  /// Reads the role columns; `permissions` is filled in by the caller.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      public_id:   row.get(1)?,
      name:        row.get(2)?,
      description: row.get(3)?,
      created_at:  row.get(4)?,
      permissions: Vec::new(),
    })
  }

  pub fn into_role(self) -> Result<Role> {
    Ok(Role {
      id:          self.id,
      public_id:   decode_uuid(&self.public_id)?,
      name:        self.name,
      description: self.description,
      permissions: self
        .permissions
        .into_iter()
        .map(RawPermission::into_permission)
        .collect::<Result<_>>()?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

// ─── Reference data ──────────────────────────────────────────────────────────

/// Columns shared by `services` and `coverage_types`.
pub const REFERENCE_COLUMNS: &str =
  "id, public_id, code, name, description, active, created_at";

pub struct RawReference {
  pub id:          i64,
  pub public_id:   String,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub active:      bool,
  pub created_at:  String,
}

impl RawReference {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      public_id:   row.get(1)?,
      code:        row.get(2)?,
      name:        row.get(3)?,
      description: row.get(4)?,
      active:      row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  pub fn into_service(self) -> Result<Service> {
    Ok(Service {
      id:          self.id,
      public_id:   decode_uuid(&self.public_id)?,
      code:        self.code,
      name:        self.name,
      description: self.description,
      active:      self.active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }

  pub fn into_coverage_type(self) -> Result<CoverageType> {
    Ok(CoverageType {
      id:          self.id,
      public_id:   decode_uuid(&self.public_id)?,
      code:        self.code,
      name:        self.name,
      description: self.description,
      active:      self.active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const ACT_TYPE_COLUMNS: &str =
  "id, public_id, service_id, code, name, description, active, created_at";

pub struct RawActType {
  pub id:          i64,
  pub public_id:   String,
  pub service_id:  i64,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub active:      bool,
  pub created_at:  String,
}

impl RawActType {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      public_id:   row.get(1)?,
      service_id:  row.get(2)?,
      code:        row.get(3)?,
      name:        row.get(4)?,
      description: row.get(5)?,
      active:      row.get(6)?,
      created_at:  row.get(7)?,
    })
  }

  pub fn into_act_type(self) -> Result<ActType> {
    Ok(ActType {
      id:          self.id,
      public_id:   decode_uuid(&self.public_id)?,
      service_id:  self.service_id,
      code:        self.code,
      name:        self.name,
      description: self.description,
      active:      self.active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

// ─── Tariffs ─────────────────────────────────────────────────────────────────

pub const TARIFF_COLUMNS: &str = "id, public_id, service_id, act_type_id, \
                                  coverage_type_id, amount, date_begin, \
                                  date_end, created_at";

pub struct RawTariff {
  pub id:               i64,
  pub public_id:        String,
  pub service_id:       i64,
  pub act_type_id:      i64,
  pub coverage_type_id: i64,
  pub amount:           String,
  pub date_begin:       String,
  pub date_end:         Option<String>,
  pub created_at:       String,
}

impl RawTariff {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      public_id:        row.get(1)?,
      service_id:       row.get(2)?,
      act_type_id:      row.get(3)?,
      coverage_type_id: row.get(4)?,
      amount:           row.get(5)?,
      date_begin:       row.get(6)?,
      date_end:         row.get(7)?,
      created_at:       row.get(8)?,
    })
  }

  pub fn into_tariff(self) -> Result<Tariff> {
    Ok(Tariff {
      id:         self.id,
      public_id:  decode_uuid(&self.public_id)?,
      key:        TariffKey {
        service_id:       self.service_id,
        act_type_id:      self.act_type_id,
        coverage_type_id: self.coverage_type_id,
      },
      amount:     decode_amount(&self.amount)?,
      date_begin: decode_date(&self.date_begin)?,
      date_end:   self.date_end.as_deref().map(decode_date).transpose()?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Billing ─────────────────────────────────────────────────────────────────

pub const BILLING_COLUMNS: &str = "id, public_id, patient_surname, \
                                   patient_given_name, coverage_reference, \
                                   act_date, billing_code, observations, \
                                   amount, status, act_type_id, \
                                   coverage_type_id, doctor_id, created_by, \
                                   created_at, updated_at";

pub struct RawBillingRecord {
  pub id:                 i64,
  pub public_id:          String,
  pub patient_surname:    String,
  pub patient_given_name: String,
  pub coverage_reference: Option<String>,
  pub act_date:           String,
  pub billing_code:       Option<String>,
  pub observations:       Option<String>,
  pub amount:             String,
  pub status:             String,
  pub act_type_id:        i64,
  pub coverage_type_id:   i64,
  pub doctor_id:          i64,
  pub created_by:         Option<i64>,
  pub created_at:         String,
  pub updated_at:         String,
}

impl RawBillingRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      public_id:          row.get(1)?,
      patient_surname:    row.get(2)?,
      patient_given_name: row.get(3)?,
      coverage_reference: row.get(4)?,
      act_date:           row.get(5)?,
      billing_code:       row.get(6)?,
      observations:       row.get(7)?,
      amount:             row.get(8)?,
      status:             row.get(9)?,
      act_type_id:        row.get(10)?,
      coverage_type_id:   row.get(11)?,
      doctor_id:          row.get(12)?,
      created_by:         row.get(13)?,
      created_at:         row.get(14)?,
      updated_at:         row.get(15)?,
    })
  }

  pub fn into_record(self) -> Result<BillingRecord> {
    Ok(BillingRecord {
      id:                 self.id,
      public_id:          decode_uuid(&self.public_id)?,
      patient_surname:    self.patient_surname,
      patient_given_name: self.patient_given_name,
      coverage_reference: self.coverage_reference,
      act_date:           decode_date(&self.act_date)?,
      billing_code:       self.billing_code,
      observations:       self.observations,
      amount:             decode_amount(&self.amount)?,
      status:             decode_enum::<PaymentStatus>("payment status", &self.status)?,
      act_type_id:        self.act_type_id,
      coverage_type_id:   self.coverage_type_id,
      doctor_id:          self.doctor_id,
      created_by:         self.created_by,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

/// A billing record joined with its service, act type, coverage type and
/// doctor labels.
pub struct RawBillingLine {
  pub record_id:          i64,
  pub public_id:          String,
  pub act_date:           String,
  pub patient_surname:    String,
  pub patient_given_name: String,
  pub service_id:         i64,
  pub service:            String,
  pub act_type_id:        i64,
  pub act_type:           String,
  pub coverage_type:      String,
  pub doctor_id:          i64,
  pub doctor_given_name:  String,
  pub doctor_surname:     String,
  pub amount:             String,
  pub status:             String,
}

impl RawBillingLine {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:          row.get(0)?,
      public_id:          row.get(1)?,
      act_date:           row.get(2)?,
      patient_surname:    row.get(3)?,
      patient_given_name: row.get(4)?,
      service_id:         row.get(5)?,
      service:            row.get(6)?,
      act_type_id:        row.get(7)?,
      act_type:           row.get(8)?,
      coverage_type:      row.get(9)?,
      doctor_id:          row.get(10)?,
      doctor_given_name:  row.get(11)?,
      doctor_surname:     row.get(12)?,
      amount:             row.get(13)?,
      status:             row.get(14)?,
    })
  }

  pub fn into_line(self) -> Result<BillingLine> {
    Ok(BillingLine {
      record_id:     self.record_id,
      public_id:     decode_uuid(&self.public_id)?,
      act_date:      decode_date(&self.act_date)?,
      patient:       format!("{} {}", self.patient_surname, self.patient_given_name),
      service_id:    self.service_id,
      service:       self.service,
      act_type_id:   self.act_type_id,
      act_type:      self.act_type,
      coverage_type: self.coverage_type,
      doctor_id:     self.doctor_id,
      doctor:        format!("{} {}", self.doctor_given_name, self.doctor_surname),
      amount:        decode_amount(&self.amount)?,
      status:        decode_enum::<PaymentStatus>("payment status", &self.status)?,
    })
  }
}

// ─── Audit ───────────────────────────────────────────────────────────────────

pub const AUDIT_COLUMNS: &str = "id, public_id, actor_id, client_address, \
                                 action, resource_type, resource_id, changes, \
                                 created_at";

pub struct RawAuditRecord {
  pub id:             i64,
  pub public_id:      String,
  pub actor_id:       Option<i64>,
  pub client_address: Option<String>,
  pub action:         String,
  pub resource_type:  String,
  pub resource_id:    Option<String>,
  pub changes:        Option<String>,
  pub created_at:     String,
}

impl RawAuditRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      public_id:      row.get(1)?,
      actor_id:       row.get(2)?,
      client_address: row.get(3)?,
      action:         row.get(4)?,
      resource_type:  row.get(5)?,
      resource_id:    row.get(6)?,
      changes:        row.get(7)?,
      created_at:     row.get(8)?,
    })
  }

  pub fn into_record(self) -> Result<AuditRecord> {
    Ok(AuditRecord {
      id:             self.id,
      public_id:      decode_uuid(&self.public_id)?,
      actor_id:       self.actor_id,
      client_address: self.client_address,
      action:         decode_enum::<AuditAction>("audit action", &self.action)?,
      resource_type:  self.resource_type,
      resource_id:    self.resource_id,
      changes:        self
        .changes
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

pub const SESSION_COLUMNS: &str =
  "id, token_hash, identity_id, expires_at, revoked_at";

pub struct RawSession {
  pub id:          i64,
  pub token_hash:  String,
  pub identity_id: i64,
  pub expires_at:  String,
  pub revoked_at:  Option<String>,
}

impl RawSession {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      token_hash:  row.get(1)?,
      identity_id: row.get(2)?,
      expires_at:  row.get(3)?,
      revoked_at:  row.get(4)?,
    })
  }

  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      id:          self.id,
      token_hash:  self.token_hash,
      identity_id: self.identity_id,
      expires_at:  decode_dt(&self.expires_at)?,
      revoked_at:  self.revoked_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
