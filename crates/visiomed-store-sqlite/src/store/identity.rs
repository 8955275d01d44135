//! [`IdentityStore`] over `identities` and the per-kind attribute tables.

use std::collections::BTreeSet;

use rusqlite::{OptionalExtension as _, Transaction};
use uuid::Uuid;
use visiomed_core::{
  Error as CoreError, Result as CoreResult,
  identity::{Credentials, Identity, IdentityChanges, KindProfile, NewIdentity},
  role::Role,
  store::{IdentityFilter, IdentityStore, Page},
};

use super::{SqliteStore, now, page_bounds, role::with_permissions, row_exists};
use crate::{
  encode::{IDENTITY_COLUMNS, IDENTITY_FROM, ROLE_COLUMNS, RawIdentity, RawRole, encode_uuid},
  error::{CallResult, abort, conflict, db},
};

fn select_identity(
  conn: &rusqlite::Connection,
  clause: &str,
  param: &dyn rusqlite::ToSql,
) -> rusqlite::Result<Option<RawIdentity>> {
  conn
    .query_row(
      &format!("SELECT {IDENTITY_COLUMNS} FROM {IDENTITY_FROM} WHERE {clause}"),
      &[param],
      RawIdentity::from_row,
    )
    .optional()
}

/// Upsert the kind table row for `profile`. Administrators have none.
fn write_profile(
  tx: &Transaction<'_>,
  id: i64,
  profile: &KindProfile,
) -> rusqlite::Result<()> {
  match profile {
    KindProfile::Administrator => {}
    KindProfile::Doctor {
      registration_number,
      specialty,
    } => {
      tx.execute(
        "INSERT INTO doctors (identity_id, registration_number, specialty)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (identity_id) DO UPDATE SET
           registration_number = excluded.registration_number,
           specialty           = excluded.specialty",
        rusqlite::params![id, registration_number, specialty],
      )?;
    }
    KindProfile::Clerk { desk } => {
      tx.execute(
        "INSERT INTO clerks (identity_id, desk) VALUES (?1, ?2)
         ON CONFLICT (identity_id) DO UPDATE SET desk = excluded.desk",
        rusqlite::params![id, desk],
      )?;
    }
    KindProfile::Viewer { department_scope } => {
      tx.execute(
        "INSERT INTO viewers (identity_id, department_scope) VALUES (?1, ?2)
         ON CONFLICT (identity_id) DO UPDATE SET
           department_scope = excluded.department_scope",
        rusqlite::params![id, department_scope],
      )?;
    }
  }
  Ok(())
}

fn link_roles(tx: &Transaction<'_>, id: i64, role_ids: &[i64]) -> CallResult<()> {
  for &role_id in role_ids {
    if !row_exists(tx, "roles", role_id)? {
      return Err(abort(CoreError::not_found("role", role_id)));
    }
    tx.execute(
      "INSERT OR IGNORE INTO identity_roles (identity_id, role_id) VALUES (?1, ?2)",
      rusqlite::params![id, role_id],
    )?;
  }
  Ok(())
}

impl SqliteStore {
  async fn fetch_identity(&self, id: i64) -> CoreResult<Identity> {
    self
      .get_identity(id)
      .await?
      .ok_or_else(|| CoreError::not_found("identity", id))
  }
}

impl IdentityStore for SqliteStore {
  async fn insert_identity(&self, input: NewIdentity) -> CoreResult<Identity> {
    let email = input.email.clone();
    let username = input.username.clone();
    let registration = input
      .profile
      .registration_number()
      .unwrap_or_default()
      .to_owned();
    let public_id = encode_uuid(Uuid::new_v4());
    let kind: &'static str = input.profile.kind().into();
    let at = now();

    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO identities (
             public_id, email, username, surname, given_name,
             password_hash, active, kind, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
          rusqlite::params![
            public_id,
            input.email,
            input.username,
            input.surname,
            input.given_name,
            input.password_hash,
            input.active,
            kind,
            at,
          ],
        )?;
        let id = tx.last_insert_rowid();
        write_profile(&tx, id, &input.profile)?;
        link_roles(&tx, id, &input.role_ids)?;
        tx.commit()?;
        Ok(id)
      })
      .await
      .map_err(|e| {
        conflict(e.into(), "identity", &[
          ("email", email.as_str()),
          ("username", username.as_str()),
          ("registration_number", registration.as_str()),
        ])
      })?;

    tracing::debug!(identity_id = id, kind, "identity created");
    self.fetch_identity(id).await
  }

  async fn get_identity(&self, id: i64) -> CoreResult<Option<Identity>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_identity(conn, "i.id = ?1", &id)?))
      .await
      .map_err(db)?;
    Ok(raw.map(RawIdentity::into_identity).transpose()?)
  }

  async fn get_identity_by_public_id(
    &self,
    public_id: Uuid,
  ) -> CoreResult<Option<Identity>> {
    let id_str = encode_uuid(public_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_identity(conn, "i.public_id = ?1", &id_str)?))
      .await
      .map_err(db)?;
    Ok(raw.map(RawIdentity::into_identity).transpose()?)
  }

  async fn find_credentials(&self, login: String) -> CoreResult<Option<Credentials>> {
    let login = login.trim().to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        let email = login.to_lowercase();
        let by_email = select_identity(conn, "i.email = ?1", &email)?;
        match by_email {
          Some(raw) => Ok(Some(raw)),
          None => Ok(select_identity(conn, "i.username = ?1", &login)?),
        }
      })
      .await
      .map_err(db)?;
    Ok(raw.map(RawIdentity::into_credentials).transpose()?)
  }

  async fn list_identities(
    &self,
    filter: IdentityFilter,
    page: Page,
  ) -> CoreResult<Vec<Identity>> {
    let kind: Option<&'static str> = filter.kind.map(Into::into);
    let active = filter.active;
    let (limit, offset) = page_bounds(page);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {IDENTITY_COLUMNS} FROM {IDENTITY_FROM}
           WHERE (?1 IS NULL OR i.kind = ?1)
             AND (?2 IS NULL OR i.active = ?2)
           ORDER BY i.id
           LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![kind, active, limit, offset],
            RawIdentity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db)?;

    Ok(
      raws
        .into_iter()
        .map(RawIdentity::into_identity)
        .collect::<crate::Result<_>>()?,
    )
  }

  async fn count_identities(&self) -> CoreResult<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM identities", [], |r| r.get(0))?)
      })
      .await
      .map_err(db)?;
    Ok(count.max(0) as u64)
  }

  async fn update_identity(
    &self,
    id: i64,
    changes: IdentityChanges,
  ) -> CoreResult<Identity> {
    let email = changes.email.clone().unwrap_or_default();
    let username = changes.username.clone().unwrap_or_default();
    let registration = changes
      .profile
      .as_ref()
      .and_then(KindProfile::registration_number)
      .unwrap_or_default()
      .to_owned();
    let at = now();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let stored: Option<String> = tx
          .query_row(
            "SELECT kind FROM identities WHERE id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(stored) = stored else {
          return Err(abort(CoreError::not_found("identity", id)));
        };
        if let Some(profile) = &changes.profile
          && stored != <&'static str>::from(profile.kind())
        {
          return Err(abort(CoreError::invalid(
            "the kind of an identity cannot be changed",
          )));
        }

        tx.execute(
          "UPDATE identities SET
             email         = COALESCE(?2, email),
             username      = COALESCE(?3, username),
             surname       = COALESCE(?4, surname),
             given_name    = COALESCE(?5, given_name),
             active        = COALESCE(?6, active),
             password_hash = COALESCE(?7, password_hash),
             updated_at    = ?8
           WHERE id = ?1",
          rusqlite::params![
            id,
            changes.email,
            changes.username,
            changes.surname,
            changes.given_name,
            changes.active,
            changes.password_hash,
            at,
          ],
        )?;
        if let Some(profile) = &changes.profile {
          write_profile(&tx, id, profile)?;
        }
        if let Some(role_ids) = &changes.role_ids {
          tx.execute(
            "DELETE FROM identity_roles WHERE identity_id = ?1",
            rusqlite::params![id],
          )?;
          link_roles(&tx, id, role_ids)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(|e| {
        conflict(e.into(), "identity", &[
          ("email", email.as_str()),
          ("username", username.as_str()),
          ("registration_number", registration.as_str()),
        ])
      })?;

    self.fetch_identity(id).await
  }

  async fn delete_identity(&self, id: i64) -> CoreResult<Identity> {
    let raw = self
      .conn
      .call(move |conn| {
        let Some(raw) = select_identity(conn, "i.id = ?1", &id)? else {
          return Err(abort(CoreError::not_found("identity", id)));
        };
        conn.execute("DELETE FROM identities WHERE id = ?1", rusqlite::params![id])?;
        Ok(raw)
      })
      .await
      .map_err(db)?;
    Ok(raw.into_identity()?)
  }

  async fn roles_of(&self, identity_id: i64) -> CoreResult<Vec<Role>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ROLE_COLUMNS} FROM roles r
           JOIN identity_roles ir ON ir.role_id = r.id
           WHERE ir.identity_id = ?1
           ORDER BY r.name"
        ))?;
        let roles = stmt
          .query_map(rusqlite::params![identity_id], RawRole::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let roles = roles
          .into_iter()
          .map(|r| with_permissions(conn, r))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roles)
      })
      .await
      .map_err(db)?;

    Ok(
      raws
        .into_iter()
        .map(RawRole::into_role)
        .collect::<crate::Result<_>>()?,
    )
  }

  async fn permissions_of(&self, identity_id: i64) -> CoreResult<BTreeSet<String>> {
    let labels = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT p.label FROM permissions p
           JOIN role_permissions rp ON rp.permission_id = p.id
           JOIN identity_roles   ir ON ir.role_id       = rp.role_id
           WHERE ir.identity_id = ?1",
        )?;
        let labels = stmt
          .query_map(rusqlite::params![identity_id], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(labels)
      })
      .await
      .map_err(db)?;
    Ok(labels)
  }
}
