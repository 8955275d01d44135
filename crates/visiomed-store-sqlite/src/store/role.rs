//! [`RoleStore`] over `roles`, `permissions` and their link table.

use rusqlite::{OptionalExtension as _, Transaction};
use uuid::Uuid;
use visiomed_core::{
  Error as CoreError, Result as CoreResult,
  role::{NewPermission, NewRole, Permission, PermissionPatch, Role, RolePatch},
  store::{Page, RoleStore},
};

use super::{SqliteStore, now, page_bounds, row_exists};
use crate::{
  encode::{PERMISSION_COLUMNS, ROLE_COLUMNS, RawPermission, RawRole, encode_uuid},
  error::{CallResult, abort, conflict, db},
};

/// Fill in the permissions linked to `role`.
pub(super) fn with_permissions(
  conn: &rusqlite::Connection,
  mut role: RawRole,
) -> rusqlite::Result<RawRole> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PERMISSION_COLUMNS} FROM permissions p
     JOIN role_permissions rp ON rp.permission_id = p.id
     WHERE rp.role_id = ?1
     ORDER BY p.label"
  ))?;
  role.permissions = stmt
    .query_map(rusqlite::params![role.id], RawPermission::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(role)
}

fn select_role(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<RawRole>> {
  let role = conn
    .query_row(
      &format!("SELECT {ROLE_COLUMNS} FROM roles r WHERE r.id = ?1"),
      rusqlite::params![id],
      RawRole::from_row,
    )
    .optional()?;
  role.map(|r| with_permissions(conn, r)).transpose()
}

fn select_permission(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<Option<RawPermission>> {
  conn
    .query_row(
      &format!("SELECT {PERMISSION_COLUMNS} FROM permissions p WHERE p.id = ?1"),
      rusqlite::params![id],
      RawPermission::from_row,
    )
    .optional()
}

fn link_permissions(
  tx: &Transaction<'_>,
  role_id: i64,
  permission_ids: &[i64],
) -> CallResult<()> {
  for &permission_id in permission_ids {
    if !row_exists(tx, "permissions", permission_id)? {
      return Err(abort(CoreError::not_found("permission", permission_id)));
    }
    tx.execute(
      "INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
       VALUES (?1, ?2)",
      rusqlite::params![role_id, permission_id],
    )?;
  }
  Ok(())
}

impl RoleStore for SqliteStore {
  // ── Roles ─────────────────────────────────────────────────────────────────

  async fn insert_role(&self, input: NewRole) -> CoreResult<Role> {
    let name = input.name.clone();
    let public_id = encode_uuid(Uuid::new_v4());
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO roles (public_id, name, description, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![public_id, input.name, input.description, at],
        )?;
        let id = tx.last_insert_rowid();
        link_permissions(&tx, id, &input.permission_ids)?;
        let raw = select_role(&tx, id)?;
        tx.commit()?;
        Ok(raw)
      })
      .await
      .map_err(|e| conflict(e.into(), "role", &[("name", name.as_str())]))?;

    let raw = raw.ok_or_else(|| CoreError::not_found("role", &name))?;
    Ok(raw.into_role()?)
  }

  async fn get_role(&self, id: i64) -> CoreResult<Option<Role>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_role(conn, id)?))
      .await
      .map_err(db)?;
    Ok(raw.map(RawRole::into_role).transpose()?)
  }

  async fn list_roles(&self, page: Page) -> CoreResult<Vec<Role>> {
    let (limit, offset) = page_bounds(page);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ROLE_COLUMNS} FROM roles r ORDER BY r.name LIMIT ?1 OFFSET ?2"
        ))?;
        let roles = stmt
          .query_map(rusqlite::params![limit, offset], RawRole::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let roles = roles
          .into_iter()
          .map(|r| with_permissions(conn, r))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roles)
      })
      .await
      .map_err(db)?;
    Ok(raws.into_iter().map(RawRole::into_role).collect::<crate::Result<_>>()?)
  }

  async fn update_role(&self, id: i64, patch: RolePatch) -> CoreResult<Role> {
    let name = patch.name.clone().unwrap_or_default();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !row_exists(&tx, "roles", id)? {
          return Err(abort(CoreError::not_found("role", id)));
        }
        tx.execute(
          "UPDATE roles SET
             name        = COALESCE(?2, name),
             description = COALESCE(?3, description)
           WHERE id = ?1",
          rusqlite::params![id, patch.name, patch.description],
        )?;
        if let Some(permission_ids) = &patch.permission_ids {
          tx.execute(
            "DELETE FROM role_permissions WHERE role_id = ?1",
            rusqlite::params![id],
          )?;
          link_permissions(&tx, id, permission_ids)?;
        }
        let raw = select_role(&tx, id)?;
        tx.commit()?;
        Ok(raw)
      })
      .await
      .map_err(|e| conflict(e.into(), "role", &[("name", name.as_str())]))?;

    let raw = raw.ok_or_else(|| CoreError::not_found("role", id))?;
    Ok(raw.into_role()?)
  }

  async fn delete_role(&self, id: i64) -> CoreResult<Role> {
    let raw = self
      .conn
      .call(move |conn| {
        let Some(raw) = select_role(conn, id)? else {
          return Err(abort(CoreError::not_found("role", id)));
        };
        // Links to identities and permissions cascade.
        conn.execute("DELETE FROM roles WHERE id = ?1", rusqlite::params![id])?;
        Ok(raw)
      })
      .await
      .map_err(db)?;
    tracing::debug!(role_id = id, "role deleted");
    Ok(raw.into_role()?)
  }

  // ── Permissions ───────────────────────────────────────────────────────────

  async fn insert_permission(&self, input: NewPermission) -> CoreResult<Permission> {
    let label = input.label.clone();
    let public_id = encode_uuid(Uuid::new_v4());
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO permissions (public_id, label, description, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![public_id, input.label, input.description, at],
        )?;
        Ok(select_permission(conn, conn.last_insert_rowid())?)
      })
      .await
      .map_err(|e| conflict(e.into(), "permission", &[("label", label.as_str())]))?;

    let raw = raw.ok_or_else(|| CoreError::not_found("permission", &label))?;
    Ok(raw.into_permission()?)
  }

  async fn get_permission(&self, id: i64) -> CoreResult<Option<Permission>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_permission(conn, id)?))
      .await
      .map_err(db)?;
    Ok(raw.map(RawPermission::into_permission).transpose()?)
  }

  async fn list_permissions(&self, page: Page) -> CoreResult<Vec<Permission>> {
    let (limit, offset) = page_bounds(page);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PERMISSION_COLUMNS} FROM permissions p
           ORDER BY p.label LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit, offset], RawPermission::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db)?;
    Ok(
      raws
        .into_iter()
        .map(RawPermission::into_permission)
        .collect::<crate::Result<_>>()?,
    )
  }

  async fn update_permission(
    &self,
    id: i64,
    patch: PermissionPatch,
  ) -> CoreResult<Permission> {
    let label = patch.label.clone().unwrap_or_default();
    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE permissions SET
             label       = COALESCE(?2, label),
             description = COALESCE(?3, description)
           WHERE id = ?1",
          rusqlite::params![id, patch.label, patch.description],
        )?;
        if changed == 0 {
          return Err(abort(CoreError::not_found("permission", id)));
        }
        Ok(select_permission(conn, id)?)
      })
      .await
      .map_err(|e| conflict(e.into(), "permission", &[("label", label.as_str())]))?;

    let raw = raw.ok_or_else(|| CoreError::not_found("permission", id))?;
    Ok(raw.into_permission()?)
  }

  async fn delete_permission(&self, id: i64) -> CoreResult<Permission> {
    let raw = self
      .conn
      .call(move |conn| {
        let Some(raw) = select_permission(conn, id)? else {
          return Err(abort(CoreError::not_found("permission", id)));
        };
        conn.execute("DELETE FROM permissions WHERE id = ?1", rusqlite::params![id])?;
        Ok(raw)
      })
      .await
      .map_err(db)?;
    Ok(raw.into_permission()?)
  }
}
