//! [`ReferenceStore`]: services, act types and coverage types.
//!
//! `services` and `coverage_types` share one column layout and are handled by
//! the same table-generic helpers.

use rusqlite::OptionalExtension as _;
use uuid::Uuid;
use visiomed_core::{
  Error as CoreError, Result as CoreResult,
  reference::{ActType, CoverageType, NewActType, NewReference, ReferencePatch, Service},
  store::{Page, ReferenceStore},
};

use super::{SqliteStore, now, page_bounds, row_exists};
use crate::{
  encode::{
    ACT_TYPE_COLUMNS, REFERENCE_COLUMNS, RawActType, RawReference, encode_uuid,
  },
  error::{abort, conflict, db},
};

fn select_reference(
  conn: &rusqlite::Connection,
  table: &str,
  id: i64,
) -> rusqlite::Result<Option<RawReference>> {
  conn
    .query_row(
      &format!("SELECT {REFERENCE_COLUMNS} FROM {table} WHERE id = ?1"),
      rusqlite::params![id],
      RawReference::from_row,
    )
    .optional()
}

fn select_act_type(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<Option<RawActType>> {
  conn
    .query_row(
      &format!("SELECT {ACT_TYPE_COLUMNS} FROM act_types WHERE id = ?1"),
      rusqlite::params![id],
      RawActType::from_row,
    )
    .optional()
}

// ─── Table-generic helpers ───────────────────────────────────────────────────

impl SqliteStore {
  async fn insert_reference(
    &self,
    table: &'static str,
    entity: &'static str,
    input: NewReference,
  ) -> CoreResult<RawReference> {
    let code = input.code.clone();
    let public_id = encode_uuid(Uuid::new_v4());
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO {table} (public_id, code, name, description, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
          ),
          rusqlite::params![
            public_id,
            input.code,
            input.name,
            input.description,
            input.active,
            at,
          ],
        )?;
        Ok(select_reference(conn, table, conn.last_insert_rowid())?)
      })
      .await
      .map_err(|e| conflict(e.into(), entity, &[("code", code.as_str())]))?;

    raw.ok_or_else(|| CoreError::not_found(entity, &code))
  }

  async fn get_reference(
    &self,
    table: &'static str,
    id: i64,
  ) -> CoreResult<Option<RawReference>> {
    self
      .conn
      .call(move |conn| Ok(select_reference(conn, table, id)?))
      .await
      .map_err(db)
  }

  async fn list_references(
    &self,
    table: &'static str,
    page: Page,
  ) -> CoreResult<Vec<RawReference>> {
    let (limit, offset) = page_bounds(page);
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REFERENCE_COLUMNS} FROM {table} ORDER BY code LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit, offset], RawReference::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db)
  }

  async fn update_reference(
    &self,
    table: &'static str,
    entity: &'static str,
    id: i64,
    patch: ReferencePatch,
  ) -> CoreResult<RawReference> {
    let code = patch.code.clone().unwrap_or_default();
    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          &format!(
            "UPDATE {table} SET
               code        = COALESCE(?2, code),
               name        = COALESCE(?3, name),
               description = COALESCE(?4, description),
               active      = COALESCE(?5, active)
             WHERE id = ?1"
          ),
          rusqlite::params![id, patch.code, patch.name, patch.description, patch.active],
        )?;
        if changed == 0 {
          return Err(abort(CoreError::not_found(entity, id)));
        }
        Ok(select_reference(conn, table, id)?)
      })
      .await
      .map_err(|e| conflict(e.into(), entity, &[("code", code.as_str())]))?;

    raw.ok_or_else(|| CoreError::not_found(entity, id))
  }

  async fn delete_reference(
    &self,
    table: &'static str,
    entity: &'static str,
    id: i64,
  ) -> CoreResult<RawReference> {
    self
      .conn
      .call(move |conn| {
        let Some(raw) = select_reference(conn, table, id)? else {
          return Err(abort(CoreError::not_found(entity, id)));
        };
        conn.execute(
          &format!("DELETE FROM {table} WHERE id = ?1"),
          rusqlite::params![id],
        )?;
        Ok(raw)
      })
      .await
      .map_err(db)
  }
}

// ─── ReferenceStore impl ─────────────────────────────────────────────────────

impl ReferenceStore for SqliteStore {
  // ── Services ──────────────────────────────────────────────────────────────

  async fn insert_service(&self, input: NewReference) -> CoreResult<Service> {
    let raw = self.insert_reference("services", "service", input).await?;
    Ok(raw.into_service()?)
  }

  async fn get_service(&self, id: i64) -> CoreResult<Option<Service>> {
    let raw = self.get_reference("services", id).await?;
    Ok(raw.map(RawReference::into_service).transpose()?)
  }

  async fn list_services(&self, page: Page) -> CoreResult<Vec<Service>> {
    let raws = self.list_references("services", page).await?;
    Ok(
      raws
        .into_iter()
        .map(RawReference::into_service)
        .collect::<crate::Result<_>>()?,
    )
  }

  async fn update_service(&self, id: i64, patch: ReferencePatch) -> CoreResult<Service> {
    let raw = self.update_reference("services", "service", id, patch).await?;
    Ok(raw.into_service()?)
  }

  async fn delete_service(&self, id: i64) -> CoreResult<Service> {
    let raw = self.delete_reference("services", "service", id).await?;
    Ok(raw.into_service()?)
  }

  // ── Act types ─────────────────────────────────────────────────────────────

  async fn insert_act_type(&self, input: NewActType) -> CoreResult<ActType> {
    let code = input.code.clone();
    let public_id = encode_uuid(Uuid::new_v4());
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        if !row_exists(conn, "services", input.service_id)? {
          return Err(abort(CoreError::not_found("service", input.service_id)));
        }
        conn.execute(
          "INSERT INTO act_types (
             public_id, service_id, code, name, description, active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            public_id,
            input.service_id,
            input.code,
            input.name,
            input.description,
            input.active,
            at,
          ],
        )?;
        Ok(select_act_type(conn, conn.last_insert_rowid())?)
      })
      .await
      .map_err(|e| conflict(e.into(), "act type", &[("code", code.as_str())]))?;

    let raw = raw.ok_or_else(|| CoreError::not_found("act type", &code))?;
    Ok(raw.into_act_type()?)
  }

  async fn get_act_type(&self, id: i64) -> CoreResult<Option<ActType>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_act_type(conn, id)?))
      .await
      .map_err(db)?;
    Ok(raw.map(RawActType::into_act_type).transpose()?)
  }

  async fn list_act_types(
    &self,
    service_id: Option<i64>,
    page: Page,
  ) -> CoreResult<Vec<ActType>> {
    let (limit, offset) = page_bounds(page);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACT_TYPE_COLUMNS} FROM act_types
           WHERE (?1 IS NULL OR service_id = ?1)
           ORDER BY service_id, code
           LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![service_id, limit, offset], RawActType::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db)?;
    Ok(
      raws
        .into_iter()
        .map(RawActType::into_act_type)
        .collect::<crate::Result<_>>()?,
    )
  }

  async fn update_act_type(&self, id: i64, patch: ReferencePatch) -> CoreResult<ActType> {
    let code = patch.code.clone().unwrap_or_default();
    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE act_types SET
             code        = COALESCE(?2, code),
             name        = COALESCE(?3, name),
             description = COALESCE(?4, description),
             active      = COALESCE(?5, active)
           WHERE id = ?1",
          rusqlite::params![id, patch.code, patch.name, patch.description, patch.active],
        )?;
        if changed == 0 {
          return Err(abort(CoreError::not_found("act type", id)));
        }
        Ok(select_act_type(conn, id)?)
      })
      .await
      .map_err(|e| conflict(e.into(), "act type", &[("code", code.as_str())]))?;

    let raw = raw.ok_or_else(|| CoreError::not_found("act type", id))?;
    Ok(raw.into_act_type()?)
  }

  async fn delete_act_type(&self, id: i64) -> CoreResult<ActType> {
    let raw = self
      .conn
      .call(move |conn| {
        let Some(raw) = select_act_type(conn, id)? else {
          return Err(abort(CoreError::not_found("act type", id)));
        };
        conn.execute("DELETE FROM act_types WHERE id = ?1", rusqlite::params![id])?;
        Ok(raw)
      })
      .await
      .map_err(db)?;
    Ok(raw.into_act_type()?)
  }

  // ── Coverage types ────────────────────────────────────────────────────────

  async fn insert_coverage_type(&self, input: NewReference) -> CoreResult<CoverageType> {
    let raw = self
      .insert_reference("coverage_types", "coverage type", input)
      .await?;
    Ok(raw.into_coverage_type()?)
  }

  async fn get_coverage_type(&self, id: i64) -> CoreResult<Option<CoverageType>> {
    let raw = self.get_reference("coverage_types", id).await?;
    Ok(raw.map(RawReference::into_coverage_type).transpose()?)
  }

  async fn list_coverage_types(&self, page: Page) -> CoreResult<Vec<CoverageType>> {
    let raws = self.list_references("coverage_types", page).await?;
    Ok(
      raws
        .into_iter()
        .map(RawReference::into_coverage_type)
        .collect::<crate::Result<_>>()?,
    )
  }

  async fn update_coverage_type(
    &self,
    id: i64,
    patch: ReferencePatch,
  ) -> CoreResult<CoverageType> {
    let raw = self
      .update_reference("coverage_types", "coverage type", id, patch)
      .await?;
    Ok(raw.into_coverage_type()?)
  }

  async fn delete_coverage_type(&self, id: i64) -> CoreResult<CoverageType> {
    let raw = self
      .delete_reference("coverage_types", "coverage type", id)
      .await?;
    Ok(raw.into_coverage_type()?)
  }
}
