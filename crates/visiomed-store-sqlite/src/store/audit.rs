//! [`AuditStore`]: the append-only `audit_records` journal.

use uuid::Uuid;
use visiomed_core::{
  Error as CoreError, Result as CoreResult,
  audit::{AuditRecord, NewAuditRecord},
  store::{AuditFilter, AuditStore, Page},
};

use super::{SqliteStore, now, page_bounds};
use crate::{
  Error,
  encode::{AUDIT_COLUMNS, RawAuditRecord, encode_uuid},
  error::db,
};

impl AuditStore for SqliteStore {
  async fn append_audit(&self, input: NewAuditRecord) -> CoreResult<AuditRecord> {
    let public_id = encode_uuid(Uuid::new_v4());
    let action: &'static str = input.action.into();
    let changes = input
      .changes
      .as_ref()
      .map(serde_json::to_string)
      .transpose()
      .map_err(Error::from)?;
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_records (
             public_id, actor_id, client_address, action,
             resource_type, resource_id, changes, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            public_id,
            input.actor_id,
            input.client_address,
            action,
            input.resource_type,
            input.resource_id,
            changes,
            at,
          ],
        )?;
        let raw = conn.query_row(
          &format!("SELECT {AUDIT_COLUMNS} FROM audit_records WHERE id = ?1"),
          rusqlite::params![conn.last_insert_rowid()],
          RawAuditRecord::from_row,
        )?;
        Ok(raw)
      })
      .await
      .map_err(db)?;

    Ok(raw.into_record()?)
  }

  async fn list_audit(
    &self,
    filter: AuditFilter,
    page: Page,
  ) -> CoreResult<Vec<AuditRecord>> {
    let action: Option<&'static str> = filter.action.map(Into::into);
    let (limit, offset) = page_bounds(page);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AUDIT_COLUMNS} FROM audit_records
           WHERE (?1 IS NULL OR actor_id      = ?1)
             AND (?2 IS NULL OR action        = ?2)
             AND (?3 IS NULL OR resource_type = ?3)
             AND (?4 IS NULL OR resource_id   = ?4)
           ORDER BY id DESC
           LIMIT ?5 OFFSET ?6"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              filter.actor_id,
              action,
              filter.resource_type,
              filter.resource_id,
              limit,
              offset,
            ],
            RawAuditRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db)?;

    raws
      .into_iter()
      .map(|raw| raw.into_record().map_err(CoreError::from))
      .collect()
  }
}
