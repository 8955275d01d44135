//! [`BillingStore`] over `billing_records`.

use rusqlite::OptionalExtension as _;
use uuid::Uuid;
use visiomed_core::{
  Error as CoreError, Result as CoreResult,
  billing::{BillingChanges, BillingRecord, NewBillingRecord},
  report::{BillingLine, Period},
  store::{BillingFilter, BillingStore, Page},
};

use super::{SqliteStore, now, page_bounds};
use crate::{
  encode::{
    BILLING_COLUMNS, RawBillingLine, RawBillingRecord, encode_amount,
    encode_date, encode_uuid,
  },
  error::{abort, db},
};

fn select_record(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<Option<RawBillingRecord>> {
  conn
    .query_row(
      &format!("SELECT {BILLING_COLUMNS} FROM billing_records WHERE id = ?1"),
      rusqlite::params![id],
      RawBillingRecord::from_row,
    )
    .optional()
}

/// Make `%`, `_` and `\` match themselves in a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  for c in raw.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

impl BillingStore for SqliteStore {
  async fn insert_billing_record(
    &self,
    input: NewBillingRecord,
  ) -> CoreResult<BillingRecord> {
    let public_id = encode_uuid(Uuid::new_v4());
    let act_date = encode_date(input.act_date);
    let amount = encode_amount(input.amount);
    let status: &'static str = input.status.into();
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO billing_records (
             public_id, patient_surname, patient_given_name, coverage_reference,
             act_date, billing_code, observations, amount, status,
             act_type_id, coverage_type_id, doctor_id, created_by,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
          rusqlite::params![
            public_id,
            input.patient_surname,
            input.patient_given_name,
            input.coverage_reference,
            act_date,
            input.billing_code,
            input.observations,
            amount,
            status,
            input.act_type_id,
            input.coverage_type_id,
            input.doctor_id,
            input.created_by,
            at,
          ],
        )?;
        Ok(select_record(conn, conn.last_insert_rowid())?)
      })
      .await
      .map_err(db)?;

    let record = raw
      .ok_or_else(|| CoreError::not_found("billing record", "new"))?
      .into_record()?;
    tracing::debug!(
      record_id = record.id,
      amount = %record.amount,
      act_date = %record.act_date,
      "billing record created"
    );
    Ok(record)
  }

  async fn get_billing_record(&self, id: i64) -> CoreResult<Option<BillingRecord>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_record(conn, id)?))
      .await
      .map_err(db)?;
    Ok(raw.map(RawBillingRecord::into_record).transpose()?)
  }

  async fn list_billing_records(
    &self,
    filter: BillingFilter,
    page: Page,
  ) -> CoreResult<Vec<BillingRecord>> {
    let patient = filter
      .patient
      .map(|p| format!("%{}%", escape_like(&p.trim().to_lowercase())));
    let status: Option<&'static str> = filter.status.map(Into::into);
    let from = filter.from.map(encode_date);
    let to = filter.to.map(encode_date);
    let doctor_id = filter.doctor_id;
    let (limit, offset) = page_bounds(page);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {BILLING_COLUMNS} FROM billing_records
           WHERE (?1 IS NULL OR lower(patient_surname) LIKE ?1 ESCAPE '\\'
                             OR lower(patient_given_name) LIKE ?1 ESCAPE '\\')
             AND (?2 IS NULL OR doctor_id = ?2)
             AND (?3 IS NULL OR status    = ?3)
             AND (?4 IS NULL OR act_date >= ?4)
             AND (?5 IS NULL OR act_date <= ?5)
           ORDER BY act_date DESC, id DESC
           LIMIT ?6 OFFSET ?7"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![patient, doctor_id, status, from, to, limit, offset],
            RawBillingRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db)?;

    Ok(
      raws
        .into_iter()
        .map(RawBillingRecord::into_record)
        .collect::<crate::Result<_>>()?,
    )
  }

  async fn update_billing_record(
    &self,
    id: i64,
    changes: BillingChanges,
  ) -> CoreResult<BillingRecord> {
    let act_date = changes.act_date.map(encode_date);
    let amount = changes.amount.map(encode_amount);
    let coverage_set = changes.coverage_reference.is_some();
    let code_set = changes.billing_code.is_some();
    let observations_set = changes.observations.is_some();
    let status: Option<&'static str> = changes.status.map(Into::into);
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE billing_records SET
             patient_surname    = COALESCE(?2, patient_surname),
             patient_given_name = COALESCE(?3, patient_given_name),
             coverage_reference = CASE WHEN ?14 THEN ?4 ELSE coverage_reference END,
             act_date           = COALESCE(?5, act_date),
             billing_code       = CASE WHEN ?15 THEN ?6 ELSE billing_code END,
             observations       = CASE WHEN ?16 THEN ?7 ELSE observations END,
             amount             = COALESCE(?8, amount),
             status             = COALESCE(?9, status),
             act_type_id        = COALESCE(?10, act_type_id),
             coverage_type_id   = COALESCE(?11, coverage_type_id),
             doctor_id          = COALESCE(?12, doctor_id),
             updated_at         = ?13
           WHERE id = ?1",
          rusqlite::params![
            id,
            changes.patient_surname,
            changes.patient_given_name,
            changes.coverage_reference.flatten(),
            act_date,
            changes.billing_code.flatten(),
            changes.observations.flatten(),
            amount,
            status,
            changes.act_type_id,
            changes.coverage_type_id,
            changes.doctor_id,
            at,
            coverage_set,
            code_set,
            observations_set,
          ],
        )?;
        if changed == 0 {
          return Err(abort(CoreError::not_found("billing record", id)));
        }
        Ok(select_record(conn, id)?)
      })
      .await
      .map_err(db)?;

    let raw = raw.ok_or_else(|| CoreError::not_found("billing record", id))?;
    Ok(raw.into_record()?)
  }

  async fn delete_billing_record(&self, id: i64) -> CoreResult<BillingRecord> {
    let raw = self
      .conn
      .call(move |conn| {
        let Some(raw) = select_record(conn, id)? else {
          return Err(abort(CoreError::not_found("billing record", id)));
        };
        conn.execute(
          "DELETE FROM billing_records WHERE id = ?1",
          rusqlite::params![id],
        )?;
        Ok(raw)
      })
      .await
      .map_err(db)?;
    Ok(raw.into_record()?)
  }

  async fn billing_lines(&self, period: Period) -> CoreResult<Vec<BillingLine>> {
    let start = encode_date(period.start);
    let end = encode_date(period.end);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             b.id, b.public_id, b.act_date, b.patient_surname, b.patient_given_name,
             s.id, s.name, a.id, a.name, c.name,
             d.id, d.given_name, d.surname,
             b.amount, b.status
           FROM billing_records b
           JOIN act_types      a ON a.id = b.act_type_id
           JOIN services       s ON s.id = a.service_id
           JOIN coverage_types c ON c.id = b.coverage_type_id
           JOIN identities     d ON d.id = b.doctor_id
           WHERE b.act_date BETWEEN ?1 AND ?2
           ORDER BY b.act_date ASC, b.id ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![start, end], RawBillingLine::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db)?;

    Ok(
      raws
        .into_iter()
        .map(RawBillingLine::into_line)
        .collect::<crate::Result<_>>()?,
    )
  }
}
