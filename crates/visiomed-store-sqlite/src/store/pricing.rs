//! [`PricingStore`] over the `tariffs` table.

use chrono::NaiveDate;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;
use visiomed_core::{
  Error as CoreError, Result as CoreResult,
  store::{Page, PricingStore},
  tariff::{NewTariff, Tariff, TariffFilter, TariffKey, TariffPatch},
};

use super::{SqliteStore, now, page_bounds, row_exists};
use crate::{
  encode::{TARIFF_COLUMNS, RawTariff, encode_amount, encode_date, encode_uuid},
  error::{abort, conflict, db},
};

fn select_tariff(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<Option<RawTariff>> {
  conn
    .query_row(
      &format!("SELECT {TARIFF_COLUMNS} FROM tariffs WHERE id = ?1"),
      rusqlite::params![id],
      RawTariff::from_row,
    )
    .optional()
}

impl PricingStore for SqliteStore {
  async fn insert_tariff(&self, input: NewTariff) -> CoreResult<Tariff> {
    let key = input.key;
    let public_id = encode_uuid(Uuid::new_v4());
    let amount = encode_amount(input.amount);
    let date_begin = encode_date(input.date_begin);
    let date_end = input.date_end.map(encode_date);
    let begin_for_conflict = date_begin.clone();
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        if !row_exists(conn, "services", key.service_id)? {
          return Err(abort(CoreError::not_found("service", key.service_id)));
        }
        if !row_exists(conn, "coverage_types", key.coverage_type_id)? {
          return Err(abort(CoreError::not_found(
            "coverage type",
            key.coverage_type_id,
          )));
        }
        let owner: Option<i64> = conn
          .query_row(
            "SELECT service_id FROM act_types WHERE id = ?1",
            rusqlite::params![key.act_type_id],
            |r| r.get(0),
          )
          .optional()?;
        match owner {
          None => {
            return Err(abort(CoreError::not_found("act type", key.act_type_id)));
          }
          Some(service_id) if service_id != key.service_id => {
            return Err(abort(CoreError::BusinessRuleViolation(format!(
              "act type {} does not belong to service {}",
              key.act_type_id, key.service_id
            ))));
          }
          Some(_) => {}
        }

        conn.execute(
          "INSERT INTO tariffs (
             public_id, service_id, act_type_id, coverage_type_id,
             amount, date_begin, date_end, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            public_id,
            key.service_id,
            key.act_type_id,
            key.coverage_type_id,
            amount,
            date_begin,
            date_end,
            at,
          ],
        )?;
        Ok(select_tariff(conn, conn.last_insert_rowid())?)
      })
      .await
      .map_err(|e| {
        conflict(e.into(), "tariff", &[("date_begin", begin_for_conflict.as_str())])
      })?;

    let raw = raw.ok_or_else(|| CoreError::not_found("tariff", "new"))?;
    let tariff = raw.into_tariff()?;
    tracing::debug!(
      tariff_id = tariff.id,
      amount = %tariff.amount,
      date_begin = %tariff.date_begin,
      "tariff created"
    );
    Ok(tariff)
  }

  async fn get_tariff(&self, id: i64) -> CoreResult<Option<Tariff>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_tariff(conn, id)?))
      .await
      .map_err(db)?;
    Ok(raw.map(RawTariff::into_tariff).transpose()?)
  }

  async fn list_tariffs(
    &self,
    filter: TariffFilter,
    page: Page,
  ) -> CoreResult<Vec<Tariff>> {
    let (limit, offset) = page_bounds(page);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TARIFF_COLUMNS} FROM tariffs
           WHERE (?1 IS NULL OR service_id       = ?1)
             AND (?2 IS NULL OR act_type_id      = ?2)
             AND (?3 IS NULL OR coverage_type_id = ?3)
           ORDER BY service_id, act_type_id, coverage_type_id, date_begin DESC
           LIMIT ?4 OFFSET ?5"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              filter.service_id,
              filter.act_type_id,
              filter.coverage_type_id,
              limit,
              offset,
            ],
            RawTariff::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db)?;
    Ok(raws.into_iter().map(RawTariff::into_tariff).collect::<crate::Result<_>>()?)
  }

  async fn update_tariff(&self, id: i64, patch: TariffPatch) -> CoreResult<Tariff> {
    let amount = patch.amount.map(encode_amount);
    let date_begin = patch.date_begin.map(encode_date);
    let end_set = patch.date_end.is_some();
    let date_end = patch.date_end.flatten().map(encode_date);
    let begin_for_conflict = date_begin.clone().unwrap_or_default();

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE tariffs SET
             amount     = COALESCE(?2, amount),
             date_begin = COALESCE(?3, date_begin),
             date_end   = CASE WHEN ?5 THEN ?4 ELSE date_end END
           WHERE id = ?1",
          rusqlite::params![id, amount, date_begin, date_end, end_set],
        )?;
        if changed == 0 {
          return Err(abort(CoreError::not_found("tariff", id)));
        }
        Ok(select_tariff(conn, id)?)
      })
      .await
      .map_err(|e| {
        conflict(e.into(), "tariff", &[("date_begin", begin_for_conflict.as_str())])
      })?;

    let raw = raw.ok_or_else(|| CoreError::not_found("tariff", id))?;
    Ok(raw.into_tariff()?)
  }

  async fn delete_tariff(&self, id: i64) -> CoreResult<Tariff> {
    let raw = self
      .conn
      .call(move |conn| {
        let Some(raw) = select_tariff(conn, id)? else {
          return Err(abort(CoreError::not_found("tariff", id)));
        };
        conn.execute("DELETE FROM tariffs WHERE id = ?1", rusqlite::params![id])?;
        Ok(raw)
      })
      .await
      .map_err(db)?;
    Ok(raw.into_tariff()?)
  }

  async fn active_tariff(
    &self,
    key: TariffKey,
    date: NaiveDate,
  ) -> CoreResult<Option<Tariff>> {
    let date = encode_date(date);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {TARIFF_COLUMNS} FROM tariffs
                 WHERE service_id       = ?1
                   AND act_type_id      = ?2
                   AND coverage_type_id = ?3
                   AND date_begin <= ?4
                   AND (date_end IS NULL OR date_end >= ?4)
                 ORDER BY date_begin DESC
                 LIMIT 1"
              ),
              rusqlite::params![
                key.service_id,
                key.act_type_id,
                key.coverage_type_id,
                date,
              ],
              RawTariff::from_row,
            )
            .optional()?,
        )
      })
      .await
      .map_err(db)?;
    Ok(raw.map(RawTariff::into_tariff).transpose()?)
  }
}
