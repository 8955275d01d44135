//! [`SqliteStore`], the SQLite implementation of the `visiomed-core` store
//! traits. One submodule per trait.

use std::path::Path;

use chrono::Utc;
use visiomed_core::store::Page;

use crate::{encode::encode_dt, schema::SCHEMA, Result};

mod audit;
mod billing;
mod identity;
mod pricing;
mod reference;
mod role;
mod session;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A VisioMed store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("sqlite schema ready");
    Ok(())
  }
}

fn now() -> String { encode_dt(Utc::now()) }

/// `(limit, offset)` bind values for a page.
fn page_bounds(page: Page) -> (i64, i64) {
  (i64::from(page.limit()), i64::from(page.skip))
}

/// Whether `table` has a row with primary key `id`.
fn row_exists(
  conn: &rusqlite::Connection,
  table: &str,
  id: i64,
) -> rusqlite::Result<bool> {
  use rusqlite::OptionalExtension as _;
  Ok(
    conn
      .query_row(
        &format!("SELECT 1 FROM {table} WHERE id = ?1"),
        rusqlite::params![id],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}
