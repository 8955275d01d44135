//! [`SessionStore`]: hashed refresh-token sessions.

use chrono::{DateTime, Utc};
use visiomed_core::{
  Result as CoreResult,
  store::{NewSession, Session, SessionStore},
};

use super::{SqliteStore, now};
use crate::{
  encode::{RawSession, SESSION_COLUMNS, encode_dt},
  error::{conflict, db},
};

impl SessionStore for SqliteStore {
  async fn insert_session(&self, input: NewSession) -> CoreResult<Session> {
    let expires_at = encode_dt(input.expires_at);
    let at = now();

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_hash, identity_id, expires_at, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![input.token_hash, input.identity_id, expires_at, at],
        )?;
        let raw = conn.query_row(
          &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
          rusqlite::params![conn.last_insert_rowid()],
          RawSession::from_row,
        )?;
        Ok(raw)
      })
      .await
      .map_err(|e| conflict(e.into(), "session", &[("token_hash", "<redacted>")]))?;

    Ok(raw.into_session()?)
  }

  async fn take_session(
    &self,
    token_hash: String,
    at: DateTime<Utc>,
  ) -> CoreResult<Option<Session>> {
    use rusqlite::OptionalExtension as _;

    let at = encode_dt(at);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "UPDATE sessions SET revoked_at = ?2
                 WHERE token_hash = ?1
                   AND revoked_at IS NULL
                   AND expires_at > ?2
                 RETURNING {SESSION_COLUMNS}"
              ),
              rusqlite::params![token_hash, at],
              RawSession::from_row,
            )
            .optional()?,
        )
      })
      .await
      .map_err(db)?;
    Ok(raw.map(RawSession::into_session).transpose()?)
  }

  async fn revoke_sessions(&self, identity_id: i64) -> CoreResult<u64> {
    let at = now();
    let closed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sessions SET revoked_at = ?2
           WHERE identity_id = ?1 AND revoked_at IS NULL",
          rusqlite::params![identity_id, at],
        )?)
      })
      .await
      .map_err(db)?;
    Ok(closed as u64)
  }
}
