//! Error type for `visiomed-store-sqlite`, and its translation into the core
//! taxonomy.

use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column could not be decoded into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  fn constraint(&self) -> Option<(std::ffi::c_int, &str)> {
    match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, message),
      )) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
        Some((e.extended_code, message.as_deref().unwrap_or_default()))
      }
      _ => None,
    }
  }

  fn is_unique_violation(&self) -> bool {
    matches!(
      self.constraint(),
      Some((ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY, _))
    )
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(e.into()) }
}

impl From<Error> for visiomed_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Database(tokio_rusqlite::Error::Other(inner)) => {
        match inner.downcast::<visiomed_core::Error>() {
          Ok(core) => *core,
          Err(other) => Self::Storage(other),
        }
      }
      e if matches!(e.constraint(), Some((ffi::SQLITE_CONSTRAINT_FOREIGNKEY, _))) => {
        Self::BusinessRuleViolation(
          "the record references a missing row or is still referenced by \
           other records"
            .into(),
        )
      }
      e => Self::Storage(Box::new(e)),
    }
  }
}

/// Abort a connection call with a domain error; it comes back out unchanged
/// through the `From<Error>` conversion above.
pub(crate) fn abort(err: visiomed_core::Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(err))
}

/// Translate a unique-constraint failure on one of `fields` into
/// `AlreadyExists`. SQLite names the failing column in its message
/// (`UNIQUE constraint failed: identities.email`).
pub(crate) fn conflict(
  err: Error,
  entity: &'static str,
  fields: &[(&'static str, &str)],
) -> visiomed_core::Error {
  if !err.is_unique_violation() {
    return err.into();
  }
  let message = err.constraint().map(|(_, m)| m).unwrap_or_default();
  let hit = fields
    .iter()
    .find(|(column, _)| message.contains(&format!(".{column}")))
    .or_else(|| fields.first());
  match hit {
    Some((field, value)) => {
      visiomed_core::Error::already_exists(entity, *field, value)
    }
    None => visiomed_core::Error::already_exists(entity, "key", message),
  }
}

/// What a `Connection::call` closure returns.
pub(crate) type CallResult<T> = std::result::Result<T, tokio_rusqlite::Error>;

/// Map a failed connection call straight into the core taxonomy.
pub(crate) fn db(e: tokio_rusqlite::Error) -> visiomed_core::Error {
  Error::from(e).into()
}
