//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use visiomed_core::Error as CoreError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Domain(#[from] CoreError),

  /// The request could not be read: malformed JSON, bad query string.
  #[error("bad request: {0}")]
  BadRequest(String),
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    Self::BadRequest(rejection.body_text())
  }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self {
    Self::BadRequest(rejection.body_text())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Domain(e) => match e {
        CoreError::NotFound { .. } | CoreError::TariffNotFound { .. } => {
          (StatusCode::NOT_FOUND, e.to_string())
        }
        CoreError::AlreadyExists { .. } => (StatusCode::CONFLICT, e.to_string()),
        CoreError::AuthenticationFailed => {
          let mut res = (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "could not validate credentials" })),
          )
            .into_response();
          res.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Bearer"),
          );
          return res;
        }
        CoreError::PermissionDenied => {
          (StatusCode::FORBIDDEN, e.to_string())
        }
        CoreError::BusinessRuleViolation(m) => {
          (StatusCode::UNPROCESSABLE_ENTITY, m.clone())
        }
        CoreError::InvalidInput(m) => (StatusCode::BAD_REQUEST, m.clone()),
        CoreError::Storage(source) => {
          tracing::error!(error = %source, "storage failure");
          (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_owned(),
          )
        }
      },
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn status_of(e: CoreError) -> StatusCode {
    ApiError::from(e).into_response().status()
  }

  #[test]
  fn domain_errors_map_to_statuses() {
    assert_eq!(status_of(CoreError::not_found("act", 1)), StatusCode::NOT_FOUND);
    assert_eq!(
      status_of(CoreError::already_exists("identity", "email", "a@b.c")),
      StatusCode::CONFLICT
    );
    assert_eq!(status_of(CoreError::PermissionDenied), StatusCode::FORBIDDEN);
    assert_eq!(
      status_of(CoreError::BusinessRuleViolation("no tariff".into())),
      StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(status_of(CoreError::invalid("bad")), StatusCode::BAD_REQUEST);
    assert_eq!(
      status_of(CoreError::Storage("disk full".into())),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }

  #[test]
  fn unauthenticated_carries_bearer_challenge() {
    let res = ApiError::from(CoreError::AuthenticationFailed).into_response();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
      res.headers().get(header::WWW_AUTHENTICATE).unwrap(),
      "Bearer"
    );
  }
}
