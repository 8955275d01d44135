//! Audit middleware, the background audit writer, and `/audit-records`.
//!
//! The middleware asks [`AuditInterceptor`] whether a request is auditable,
//! runs it, and on a 2xx outcome hands the record to an [`AuditSink`]. The
//! sink feeds a bounded queue drained by one writer task, which persists each
//! record in its own store call. The response never waits on the journal.

use std::{net::SocketAddr, sync::Arc};

use axum::{
  Json,
  body::{Body, to_bytes},
  extract::{ConnectInfo, Request, State},
  http::{HeaderMap, StatusCode},
  middleware::Next,
  response::{IntoResponse, Response},
};
use serde_json::Value;
use tokio::{
  sync::mpsc::{self, error::TrySendError},
  task::JoinHandle,
};
use visiomed_core::{
  audit::{self, AuditAction, AuditRecord, NewAuditRecord, RequestFacts},
  authz::{Requirement, authorize, permissions},
  store::{AuditFilter, AuditStore, Page, Store},
};

use crate::{
  AppState,
  auth::{CurrentActor, bearer_token},
  error::ApiError,
  extract::Params,
};

/// Largest request or response body the middleware buffers.
const MAX_BODY: usize = 2 * 1024 * 1024;

// ─── Writer ──────────────────────────────────────────────────────────────────

/// Sending half of the audit queue.
#[derive(Clone)]
pub struct AuditSink {
  tx: mpsc::Sender<NewAuditRecord>,
}

impl AuditSink {
  /// Queue `record` without waiting. A full or closed queue drops it.
  pub fn submit(&self, record: NewAuditRecord) {
    match self.tx.try_send(record) {
      Ok(()) => {}
      Err(TrySendError::Full(record)) => tracing::warn!(
        action = %record.action,
        resource_type = %record.resource_type,
        "audit queue full; record dropped"
      ),
      Err(TrySendError::Closed(record)) => tracing::warn!(
        action = %record.action,
        resource_type = %record.resource_type,
        "audit writer stopped; record dropped"
      ),
    }
  }
}

/// Spawn the writer task. It exits once every [`AuditSink`] is dropped and
/// the queue is drained.
pub fn spawn_audit_writer<S>(store: Arc<S>, capacity: usize) -> (AuditSink, JoinHandle<()>)
where
  S: AuditStore + 'static,
{
  let (tx, mut rx) = mpsc::channel::<NewAuditRecord>(capacity.max(1));
  let handle = tokio::spawn(async move {
    while let Some(record) = rx.recv().await {
      audit::persist(store.as_ref(), record).await;
    }
    tracing::debug!("audit writer drained");
  });
  (AuditSink { tx }, handle)
}

// ─── Middleware ──────────────────────────────────────────────────────────────

fn client_address(req: &Request) -> Option<String> {
  forwarded_for(req.headers()).or_else(|| {
    req
      .extensions()
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| addr.ip().to_string())
  })
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
  headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

fn too_large() -> Response {
  (
    StatusCode::PAYLOAD_TOO_LARGE,
    Json(serde_json::json!({ "error": "request body too large" })),
  )
    .into_response()
}

/// `from_fn_with_state` middleware recording successful mutations.
pub async fn record<S: Store>(
  State(state): State<AppState<S>>,
  req: Request,
  next: Next,
) -> Response {
  let client = client_address(&req);
  let pending = state.interceptor.begin(RequestFacts {
    method:         req.method().as_str(),
    path:           req.uri().path(),
    bearer:         bearer_token(req.headers()),
    client_address: client.as_deref(),
  });
  let Some(mut pending) = pending else {
    return next.run(req).await;
  };

  // CREATE and UPDATE keep the request payload as the changes.
  let req = if pending.action() == AuditAction::Delete {
    req
  } else {
    let (parts, body) = req.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_BODY).await else {
      return too_large();
    };
    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
      pending = pending.with_changes(value);
    }
    Request::from_parts(parts, Body::from(bytes))
  };

  let response = next.run(req).await;
  let success = response.status().is_success();

  // A creation addressed to a collection learns its id from the response.
  let needs_id = success
    && pending.action() == AuditAction::Create
    && pending.resource().resource_id.is_none();
  let (response, created_id) = if needs_id {
    let (parts, body) = response.into_parts();
    match to_bytes(body, usize::MAX).await {
      Ok(bytes) => {
        let id = serde_json::from_slice::<Value>(&bytes)
          .ok()
          .and_then(|v| match v.get("id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
          });
        (Response::from_parts(parts, Body::from(bytes)), id)
      }
      Err(e) => {
        tracing::error!(error = %e, "could not buffer response body");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
      }
    }
  } else {
    (response, None)
  };

  if let Some(record) = pending.complete(success, created_id) {
    state.audit.submit(record);
  }
  response
}

// ─── /audit-records ──────────────────────────────────────────────────────────

/// `GET /audit-records[?actor_id&action&resource_type&resource_id&skip&limit]`
pub async fn list<S: Store>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Params(filter): Params<AuditFilter>,
  Params(page): Params<Page>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
  authorize(&actor, &Requirement::admin_or(permissions::AUDIT_VIEW))?;
  let records = state.store.list_audit(filter, page).await?;
  Ok(Json(records))
}
