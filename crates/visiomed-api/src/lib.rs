//! JSON REST API for the VisioMed back office.
//!
//! Exposes an axum [`Router`] backed by any [`visiomed_core::store::Store`].
//! Every route lives under [`API_PREFIX`]. Bearer-token authentication, the
//! authorization gate and the audit middleware are wired in here; TLS and
//! process concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let (audit, writer) = visiomed_api::audit::spawn_audit_writer(store.clone(), 1024);
//! let app = visiomed_api::router(AppState::new(store, tokens, audit));
//! ```

pub mod acts;
pub mod audit;
pub mod auth;
pub mod error;
pub mod export;
pub mod extract;
pub mod references;
pub mod reports;
pub mod roles;
pub mod session;
pub mod tariffs;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  middleware,
  routing::{get, post},
};
use tower_http::trace::TraceLayer;
use visiomed_core::{audit::AuditInterceptor, export::Exporter, store::Store};

pub use error::ApiError;

use crate::{
  audit::AuditSink,
  auth::{Argon2Hasher, JwtCredentials},
  export::CsvExporter,
};

/// Path every route is nested under.
pub const API_PREFIX: &str = "/api/v1";

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:       Arc<S>,
  pub tokens:      Arc<JwtCredentials>,
  pub hasher:      Arc<Argon2Hasher>,
  pub interceptor: Arc<AuditInterceptor<JwtCredentials>>,
  pub audit:       AuditSink,
  pub exporter:    Arc<dyn Exporter>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:       self.store.clone(),
      tokens:      self.tokens.clone(),
      hasher:      self.hasher.clone(),
      interceptor: self.interceptor.clone(),
      audit:       self.audit.clone(),
      exporter:    self.exporter.clone(),
    }
  }
}

impl<S: Store> AppState<S> {
  pub fn new(store: Arc<S>, tokens: JwtCredentials, audit: AuditSink) -> Self {
    let interceptor = AuditInterceptor::new(tokens.clone())
      .with_prefix(API_PREFIX)
      .ignoring("auth");
    Self {
      store,
      tokens: Arc::new(tokens),
      hasher: Arc::new(Argon2Hasher),
      interceptor: Arc::new(interceptor),
      audit,
      exporter: Arc::new(CsvExporter),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full application router for `state`.
pub fn router<S: Store>(state: AppState<S>) -> Router {
  let api = Router::new()
    // Authentication
    .route("/auth/login", post(session::login::<S>))
    .route("/auth/refresh", post(session::refresh::<S>))
    .route("/auth/me", get(session::me::<S>))
    // Identities
    .route("/users", get(users::list::<S>).post(users::create::<S>))
    .route(
      "/users/{id}",
      get(users::get_one::<S>)
        .patch(users::update::<S>)
        .delete(users::delete_one::<S>),
    )
    // Roles and permissions
    .route("/roles", get(roles::list_roles::<S>).post(roles::create_role::<S>))
    .route(
      "/roles/{id}",
      get(roles::get_role::<S>)
        .patch(roles::update_role::<S>)
        .delete(roles::delete_role::<S>),
    )
    .route(
      "/permissions",
      get(roles::list_permissions::<S>).post(roles::create_permission::<S>),
    )
    .route(
      "/permissions/{id}",
      get(roles::get_permission::<S>)
        .patch(roles::update_permission::<S>)
        .delete(roles::delete_permission::<S>),
    )
    // Reference data
    .route(
      "/services",
      get(references::list_services::<S>).post(references::create_service::<S>),
    )
    .route(
      "/services/{id}",
      get(references::get_service::<S>)
        .patch(references::update_service::<S>)
        .delete(references::delete_service::<S>),
    )
    .route(
      "/act-types",
      get(references::list_act_types::<S>).post(references::create_act_type::<S>),
    )
    .route(
      "/act-types/{id}",
      get(references::get_act_type::<S>)
        .patch(references::update_act_type::<S>)
        .delete(references::delete_act_type::<S>),
    )
    .route(
      "/coverage-types",
      get(references::list_coverage_types::<S>)
        .post(references::create_coverage_type::<S>),
    )
    .route(
      "/coverage-types/{id}",
      get(references::get_coverage_type::<S>)
        .patch(references::update_coverage_type::<S>)
        .delete(references::delete_coverage_type::<S>),
    )
    // Tariffs
    .route("/tariffs", get(tariffs::list::<S>).post(tariffs::create::<S>))
    .route("/tariffs/active", get(tariffs::active::<S>))
    .route(
      "/tariffs/{id}",
      get(tariffs::get_one::<S>)
        .patch(tariffs::update::<S>)
        .delete(tariffs::delete_one::<S>),
    )
    // Billing records
    .route("/acts", get(acts::list::<S>).post(acts::create::<S>))
    .route(
      "/acts/{id}",
      get(acts::get_one::<S>)
        .put(acts::update::<S>)
        .patch(acts::update::<S>)
        .delete(acts::delete_one::<S>),
    )
    // Reports
    .route("/reports/financial-summary", get(reports::financial_summary::<S>))
    .route("/reports/export", get(reports::export::<S>))
    // Audit journal
    .route("/audit-records", get(audit::list::<S>))
    .with_state(state.clone());

  Router::new()
    .nest(API_PREFIX, api)
    .layer(middleware::from_fn_with_state(state, audit::record::<S>))
    .layer(TraceLayer::new_for_http())
}
