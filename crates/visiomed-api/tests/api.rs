//! Router-level tests: the full middleware stack over an in-memory store.

use std::{str::FromStr as _, sync::Arc};

use axum::{
  Router,
  body::Body,
  http::{Method, Request, StatusCode, header},
};
use chrono::Duration;
use http_body_util::BodyExt as _;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tower::ServiceExt as _;
use visiomed_api::{
  AppState,
  audit::spawn_audit_writer,
  auth::{Argon2Hasher, JwtCredentials},
  router,
};
use visiomed_core::{
  audit::AuditAction,
  identity::{IdentityDraft, KindAttributes},
  store::{AuditFilter, AuditStore, IdentityStore, Page},
};
use visiomed_store_sqlite::SqliteStore;

const PASSWORD: &str = "correct horse";

struct Harness {
  store:  SqliteStore,
  app:    Router,
  writer: JoinHandle<()>,
}

impl Harness {
  async fn new() -> Self {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let admin = IdentityDraft {
      email:      "admin@clinic.example".into(),
      username:   "admin".into(),
      surname:    "Root".into(),
      given_name: "Ada".into(),
      active:     true,
      kind:       "administrator".into(),
      password:   PASSWORD.into(),
      attributes: KindAttributes::default(),
      role_ids:   vec![],
    };
    store
      .insert_identity(admin.validate(&Argon2Hasher).unwrap())
      .await
      .unwrap();

    let shared = Arc::new(store.clone());
    let (sink, writer) = spawn_audit_writer(shared.clone(), 64);
    let tokens =
      JwtCredentials::new(b"test-secret", Duration::minutes(30), Duration::days(7));
    let app = router(AppState::new(shared, tokens, sink));
    Self { store, app, writer }
  }

  async fn send(
    &self,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let (status, _, bytes) = self.send_raw(method, uri, token, body).await;
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
  }

  async fn send_raw(
    &self,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut req = Request::builder()
      .method(method)
      .uri(format!("/api/v1{uri}"))
      .header("x-forwarded-for", "10.0.0.7");
    if let Some(token) = token {
      req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
      Some(body) => req
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap(),
      None => req.body(Body::empty()).unwrap(),
    };
    let resp = self.app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, bytes)
  }

  async fn login(&self, login: &str) -> Value {
    let (status, body) = self
      .send(
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "login": login, "password": PASSWORD })),
      )
      .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body
  }

  async fn token(&self, login: &str) -> String {
    self.login(login).await["access_token"]
      .as_str()
      .unwrap()
      .to_owned()
  }

  async fn create(&self, token: &str, uri: &str, body: Value) -> Value {
    let (status, created) = self.send(Method::POST, uri, Some(token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "POST {uri}: {created}");
    created
  }

  /// Stop the router and wait for every queued audit record to be written.
  async fn drain_audit(self) -> SqliteStore {
    drop(self.app);
    self.writer.await.unwrap();
    self.store
  }
}

fn user(kind: &str, username: &str) -> Value {
  json!({
    "email": format!("{username}@clinic.example"),
    "username": username,
    "surname": "Benali",
    "given_name": "Samir",
    "kind": kind,
    "password": PASSWORD,
  })
}

fn amount(v: &Value) -> Decimal {
  match v {
    Value::String(s) => Decimal::from_str(s).unwrap(),
    other => Decimal::from_str(&other.to_string()).unwrap(),
  }
}

/// Cardiology / consultation / CNSS with a tariff of 300 from 2024-01-01 and
/// 350 from 2024-07-01. Returns (act_type_id, coverage_type_id, doctor_id,
/// service_id).
async fn cardiology(h: &Harness, admin: &str) -> (i64, i64, i64, i64) {
  let service = h
    .create(admin, "/services", json!({ "code": "CARD", "name": "Cardiology" }))
    .await;
  let service_id = service["id"].as_i64().unwrap();
  let act = h
    .create(
      admin,
      "/act-types",
      json!({ "service_id": service_id, "code": "CONS", "name": "Consultation" }),
    )
    .await;
  let act_id = act["id"].as_i64().unwrap();
  let coverage = h
    .create(admin, "/coverage-types", json!({ "code": "CNSS", "name": "CNSS" }))
    .await;
  let coverage_id = coverage["id"].as_i64().unwrap();

  for (amount, begin, end) in [
    ("300.00", "2024-01-01", Some("2024-06-30")),
    ("350.00", "2024-07-01", None),
  ] {
    h.create(
      admin,
      "/tariffs",
      json!({
        "service_id": service_id,
        "act_type_id": act_id,
        "coverage_type_id": coverage_id,
        "amount": amount,
        "date_begin": begin,
        "date_end": end,
      }),
    )
    .await;
  }

  let mut doctor = user("doctor", "dr.benali");
  doctor["registration_number"] = json!("MED-001");
  let doctor = h.create(admin, "/users", doctor).await;
  (act_id, coverage_id, doctor["id"].as_i64().unwrap(), service_id)
}

// ─── Authentication ──────────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_password_is_401_with_bearer_challenge() {
  let h = Harness::new().await;
  let (status, headers, _) = h
    .send_raw(
      Method::POST,
      "/auth/login",
      None,
      Some(json!({ "login": "admin", "password": "nope nope" })),
    )
    .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
}

#[tokio::test]
async fn missing_or_bad_token_is_401() {
  let h = Harness::new().await;
  let (status, body) = h.send(Method::GET, "/acts", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert!(body["error"].is_string());

  let (status, _) = h.send(Method::GET, "/acts", Some("garbage"), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_reports_kind_and_permissions() {
  let h = Harness::new().await;
  let token = h.token("admin@clinic.example").await;
  let (status, me) = h.send(Method::GET, "/auth/me", Some(&token), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(me["kind"], "administrator");
  assert_eq!(me["username"], "admin");
  assert!(me.get("password_hash").is_none());
  assert_eq!(me["permissions"], json!([]));
}

#[tokio::test]
async fn refresh_tokens_rotate_and_are_single_use() {
  let h = Harness::new().await;
  let pair = h.login("admin").await;
  let refresh = pair["refresh_token"].as_str().unwrap();

  let (status, rotated) = h
    .send(
      Method::POST,
      "/auth/refresh",
      None,
      Some(json!({ "refresh_token": refresh })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_ne!(rotated["refresh_token"], pair["refresh_token"]);

  let (status, _) = h
    .send(
      Method::POST,
      "/auth/refresh",
      None,
      Some(json!({ "refresh_token": refresh })),
    )
    .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deactivated_identity_loses_access() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let clerk = h.create(&admin, "/users", user("clerk", "front.desk")).await;
  let clerk_token = h.token("front.desk").await;

  let uri = format!("/users/{}", clerk["id"]);
  let (status, _) = h
    .send(Method::PATCH, &uri, Some(&admin), Some(json!({ "active": false })))
    .await;
  assert_eq!(status, StatusCode::OK);

  let (status, _) = h.send(Method::GET, "/acts", Some(&clerk_token), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  let (status, _) = h
    .send(
      Method::POST,
      "/auth/login",
      None,
      Some(json!({ "login": "front.desk", "password": PASSWORD })),
    )
    .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ─── Authorization ───────────────────────────────────────────────────────────

#[tokio::test]
async fn doctor_cannot_manage_users_until_granted() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  h.create(&admin, "/users", user("doctor", "dr.haddad")).await;
  let doctor = h.token("dr.haddad").await;

  let (status, _) = h
    .send(Method::POST, "/users", Some(&doctor), Some(user("viewer", "reader")))
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let permission = h
    .create(&admin, "/permissions", json!({ "label": "user.manage" }))
    .await;
  let role = h
    .create(
      &admin,
      "/roles",
      json!({ "name": "user-admins", "permission_ids": [permission["id"]] }),
    )
    .await;
  let viewer = h
    .create(
      &admin,
      "/users",
      json!({
        "email": "manager@clinic.example",
        "username": "manager",
        "surname": "Idrissi",
        "given_name": "Leila",
        "kind": "viewer",
        "password": PASSWORD,
        "role_ids": [role["id"]],
      }),
    )
    .await;
  assert_eq!(viewer["kind"], "viewer");
  let manager = h.token("manager").await;

  let (status, _) = h
    .send(Method::POST, "/users", Some(&manager), Some(user("viewer", "reader")))
    .await;
  assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn identities_may_read_themselves_only() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let a = h.create(&admin, "/users", user("clerk", "clerk.a")).await;
  let b = h.create(&admin, "/users", user("clerk", "clerk.b")).await;
  let token_a = h.token("clerk.a").await;

  let (status, _) = h
    .send(Method::GET, &format!("/users/{}", a["id"]), Some(&token_a), None)
    .await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = h
    .send(Method::GET, &format!("/users/{}", b["id"]), Some(&token_a), None)
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn users_are_reachable_by_public_id() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let a = h.create(&admin, "/users", user("clerk", "clerk.a")).await;
  let b = h.create(&admin, "/users", user("clerk", "clerk.b")).await;
  let token_a = h.token("clerk.a").await;

  let uri = format!("/users/{}", a["public_id"].as_str().unwrap());
  let (status, body) = h.send(Method::GET, &uri, Some(&token_a), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["id"], a["id"]);

  let uri = format!("/users/{}", b["public_id"].as_str().unwrap());
  let (status, _) = h.send(Method::GET, &uri, Some(&token_a), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, _) = h.send(Method::GET, "/users/not-a-key", Some(&admin), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn kind_cannot_change_and_foreign_attributes_are_rejected() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let clerk = h.create(&admin, "/users", user("clerk", "front.desk")).await;
  let uri = format!("/users/{}", clerk["id"]);

  let (status, _) = h
    .send(Method::PATCH, &uri, Some(&admin), Some(json!({ "kind": "doctor" })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = h
    .send(
      Method::PATCH,
      &uri,
      Some(&admin),
      Some(json!({ "specialty": "Cardiology" })),
    )
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = h.send(Method::GET, &uri, Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["kind"], "clerk");
}

#[tokio::test]
async fn duplicate_username_is_409() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  h.create(&admin, "/users", user("clerk", "front.desk")).await;
  let mut dup = user("viewer", "front.desk");
  dup["email"] = json!("other@clinic.example");
  let (status, _) = h.send(Method::POST, "/users", Some(&admin), Some(dup)).await;
  assert_eq!(status, StatusCode::CONFLICT);
}

// ─── Billing and tariffs ─────────────────────────────────────────────────────

#[tokio::test]
async fn cardiology_scenario() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let (act_id, coverage_id, doctor_id, service_id) = cardiology(&h, &admin).await;
  let doctor = h.token("dr.benali").await;

  let act = |on: &str| {
    json!({
      "patient_surname": "Alaoui",
      "patient_given_name": "Amina",
      "act_date": on,
      "act_type_id": act_id,
      "coverage_type_id": coverage_id,
      "doctor_id": doctor_id,
    })
  };

  let march = h.create(&doctor, "/acts", act("2024-03-15")).await;
  assert_eq!(amount(&march["amount"]), Decimal::from(300));
  assert_eq!(march["status"], "unpaid");
  let september = h.create(&doctor, "/acts", act("2024-09-01")).await;
  assert_eq!(amount(&september["amount"]), Decimal::from(350));

  let (status, _) = h
    .send(Method::POST, "/acts", Some(&doctor), Some(act("2023-12-01")))
    .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

  let (status, sim) = h
    .send(
      Method::GET,
      &format!(
        "/tariffs/active?service_id={service_id}&act_type_id={act_id}\
         &coverage_type_id={coverage_id}&date=2024-06-30"
      ),
      Some(&doctor),
      None,
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(amount(&sim["tariff"]["amount"]), Decimal::from(300));

  let (status, none) = h
    .send(
      Method::GET,
      &format!(
        "/tariffs/active?service_id={service_id}&act_type_id={act_id}\
         &coverage_type_id={coverage_id}&date=2020-01-01"
      ),
      Some(&doctor),
      None,
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert!(none["tariff"].is_null());
}

#[tokio::test]
async fn tariff_changes_never_reprice_existing_acts() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let (act_id, coverage_id, doctor_id, _) = cardiology(&h, &admin).await;

  let record = h
    .create(
      &admin,
      "/acts",
      json!({
        "patient_surname": "Tazi",
        "patient_given_name": "Omar",
        "act_date": "2024-03-15",
        "act_type_id": act_id,
        "coverage_type_id": coverage_id,
        "doctor_id": doctor_id,
      }),
    )
    .await;

  let (_, tariffs) = h.send(Method::GET, "/tariffs", Some(&admin), None).await;
  let first = tariffs
    .as_array()
    .unwrap()
    .iter()
    .find(|t| t["date_begin"] == "2024-01-01")
    .unwrap();
  let (status, _) = h
    .send(
      Method::PATCH,
      &format!("/tariffs/{}", first["id"]),
      Some(&admin),
      Some(json!({ "amount": "999.00" })),
    )
    .await;
  assert_eq!(status, StatusCode::OK);

  let (_, reread) = h
    .send(Method::GET, &format!("/acts/{}", record["id"]), Some(&admin), None)
    .await;
  assert_eq!(amount(&reread["amount"]), Decimal::from(300));
}

#[tokio::test]
async fn viewer_cannot_create_acts_but_reads_reports() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let (act_id, coverage_id, doctor_id, _) = cardiology(&h, &admin).await;
  h.create(&admin, "/users", user("viewer", "reader")).await;
  let viewer = h.token("reader").await;

  let (status, _) = h
    .send(
      Method::POST,
      "/acts",
      Some(&viewer),
      Some(json!({
        "patient_surname": "Tazi",
        "patient_given_name": "Omar",
        "act_date": "2024-03-15",
        "act_type_id": act_id,
        "coverage_type_id": coverage_id,
        "doctor_id": doctor_id,
      })),
    )
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, summary) = h
    .send(
      Method::GET,
      "/reports/financial-summary?start_date=2024-01-01&end_date=2024-12-31",
      Some(&viewer),
      None,
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(summary["total_acts"], 0);
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn summary_and_export_over_a_period() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let (act_id, coverage_id, doctor_id, _) = cardiology(&h, &admin).await;
  for (surname, on) in [("Alaoui", "2024-03-15"), ("Tazi", "2024-03-01"), ("Naji", "2024-08-01")] {
    h.create(
      &admin,
      "/acts",
      json!({
        "patient_surname": surname,
        "patient_given_name": "Amina",
        "act_date": on,
        "act_type_id": act_id,
        "coverage_type_id": coverage_id,
        "doctor_id": doctor_id,
      }),
    )
    .await;
  }

  let (status, summary) = h
    .send(
      Method::GET,
      "/reports/financial-summary?start_date=2024-03-01&end_date=2024-03-31",
      Some(&admin),
      None,
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(summary["total_acts"], 2);
  assert_eq!(amount(&summary["total_revenue"]), Decimal::from(600));
  assert_eq!(summary["by_service"][0]["label"], "Cardiology");
  assert_eq!(summary["by_doctor"][0]["label"], "Samir Benali");

  let (status, headers, bytes) = h
    .send_raw(
      Method::GET,
      "/reports/export?start_date=2024-03-01&end_date=2024-03-31",
      Some(&admin),
      None,
    )
    .await;
  assert_eq!(status, StatusCode::OK);
  assert!(
    headers[header::CONTENT_DISPOSITION]
      .to_str()
      .unwrap()
      .contains("billing_20240301_20240331.csv")
  );
  let csv = String::from_utf8(bytes).unwrap();
  let lines: Vec<_> = csv.lines().collect();
  assert_eq!(lines[0], "Date,Patient,Service,Act,Coverage,Doctor,Amount,Status");
  assert_eq!(lines.len(), 3);
  assert!(lines[1].starts_with("2024-03-01,Tazi Amina,Cardiology"));

  let (status, _) = h
    .send(
      Method::GET,
      "/reports/financial-summary?start_date=2024-04-01&end_date=2024-03-01",
      Some(&admin),
      None,
    )
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_mutations_are_audited() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  let admin_id = h.store.find_credentials("admin".into()).await.unwrap().unwrap().identity.id;

  let service = h
    .create(&admin, "/services", json!({ "code": "CARD", "name": "Cardiology" }))
    .await;
  let uri = format!("/services/{}", service["id"]);
  let (status, _) = h
    .send(Method::PATCH, &uri, Some(&admin), Some(json!({ "name": "Cardio" })))
    .await;
  assert_eq!(status, StatusCode::OK);
  // Reads, failures and logins leave no trail.
  h.send(Method::GET, &uri, Some(&admin), None).await;
  let (status, _) = h
    .send(Method::POST, "/services", Some(&admin), Some(json!({ "code": "CARD", "name": "Again" })))
    .await;
  assert_eq!(status, StatusCode::CONFLICT);
  let (status, _) = h.send(Method::DELETE, &uri, Some(&admin), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let store = h.drain_audit().await;
  let records = store
    .list_audit(AuditFilter::default(), Page::default())
    .await
    .unwrap();
  let actions: Vec<_> = records.iter().map(|r| r.action).collect();
  assert_eq!(actions, vec![AuditAction::Delete, AuditAction::Update, AuditAction::Create]);

  let created = &records[2];
  assert_eq!(created.actor_id, Some(admin_id));
  assert_eq!(created.resource_type, "services");
  assert_eq!(created.resource_id, Some(service["id"].to_string()));
  assert_eq!(created.client_address.as_deref(), Some("10.0.0.7"));
  assert_eq!(created.changes.as_ref().unwrap()["code"], "CARD");
}

#[tokio::test]
async fn audited_payloads_never_carry_passwords() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  h.create(&admin, "/users", user("clerk", "front.desk")).await;

  let store = h.drain_audit().await;
  let records = store
    .list_audit(
      AuditFilter { resource_type: Some("users".into()), ..Default::default() },
      Page::default(),
    )
    .await
    .unwrap();
  assert_eq!(records.len(), 1);
  let changes = records[0].changes.as_ref().unwrap();
  assert_eq!(changes["username"], "front.desk");
  assert!(changes.get("password").is_none());
}

#[tokio::test]
async fn audit_records_endpoint_requires_audit_view() {
  let h = Harness::new().await;
  let admin = h.token("admin").await;
  h.create(&admin, "/users", user("clerk", "front.desk")).await;
  let clerk = h.token("front.desk").await;

  let (status, _) = h.send(Method::GET, "/audit-records", Some(&clerk), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, body) = h
    .send(Method::GET, "/audit-records?action=CREATE", Some(&admin), None)
    .await;
  assert_eq!(status, StatusCode::OK);
  assert!(body.is_array());
}
