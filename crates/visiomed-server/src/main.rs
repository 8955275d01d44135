//! VisioMed server binary.
//!
//! Reads `visiomed.toml` (or the path given with `--config`), opens the SQLite
//! store, creates the bootstrap administrator on an empty database, and
//! serves the REST API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `bootstrap_admin.password_hash`:
//!
//! ```text
//! cargo run -p visiomed-server -- --hash-password
//! ```

mod settings;

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use visiomed_api::{
  AppState,
  audit::spawn_audit_writer,
  auth::{Argon2Hasher, JwtCredentials},
};
use visiomed_core::{
  identity::{IdentityDraft, KindAttributes, PasswordHasher as _},
  store::IdentityStore,
};
use visiomed_store_sqlite::SqliteStore;

use crate::settings::{BootstrapAdmin, ServerConfig};

#[derive(Parser)]
#[command(author, version, about = "VisioMed billing back office")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "visiomed.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    println!("{}", Argon2Hasher.hash(&password)?);
    return Ok(());
  }

  let cfg = ServerConfig::load(&cli.config)?;

  let database_path = expand_tilde(&cfg.database_path);
  if let Some(parent) = database_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&database_path)
    .await
    .with_context(|| format!("failed to open store at {database_path:?}"))?;

  if let Some(admin) = &cfg.bootstrap_admin {
    bootstrap(&store, admin).await?;
  }

  let store = Arc::new(store);
  let (audit, writer) = spawn_audit_writer(store.clone(), cfg.audit_queue);
  let tokens = JwtCredentials::new(
    cfg.jwt_secret.as_bytes(),
    cfg.access_ttl(),
    cfg.refresh_ttl(),
  );
  let app = visiomed_api::router(AppState::new(store, tokens, audit));

  let address = cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .with_graceful_shutdown(shutdown_signal())
  .await
  .context("server error")?;

  // The router owned every audit sink; the writer now drains and stops.
  match tokio::time::timeout(Duration::from_secs(10), writer).await {
    Ok(Ok(())) => tracing::info!("audit journal flushed"),
    Ok(Err(e)) => tracing::error!(error = %e, "audit writer panicked"),
    Err(_) => tracing::warn!("audit writer did not drain in time"),
  }

  Ok(())
}

/// Create the configured administrator when the store holds no identity.
async fn bootstrap(store: &SqliteStore, admin: &BootstrapAdmin) -> anyhow::Result<()> {
  if store.count_identities().await? > 0 {
    return Ok(());
  }
  let draft = IdentityDraft {
    email:      admin.email.clone(),
    username:   admin.username.clone(),
    surname:    admin.surname.clone(),
    given_name: admin.given_name.clone(),
    active:     true,
    kind:       "administrator".into(),
    password:   String::new(),
    attributes: KindAttributes::default(),
    role_ids:   Vec::new(),
  };
  let new = draft
    .validate_hashed(admin.password_hash.clone(), &Argon2Hasher)
    .context("invalid bootstrap_admin configuration")?;
  let identity = store
    .insert_identity(new)
    .await
    .context("failed to create the bootstrap administrator")?;
  tracing::info!(
    identity_id = identity.id,
    username = %identity.username,
    "created bootstrap administrator"
  );
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "could not listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}

/// Read one password line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead as _, Write as _};
  eprint!("Password: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  io::stdin()
    .lock()
    .read_line(&mut line)
    .context("failed to read password")?;
  let password = line.trim_end_matches(['\r', '\n']).to_owned();
  anyhow::ensure!(password.len() >= 8, "password must be at least 8 characters");
  Ok(password)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
