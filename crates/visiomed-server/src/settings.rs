//! Runtime configuration, read from a TOML file and `VISIOMED_*` variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

/// Runtime server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  #[serde(default = "default_database_path")]
  pub database_path:        PathBuf,
  /// HMAC secret for access tokens.
  pub jwt_secret:           String,
  #[serde(default = "default_access_minutes")]
  pub access_token_minutes: i64,
  #[serde(default = "default_refresh_days")]
  pub refresh_token_days:   i64,
  /// Capacity of the queue between the audit middleware and its writer.
  #[serde(default = "default_audit_queue")]
  pub audit_queue:          usize,
  /// Administrator created on first start, when the store has no identities.
  #[serde(default)]
  pub bootstrap_admin:      Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
  pub email:         String,
  pub username:      String,
  pub surname:       String,
  pub given_name:    String,
  /// Argon2 PHC string, as printed by `--hash-password`.
  pub password_hash: String,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8000 }
fn default_database_path() -> PathBuf { "visiomed.db".into() }
fn default_access_minutes() -> i64 { 30 }
fn default_refresh_days() -> i64 { 7 }
fn default_audit_queue() -> usize { 1024 }

impl ServerConfig {
  /// Layer the optional file at `path` under the `VISIOMED_*` environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("VISIOMED"))
      .build()
      .context("failed to read config file")?;
    let cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")?;
    cfg.check()?;
    Ok(cfg)
  }

  fn check(&self) -> anyhow::Result<()> {
    anyhow::ensure!(self.jwt_secret.len() >= 32, "jwt_secret must be at least 32 bytes");
    anyhow::ensure!(self.access_token_minutes > 0, "access_token_minutes must be positive");
    anyhow::ensure!(self.refresh_token_days > 0, "refresh_token_days must be positive");
    Ok(())
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn access_ttl(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.access_token_minutes)
  }

  pub fn refresh_ttl(&self) -> chrono::Duration {
    chrono::Duration::days(self.refresh_token_days)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(toml: &str) -> anyhow::Result<ServerConfig> {
    let cfg: ServerConfig = config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()?
      .try_deserialize()?;
    cfg.check()?;
    Ok(cfg)
  }

  #[test]
  fn defaults_fill_everything_but_the_secret() {
    let cfg = parse(r#"jwt_secret = "0123456789abcdef0123456789abcdef""#).unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:8000");
    assert_eq!(cfg.access_ttl(), chrono::Duration::minutes(30));
    assert_eq!(cfg.refresh_ttl(), chrono::Duration::days(7));
    assert_eq!(cfg.audit_queue, 1024);
    assert!(cfg.bootstrap_admin.is_none());
  }

  #[test]
  fn short_secret_is_refused() {
    assert!(parse(r#"jwt_secret = "short""#).is_err());
    assert!(parse("port = 9000").is_err());
  }

  #[test]
  fn bootstrap_admin_table() {
    let cfg = parse(
      r#"
        jwt_secret = "0123456789abcdef0123456789abcdef"
        [bootstrap_admin]
        email = "admin@clinic.example"
        username = "admin"
        surname = "Root"
        given_name = "Ada"
        password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.bootstrap_admin.unwrap().username, "admin");
  }
}
