//! Tabular export seam.
//!
//! The core hands over headers and flat rows; an [`Exporter`] owns the file
//! format.

use crate::Result;

/// A downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub content_type:   &'static str,
  pub file_extension: &'static str,
  pub bytes:          Vec<u8>,
}

pub trait Exporter: Send + Sync {
  fn export(&self, headers: &[&str], rows: &[Vec<String>]) -> Result<Artifact>;
}
