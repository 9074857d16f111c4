//! Workshop configuration loaded from the authored book config (JSON).
//!
//! The book config carries the workshop title, maintainer list, and the
//! `features.verify` section: either a boolean (backward-compatible default
//! targets) or an object with an explicit `targets` array. Validation of the
//! targets themselves happens in the verifier registry; this module only
//! parses the raw shapes and assembles the process-wide `GlobalConfig`.
//!
//! Important env variables:
//!   WORKSHOP_CONFIG_PATH : path to the book config JSON (default ./book.json)
//!   APP_DIRECTORY        : root for author files referenced by targets (default ./app)
//!   TEMP_DIRECTORY       : scratch root for codelab workspaces (default /workshop_temp)
//!   DOC_ID               : workshop identifier reported to external services (default "local")
//!   VERIFY_DEBUG         : "yes" dumps child stdout/stderr to the logs

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::errors::VerifyError;

/// Default sandboxed execution budget (ms).
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Per-process configuration shared by every target definition.
#[derive(Clone, Debug)]
pub struct GlobalConfig {
  pub timeout_ms: u64,
  pub app_directory: PathBuf,
  pub temp_directory: PathBuf,
  pub debug: bool,
  pub display_answer: bool,
  pub redirect_url: Option<String>,
}

/// Raw `features.verify` value: plain boolean or full object.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum VerifyFeature {
  Enabled(bool),
  Config(VerifyConfig),
}

impl Default for VerifyFeature {
  fn default() -> Self {
    VerifyFeature::Enabled(false)
  }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyConfig {
  #[serde(default)]
  pub targets: Vec<RawTargetDef>,
  #[serde(default)]
  pub display_answer: bool,
  #[serde(default)]
  pub redirect_url: Option<String>,
}

/// One unvalidated target entry from the book config. The registry turns
/// these into typed `TargetDef`s or fails startup with a Config error.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTargetDef {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default, rename = "type")]
  pub target_type: Option<String>,
  #[serde(default)]
  pub file: Option<String>,
  #[serde(default)]
  pub command: Option<String>,
  #[serde(default)]
  pub files: Vec<String>,
  #[serde(default)]
  pub user_input_file: Option<String>,
  #[serde(default)]
  pub timeout: Option<Value>,
  #[serde(default)]
  pub language: Option<String>,
  #[serde(default)]
  pub input: Option<Vec<Value>>,
  #[serde(default)]
  pub retry_limit: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct BookFeatures {
  #[serde(default)]
  verify: VerifyFeature,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct BookConfig {
  #[serde(default)]
  title: String,
  #[serde(default, rename = "author")]
  maintainers: Vec<String>,
  #[serde(default)]
  features: BookFeatures,
}

/// Everything the process needs, assembled once at startup.
#[derive(Clone, Debug)]
pub struct WorkshopConfig {
  pub title: String,
  pub doc_id: String,
  pub maintainers: Vec<String>,
  pub global: GlobalConfig,
  pub verify: VerifyFeature,
}

impl WorkshopConfig {
  /// Load and parse the book config. Any IO or parse failure is fatal:
  /// a workshop with a broken config must not come up half-working.
  pub fn load_from_env() -> Result<Self, VerifyError> {
    let path = std::env::var("WORKSHOP_CONFIG_PATH").unwrap_or_else(|_| "./book.json".into());
    let raw = std::fs::read_to_string(&path)
      .map_err(|e| VerifyError::config(format!("failed to read book config {path}: {e}")))?;
    let book: BookConfig = serde_json::from_str(&raw)
      .map_err(|e| VerifyError::config(format!("failed to parse book config {path}: {e}")))?;
    info!(target: "workshop_backend", %path, "Loaded book config");
    Ok(Self::from_book(book))
  }

  fn from_book(book: BookConfig) -> Self {
    let verify = book.features.verify;
    // A bare `verify: true` keeps the legacy behavior of showing answers.
    let (display_answer, redirect_url) = match &verify {
      VerifyFeature::Enabled(_) => (true, None),
      VerifyFeature::Config(cfg) => (cfg.display_answer, cfg.redirect_url.clone()),
    };
    let global = GlobalConfig {
      timeout_ms: DEFAULT_TIMEOUT_MS,
      app_directory: std::env::var("APP_DIRECTORY").unwrap_or_else(|_| "./app".into()).into(),
      temp_directory: std::env::var("TEMP_DIRECTORY")
        .unwrap_or_else(|_| "/workshop_temp".into())
        .into(),
      debug: std::env::var("VERIFY_DEBUG").as_deref() == Ok("yes"),
      display_answer,
      redirect_url,
    };
    Self {
      title: book.title,
      doc_id: std::env::var("DOC_ID").unwrap_or_else(|_| "local".into()),
      maintainers: book.maintainers,
      global,
      verify,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn verify_feature_accepts_bool_and_object() {
    let on: VerifyFeature = serde_json::from_str("true").unwrap();
    assert!(matches!(on, VerifyFeature::Enabled(true)));

    let cfg: VerifyFeature = serde_json::from_str(
      r#"{"targets": [{"name": "quiz1", "type": "quiz", "file": "quiz.yml"}], "displayAnswer": true}"#,
    )
    .unwrap();
    match cfg {
      VerifyFeature::Config(c) => {
        assert_eq!(c.targets.len(), 1);
        assert!(c.display_answer);
        assert_eq!(c.targets[0].name.as_deref(), Some("quiz1"));
        assert_eq!(c.targets[0].target_type.as_deref(), Some("quiz"));
      }
      other => panic!("expected object config, got {other:?}"),
    }
  }

  #[test]
  fn book_config_defaults_are_benign() {
    let book: BookConfig = serde_json::from_str(r#"{"title": "My Workshop"}"#).unwrap();
    let cfg = WorkshopConfig::from_book(book);
    assert_eq!(cfg.title, "My Workshop");
    assert!(matches!(cfg.verify, VerifyFeature::Enabled(false)));
    assert_eq!(cfg.global.timeout_ms, DEFAULT_TIMEOUT_MS);
  }
}
