//! Verification engine: registry, shared lifecycle, and the five target types.
//!
//! The registry is an explicit value built once at startup and handed to the
//! request handlers through application state. Target configuration is
//! validated eagerly here; a bad author config prevents the process from
//! coming up rather than failing per-request.

use std::sync::Arc;

use crate::config::{GlobalConfig, RawTargetDef, VerifyConfig, VerifyFeature};
use crate::domain::TargetDef;
use crate::errors::VerifyError;

pub mod base;
pub mod codelab;
pub mod confirm;
pub mod quiz;
pub mod runner;
pub mod script;
pub mod survey;

pub use base::{RunReport, Verifier};

/// Conventional script filename used when verification is enabled with a bare
/// boolean and no explicit targets.
const DEFAULT_SCRIPT_FILE: &str = "verify.sh";
const DEFAULT_SCRIPT_TARGET: &str = "verify";
const DEFAULT_CONFIRM_TARGET: &str = "confirm";

#[derive(Debug)]
pub struct VerifierRegistry {
    targets: Arc<Vec<Arc<TargetDef>>>,
    global: GlobalConfig,
    doc_id: String,
}

impl VerifierRegistry {
    /// Build the registry from the raw `features.verify` config.
    /// Every failure here is an author misconfiguration and fatal.
    pub fn from_config(
        verify: &VerifyFeature,
        global: &GlobalConfig,
        doc_id: &str,
    ) -> Result<Self, VerifyError> {
        let config = match verify {
            VerifyFeature::Enabled(false) => {
                return Err(VerifyError::config("Verification feature is disabled"));
            }
            VerifyFeature::Enabled(true) => default_config(global),
            VerifyFeature::Config(config) => config.clone(),
        };

        if config.targets.is_empty() {
            return Err(VerifyError::config("verify.targets must have at least one element"));
        }

        let mut targets: Vec<Arc<TargetDef>> = Vec::with_capacity(config.targets.len());
        for raw in &config.targets {
            targets.push(Arc::new(validate_target(raw, global)?));
        }

        let mut names = std::collections::HashSet::new();
        for def in &targets {
            if !names.insert(def.name.clone()) {
                return Err(VerifyError::config("Found targets with duplicated names"));
            }
        }

        Ok(Self { targets: Arc::new(targets), global: global.clone(), doc_id: doc_id.into() })
    }

    /// Bind a verifier instance for one user and one target. A dotted suffix
    /// on the target name (anchor links from the UI) is stripped.
    pub fn create(&self, user: &str, target_name: &str) -> Result<Verifier, VerifyError> {
        let name = target_name.split('.').next().unwrap_or(target_name);
        let def = self
            .targets
            .iter()
            .find(|def| def.name == name)
            .cloned()
            .ok_or_else(|| {
                VerifyError::target_name(format!(
                    "there is no verification target named as \"{name}\""
                ))
            })?;
        let username = user.split('@').next().unwrap_or(user).to_string();
        Ok(Verifier {
            user: user.to_string(),
            username,
            def,
            targets: self.targets.clone(),
            global: self.global.clone(),
            doc_id: self.doc_id.clone(),
        })
    }

    pub fn targets(&self) -> &[Arc<TargetDef>] {
        &self.targets
    }
}

/// Backward compatibility: `verify: true` means a single script target when
/// the conventional script file exists on disk, a confirm target otherwise.
fn default_config(global: &GlobalConfig) -> VerifyConfig {
    let script_path = global.app_directory.join(DEFAULT_SCRIPT_FILE);
    let found_script = std::fs::metadata(&script_path).map(|m| m.is_file()).unwrap_or(false);
    let target = if found_script {
        RawTargetDef {
            name: Some(DEFAULT_SCRIPT_TARGET.into()),
            target_type: Some("script".into()),
            file: Some(DEFAULT_SCRIPT_FILE.into()),
            ..RawTargetDef::default()
        }
    } else {
        RawTargetDef {
            name: Some(DEFAULT_CONFIRM_TARGET.into()),
            target_type: Some("confirm".into()),
            ..RawTargetDef::default()
        }
    };
    VerifyConfig { targets: vec![target], ..VerifyConfig::default() }
}

fn validate_target(raw: &RawTargetDef, global: &GlobalConfig) -> Result<TargetDef, VerifyError> {
    let Some(target_type) = raw.target_type.as_deref() else {
        return Err(VerifyError::config("target definition must have a String property \"type\""));
    };
    let (name, kind) = match target_type {
        "confirm" => confirm::validate(raw)?,
        "quiz" => quiz::validate(raw, global)?,
        "survey" => survey::validate(raw, global)?,
        "script" => script::validate(raw, global)?,
        "codelab" => codelab::validate(raw)?,
        other => {
            return Err(VerifyError::config(format!("\"{other}\" is not a valid target type")));
        }
    };
    Ok(TargetDef {
        name,
        retry_limit_ms: raw.retry_limit.unwrap_or(0),
        timeout_ms: base::resolve_timeout(global, raw.timeout.as_ref())?,
        kind,
    })
}
