//! Shared verification lifecycle and config-validation helpers.
//!
//! Every target type goes through the same `run` sequence: retry-limit gate,
//! type-specific verification, pending/completed persistence, and workshop
//! completion detection. A target that reaches `"completed"` stays completed;
//! the workshop-level final flag is never stored, it is recomputed on every
//! run as the conjunction of all registered targets.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{GlobalConfig, RawTargetDef};
use crate::domain::{InputDef, Progress, TargetDef, TargetKind, STATUS_COMPLETED};
use crate::errors::VerifyError;
use crate::store::Store;
use crate::util::{is_alphanumeric_name, is_valid_env_name};
use crate::verifier::{codelab, confirm, quiz, script, survey};

/// What a type-specific verification produced. No `pending` means this call
/// completed the target.
#[derive(Debug, Default)]
pub struct Outcome {
    pub passed: Vec<String>,
    pub pending: Option<Value>,
    pub data: Option<Value>,
}

/// Result returned to the HTTP boundary after a run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub passed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "final")]
    pub is_final: bool,
    /// Where to send the user once the whole workshop is done.
    #[serde(rename = "redirectUrl", skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// One verification bound to a user and a target definition.
/// Created per-request by the registry; holds no mutable state of its own.
#[derive(Debug)]
pub struct Verifier {
    pub user: String,
    /// Local part of the user id, used for sandbox identifiers and paths.
    pub username: String,
    pub def: Arc<TargetDef>,
    pub targets: Arc<Vec<Arc<TargetDef>>>,
    pub global: GlobalConfig,
    pub doc_id: String,
}

impl Verifier {
    pub async fn run(&self, store: &Store, data: Value) -> Result<RunReport, VerifyError> {
        debug!(target: "verify", user = %self.user, "checking verify retry limit");
        self.check_retry_limit(store).await?;

        // Completed targets are sticky: re-running one never reverts it and
        // never re-executes the type-specific algorithm.
        if self.target_status(store).await.as_str() == Some(STATUS_COMPLETED) {
            debug!(target: "verify", user = %self.user, name = %self.def.name, "target already completed");
            let is_final = self.is_final(store).await?;
            return Ok(RunReport {
                passed: vec![],
                pending: None,
                data: None,
                is_final,
                redirect_url: self.redirect_url(is_final),
            });
        }

        debug!(target: "verify", user = %self.user, name = %self.def.name, "running verification target");
        let outcome = match &self.def.kind {
            TargetKind::Confirm => confirm::verify(self, &data),
            TargetKind::Quiz { .. } => quiz::verify(self, store, data).await?,
            TargetKind::Survey { .. } => survey::verify(self, data),
            TargetKind::Script { .. } => script::verify(self, store, data).await?,
            TargetKind::Codelab { .. } => codelab::verify(self, data).await?,
        };

        if let Some(pending) = &outcome.pending {
            debug!(target: "verify", user = %self.user, name = %self.def.name, "updated target status to pending");
            store.update_target_status(&self.user, &self.def.name, pending.clone()).await?;
        } else {
            store
                .update_target_status(&self.user, &self.def.name, json!(STATUS_COMPLETED))
                .await?;
            info!(
                target: "verify",
                doc_id = %self.doc_id,
                user = %self.user,
                name = %self.def.name,
                event = "VerifyTarget",
                status = "Completed",
                "Verify Target Completed"
            );
        }

        let is_final = self.is_final(store).await?;
        if is_final {
            debug!(target: "verify", user = %self.user, "updating workshop progress to completed");
            store.update_progress(&self.user, Progress::Completed).await?;
        }

        Ok(RunReport {
            passed: outcome.passed,
            pending: outcome.pending,
            data: outcome.data,
            is_final,
            redirect_url: self.redirect_url(is_final),
        })
    }

    fn redirect_url(&self, is_final: bool) -> Option<String> {
        if is_final { self.global.redirect_url.clone() } else { None }
    }

    /// Retry gate. With no limit, every attempt is allowed and stamped.
    /// Otherwise an attempt inside the window fails with the remaining wait
    /// time (seconds, one decimal), and an attempt outside it re-stamps.
    async fn check_retry_limit(&self, store: &Store) -> Result<(), VerifyError> {
        let now = Utc::now();
        if self.def.retry_limit_ms == 0 {
            store.update_last_verified(&self.user, now).await;
            return Ok(());
        }
        let last_verified = store.get_user_state(&self.user).await.and_then(|s| s.last_verified);
        let Some(last) = last_verified else {
            store.update_last_verified(&self.user, now).await;
            return Ok(());
        };
        let elapsed_ms = (now - last).num_milliseconds().max(0) as u64;
        if elapsed_ms > self.def.retry_limit_ms {
            store.update_last_verified(&self.user, now).await;
            return Ok(());
        }
        let wait_s = (self.def.retry_limit_ms - elapsed_ms) as f64 / 1000.0;
        Err(VerifyError::retry_limit(format!(
            "Please wait {wait_s:.1} s to submit your solution again"
        )))
    }

    /// Current stored status for this target, `{}` when none exists yet.
    pub async fn target_status(&self, store: &Store) -> Value {
        store
            .get_user_state(&self.user)
            .await
            .and_then(|s| s.target_status.get(&self.def.name).cloned())
            .unwrap_or_else(|| json!({}))
    }

    async fn is_final(&self, store: &Store) -> Result<bool, VerifyError> {
        let progress = store.get_user_progress(&self.user).await;
        Ok(self
            .targets
            .iter()
            .all(|def| progress.targets_completed.get(&def.name).copied().unwrap_or(false)))
    }
}

// ---------------------------------------------------------------------------
// Config-validation helpers, shared across target types.
// Run once at registry construction, never at request time.
// ---------------------------------------------------------------------------

pub fn validate_name(raw: &RawTargetDef) -> Result<String, VerifyError> {
    let Some(name) = raw.name.as_deref() else {
        return Err(VerifyError::config("target definition must have a String property \"name\""));
    };
    if !is_alphanumeric_name(name) {
        return Err(VerifyError::config("target name must be alphanumeric"));
    }
    Ok(name.to_string())
}

/// Resolve `file` against the app directory and require a regular file.
/// The only blocking filesystem access in the system, startup-only.
pub fn resolve_target_file(
    global: &GlobalConfig,
    file: Option<&str>,
) -> Result<std::path::PathBuf, VerifyError> {
    let Some(file) = file else {
        return Err(VerifyError::config("target definition must have a String property \"file\""));
    };
    let filepath = global.app_directory.join(file);
    match std::fs::metadata(&filepath) {
        Ok(meta) if meta.is_file() => Ok(filepath),
        _ => Err(VerifyError::config("specified file in target definition is not found")),
    }
}

/// Timeout must be numeric or fall back to the global default.
pub fn resolve_timeout(global: &GlobalConfig, timeout: Option<&Value>) -> Result<u64, VerifyError> {
    match timeout {
        None => Ok(global.timeout_ms),
        Some(value) => value.as_u64().ok_or_else(|| {
            VerifyError::config("\"timeout\" property in target definition must be type of Number")
        }),
    }
}

/// Parse declared `input[]` entries: objects with a `name` usable as an
/// environment variable and a `desc`, names unique within the target.
pub fn validate_inputs(input: Option<&Vec<Value>>) -> Result<Vec<InputDef>, VerifyError> {
    let Some(items) = input else {
        return Ok(vec![]);
    };
    let mut defs = Vec::with_capacity(items.len());
    let mut seen = std::collections::HashSet::new();
    for item in items {
        let def: InputDef = serde_json::from_value(item.clone()).map_err(|_| {
            VerifyError::config(
                "\"input\" entries must be Objects with String properties \"name\" and \"desc\"",
            )
        })?;
        if !is_valid_env_name(&def.name) {
            return Err(VerifyError::config(
                "\"input[].name\" property must be valid as an environment variable name",
            ));
        }
        if !seen.insert(def.name.clone()) {
            return Err(VerifyError::config(
                "each \"input[].name\" property in target definition must be unique",
            ));
        }
        defs.push(def);
    }
    Ok(defs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::tests::{global_for_tests, verifier_for};
    use chrono::Duration;

    #[tokio::test]
    async fn retry_gate_blocks_inside_window_with_remaining_wait() {
        let store = Store::new();
        let verifier = verifier_for("confirm1", TargetKind::Confirm, 1_000);
        store
            .update_last_verified(&verifier.user, Utc::now() - Duration::milliseconds(500))
            .await;

        let err = verifier.run(&store, json!({})).await.unwrap_err();
        assert_eq!(err.kind, crate::errors::VerifyErrorKind::RetryLimit);
        // ~0.5 s remaining, one decimal.
        assert!(err.message.contains("0.5 s") || err.message.contains("0.4 s"), "{}", err.message);
    }

    #[tokio::test]
    async fn retry_gate_allows_outside_window() {
        let store = Store::new();
        let verifier = verifier_for("confirm1", TargetKind::Confirm, 1_000);
        store
            .update_last_verified(&verifier.user, Utc::now() - Duration::milliseconds(1_500))
            .await;

        let report = verifier.run(&store, json!({})).await.unwrap();
        assert!(report.is_final);
    }

    #[tokio::test]
    async fn zero_retry_limit_always_allows() {
        let store = Store::new();
        let verifier = verifier_for("confirm1", TargetKind::Confirm, 0);
        verifier.run(&store, json!({})).await.unwrap();
        verifier.run(&store, json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn confirm_completes_idempotently_without_pending() {
        let store = Store::new();
        let verifier = verifier_for("confirm1", TargetKind::Confirm, 0);

        let first = verifier.run(&store, json!({})).await.unwrap();
        assert!(first.pending.is_none());
        assert!(first.is_final);

        let second = verifier.run(&store, json!({})).await.unwrap();
        assert!(second.pending.is_none());
        assert!(second.is_final);

        let status = verifier.target_status(&store).await;
        assert_eq!(status.as_str(), Some(STATUS_COMPLETED));
    }

    #[tokio::test]
    async fn workshop_completes_only_when_every_target_is_completed() {
        let store = Store::new();
        let defs: Arc<Vec<Arc<TargetDef>>> = Arc::new(vec![
            Arc::new(TargetDef {
                name: "first".into(),
                retry_limit_ms: 0,
                timeout_ms: 1_000,
                kind: TargetKind::Confirm,
            }),
            Arc::new(TargetDef {
                name: "second".into(),
                retry_limit_ms: 0,
                timeout_ms: 1_000,
                kind: TargetKind::Confirm,
            }),
        ]);
        let first = Verifier {
            user: "u@example.com".into(),
            username: "u".into(),
            def: defs[0].clone(),
            targets: defs.clone(),
            global: global_for_tests(),
            doc_id: "local".into(),
        };
        let second = Verifier { def: defs[1].clone(), ..first_clone(&first) };

        let report = first.run(&store, json!({})).await.unwrap();
        assert!(!report.is_final);
        let progress = store.get_user_progress("u@example.com").await;
        assert_ne!(progress.progress, Progress::Completed);

        let report = second.run(&store, json!({})).await.unwrap();
        assert!(report.is_final);
        let progress = store.get_user_progress("u@example.com").await;
        assert_eq!(progress.progress, Progress::Completed);
    }

    fn first_clone(v: &Verifier) -> Verifier {
        Verifier {
            user: v.user.clone(),
            username: v.username.clone(),
            def: v.def.clone(),
            targets: v.targets.clone(),
            global: v.global.clone(),
            doc_id: v.doc_id.clone(),
        }
    }

    #[test]
    fn input_validation_rejects_duplicates_and_bad_names() {
        let ok = validate_inputs(Some(&vec![
            json!({"name": "HOST", "desc": "hostname"}),
            json!({"name": "PORT", "desc": "port"}),
        ]))
        .unwrap();
        assert_eq!(ok.len(), 2);

        let dup = validate_inputs(Some(&vec![
            json!({"name": "HOST", "desc": "a"}),
            json!({"name": "HOST", "desc": "b"}),
        ]));
        assert!(dup.is_err());

        let bad = validate_inputs(Some(&vec![json!({"name": "2bad", "desc": "x"})]));
        assert!(bad.is_err());

        let missing_desc = validate_inputs(Some(&vec![json!({"name": "OK"})]));
        assert!(missing_desc.is_err());
    }

    #[test]
    fn timeout_defaults_to_global() {
        let global = global_for_tests();
        assert_eq!(resolve_timeout(&global, None).unwrap(), global.timeout_ms);
        assert_eq!(resolve_timeout(&global, Some(&json!(250))).unwrap(), 250);
        assert!(resolve_timeout(&global, Some(&json!("250"))).is_err());
    }
}
