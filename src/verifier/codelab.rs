//! Codelab target: runs an author-defined command against user-submitted code.
//!
//! Unlike scripts, the input channel is a per-user scratch workspace: author
//! resources are copied in, the submitted code is written to a fixed filename,
//! and the command runs with the workspace as its working directory. The
//! workspace is deleted after every run, success or failure — cleanup is
//! unconditional, then the original error is rethrown.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::config::RawTargetDef;
use crate::domain::TargetKind;
use crate::errors::VerifyError;
use crate::verifier::base::{validate_name, Outcome, Verifier};
use crate::verifier::runner::{run_sandboxed, ExecSpec};

pub async fn verify(verifier: &Verifier, data: Value) -> Result<Outcome, VerifyError> {
    let workspace = verifier.global.temp_directory.join("temp").join(&verifier.username);
    let result = run_in_workspace(verifier, &workspace, data).await;
    cleanup(&workspace).await;
    result
}

async fn run_in_workspace(
    verifier: &Verifier,
    workspace: &Path,
    data: Value,
) -> Result<Outcome, VerifyError> {
    let TargetKind::Codelab { files, command, user_input_file, .. } = &verifier.def.kind else {
        return Err(VerifyError::internal("codelab verify invoked for a non-codelab target"));
    };

    tokio::fs::create_dir_all(workspace)
        .await
        .map_err(|e| VerifyError::internal(format!("failed to create a temporary directory: {e}")))?;
    debug!(target: "verify", workspace = %workspace.display(), "Created codelab workspace");

    for file in files {
        let source = resource_path(verifier, file).await?;
        let destination = workspace.join(file);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VerifyError::internal(format!("failed to prepare workspace for {file}: {e}"))
            })?;
        }
        tokio::fs::copy(&source, &destination)
            .await
            .map_err(|e| VerifyError::internal(format!("failed to copy {file}: {e}")))?;
        debug!(target: "verify", %file, "Copied codelab resource");
    }

    let code = data.get("input").and_then(Value::as_str).unwrap_or("");
    tokio::fs::write(workspace.join(user_input_file), code)
        .await
        .map_err(|e| VerifyError::internal(format!("failed to save submitted code: {e}")))?;

    let spec = ExecSpec {
        command: command.clone(),
        cwd: workspace.to_path_buf(),
        envs: vec![],
        clear_env: false,
        timeout_ms: verifier.def.timeout_ms,
        debug_output: verifier.global.debug,
    };
    let passed = run_sandboxed(&spec).await?;
    Ok(Outcome { passed, ..Outcome::default() })
}

/// Resource files are re-checked at copy time: the author may ship a broken
/// file list, and that is a config fault, not a user fault.
async fn resource_path(verifier: &Verifier, file: &str) -> Result<PathBuf, VerifyError> {
    let path = verifier.global.app_directory.join(file);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(VerifyError::config("specified file in target definition is not found")),
    }
}

async fn cleanup(workspace: &Path) {
    match tokio::fs::remove_dir_all(workspace).await {
        Ok(()) => debug!(target: "verify", workspace = %workspace.display(), "Deleted codelab workspace"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!(target: "verify", workspace = %workspace.display(), error = %e, "Failed to delete codelab workspace"),
    }
}

pub fn validate(raw: &RawTargetDef) -> Result<(String, TargetKind), VerifyError> {
    let name = validate_name(raw)?;
    let Some(command) = raw.command.clone() else {
        return Err(VerifyError::config(
            "target definition must have a String property \"command\"",
        ));
    };
    let Some(user_input_file) = raw.user_input_file.clone() else {
        return Err(VerifyError::config(
            "target definition must have a String property \"userInputFile\"",
        ));
    };
    Ok((
        name,
        TargetKind::Codelab {
            files: raw.files.clone(),
            command,
            user_input_file,
            language: raw.language.clone(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VerifyErrorKind;
    use crate::store::Store;
    use crate::verifier::tests::{global_for_tests, verifier_with_global};
    use serde_json::json;

    struct Lab {
        verifier: Verifier,
        workspace: PathBuf,
        _app_dir: tempfile::TempDir,
        _temp_dir: tempfile::TempDir,
    }

    fn lab(files: Vec<String>, command: &str, timeout_ms: u64) -> Lab {
        let app_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(app_dir.path().join("Makefile"), "all:\n\ttrue\n").unwrap();

        let mut global = global_for_tests();
        global.app_directory = app_dir.path().to_path_buf();
        global.temp_directory = temp_dir.path().to_path_buf();
        let mut verifier = verifier_with_global(
            "codelab1",
            TargetKind::Codelab {
                files,
                command: command.into(),
                user_input_file: "solution.txt".into(),
                language: None,
            },
            0,
            global,
        );
        verifier.def = std::sync::Arc::new(crate::domain::TargetDef {
            timeout_ms,
            ..(*verifier.def).clone()
        });
        let workspace = temp_dir.path().join("temp").join(&verifier.username);
        Lab { verifier, workspace, _app_dir: app_dir, _temp_dir: temp_dir }
    }

    #[tokio::test]
    async fn successful_run_reads_submitted_code_and_cleans_up() {
        let lab = lab(vec!["Makefile".into()], "cat solution.txt", 5_000);
        let store = Store::new();
        let report = lab
            .verifier
            .run(&store, json!({"input": "hello codelab"}))
            .await
            .unwrap();
        assert_eq!(report.passed, vec!["hello codelab".to_string()]);
        assert!(!lab.workspace.exists());
    }

    #[tokio::test]
    async fn user_error_still_cleans_up_and_keeps_partial_output() {
        let lab = lab(vec![], "echo compiled; echo bad input >&2; exit 2", 5_000);
        let store = Store::new();
        let err = lab.verifier.run(&store, json!({"input": ""})).await.unwrap_err();
        assert_eq!(err.kind, VerifyErrorKind::User);
        assert_eq!(err.passed, vec!["compiled".to_string()]);
        assert!(!lab.workspace.exists());
    }

    #[tokio::test]
    async fn timeout_still_cleans_up() {
        let lab = lab(vec![], "sleep 5", 200);
        let store = Store::new();
        let err = lab.verifier.run(&store, json!({"input": ""})).await.unwrap_err();
        assert_eq!(err.kind, VerifyErrorKind::Timeout);
        assert!(!lab.workspace.exists());
    }

    #[tokio::test]
    async fn missing_resource_is_a_config_fault_and_cleans_up() {
        let lab = lab(vec!["no-such-file".into()], "true", 5_000);
        let store = Store::new();
        let err = lab.verifier.run(&store, json!({"input": ""})).await.unwrap_err();
        assert_eq!(err.kind, VerifyErrorKind::Config);
        assert!(!lab.workspace.exists());
    }

    #[test]
    fn validation_requires_command_and_user_input_file() {
        let raw = RawTargetDef {
            name: Some("codelab1".into()),
            target_type: Some("codelab".into()),
            command: Some("make".into()),
            user_input_file: Some("main.c".into()),
            ..RawTargetDef::default()
        };
        assert!(validate(&raw).is_ok());

        let missing_command = RawTargetDef { command: None, ..raw.clone() };
        assert!(validate(&missing_command).is_err());

        let missing_input_file = RawTargetDef { user_input_file: None, ..raw };
        assert!(validate(&missing_input_file).is_err());
    }
}
