//! Script target: runs an author-provided script in a sandboxed child process.
//!
//! Environment variables are the only input channel. The merged variable view
//! for the user (user-scope, protected, shared) is combined with any submitted
//! inputs, sanitized, and injected alongside fixed identifiers for the user
//! and temp directory. Stdout lines become the `passed` result.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{GlobalConfig, RawTargetDef};
use crate::domain::TargetKind;
use crate::errors::VerifyError;
use crate::store::Store;
use crate::util::is_valid_env_name;
use crate::verifier::base::{
    resolve_target_file, validate_inputs, validate_name, Outcome, Verifier,
};
use crate::verifier::runner::{run_sandboxed, ExecSpec};

#[derive(Debug, Default, Deserialize)]
struct ScriptData {
    #[serde(default)]
    input: Vec<ScriptInput>,
}

#[derive(Debug, Deserialize)]
struct ScriptInput {
    name: String,
    #[serde(default)]
    value: Value,
}

pub async fn verify(
    verifier: &Verifier,
    store: &Store,
    data: Value,
) -> Result<Outcome, VerifyError> {
    let TargetKind::Script { filepath, language, .. } = &verifier.def.kind else {
        return Err(VerifyError::internal("script verify invoked for a non-script target"));
    };

    // Protected variables are exposed to scripts only, never to users directly.
    let mut variables = store.get_variables(&verifier.user, true).await;

    // Submitted inputs override stored variables of the same name.
    let submitted: ScriptData = serde_json::from_value(data).unwrap_or_default();
    for item in submitted.input {
        variables.insert(item.name, item.value);
    }

    let mut envs = vec![
        ("USER".to_string(), verifier.username.clone()),
        ("PATH_TEMP".to_string(), verifier.global.temp_directory.display().to_string()),
        ("DEBUG".to_string(), verifier.global.debug.to_string()),
    ];
    envs.extend(sanitize_input(variables));

    let interpreter = language.as_deref().unwrap_or("sh");
    let spec = ExecSpec {
        command: format!("{} '{}'", interpreter, filepath.display()),
        cwd: verifier.global.app_directory.clone(),
        envs,
        clear_env: true,
        timeout_ms: verifier.def.timeout_ms,
        debug_output: verifier.global.debug,
    };
    let passed = run_sandboxed(&spec).await?;
    Ok(Outcome { passed, ..Outcome::default() })
}

/// Drop entries whose name is not a valid environment variable identifier and
/// stringify non-string values (objects via JSON serialization).
fn sanitize_input(variables: Map<String, Value>) -> Vec<(String, String)> {
    variables
        .into_iter()
        .filter(|(name, _)| is_valid_env_name(name))
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect()
}

pub fn validate(
    raw: &RawTargetDef,
    global: &GlobalConfig,
) -> Result<(String, TargetKind), VerifyError> {
    let name = validate_name(raw)?;
    let filepath = resolve_target_file(global, raw.file.as_deref())?;
    let inputs = validate_inputs(raw.input.as_ref())?;
    Ok((name, TargetKind::Script { filepath, language: raw.language.clone(), inputs }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::tests::{global_for_tests, verifier_with_global};
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn sanitize_drops_bad_names_and_stringifies_values() {
        let mut vars = Map::new();
        vars.insert("GOOD".into(), json!("plain"));
        vars.insert("NUM".into(), json!(7));
        vars.insert("OBJ".into(), json!({"x": 1}));
        vars.insert("bad-name".into(), json!("dropped"));
        vars.insert("2bad".into(), json!("dropped"));

        let mut sanitized = sanitize_input(vars);
        sanitized.sort();
        assert_eq!(
            sanitized,
            vec![
                ("GOOD".to_string(), "plain".to_string()),
                ("NUM".to_string(), "7".to_string()),
                ("OBJ".to_string(), "{\"x\":1}".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn script_sees_merged_variables_and_submitted_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("verify.sh");
        let mut file = std::fs::File::create(&script_path).unwrap();
        file.write_all(b"echo \"A=$A\"\necho \"B=$B\"\necho \"USER=$USER\"\n").unwrap();

        let store = Store::new();
        store
            .update_variables("u@example.com", [("A".to_string(), json!(1))].into_iter().collect())
            .await;
        store
            .update_variables(crate::store::SCOPE_SHARED, [("A".to_string(), json!(3))].into_iter().collect())
            .await;

        let mut global = global_for_tests();
        global.app_directory = dir.path().to_path_buf();
        let verifier = verifier_with_global(
            "script1",
            TargetKind::Script { filepath: script_path, language: None, inputs: vec![] },
            0,
            global,
        );

        let data = json!({"input": [{"name": "B", "value": {"x": 1}}]});
        let report = verifier.run(&store, data).await.unwrap();
        assert!(report.passed.contains(&"A=3".to_string()));
        assert!(report.passed.contains(&"B={\"x\":1}".to_string()));
        assert!(report.passed.contains(&"USER=u".to_string()));
        assert!(report.is_final);
    }

    #[tokio::test]
    async fn failing_script_carries_partial_passed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("verify.sh");
        let mut file = std::fs::File::create(&script_path).unwrap();
        file.write_all(b"echo step one done\necho missing resource >&2\nexit 1\n").unwrap();

        let store = Store::new();
        let mut global = global_for_tests();
        global.app_directory = dir.path().to_path_buf();
        let verifier = verifier_with_global(
            "script1",
            TargetKind::Script { filepath: script_path, language: None, inputs: vec![] },
            0,
            global,
        );

        let err = verifier.run(&store, json!({})).await.unwrap_err();
        assert_eq!(err.kind, crate::errors::VerifyErrorKind::User);
        assert_eq!(err.message, "missing resource");
        assert_eq!(err.passed, vec!["step one done".to_string()]);
    }
}
