//! Survey target: stateless pass-through with no correctness concept.
//!
//! The first call (no submitted data) hands the full question set back as the
//! pending status; the next call with answers completes the target and keeps
//! the raw submission as result data.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{GlobalConfig, RawTargetDef};
use crate::domain::{SurveyQuestion, SurveyQuestionType, TargetKind};
use crate::errors::VerifyError;
use crate::verifier::base::{resolve_target_file, validate_name, Outcome, Verifier};

pub fn verify(verifier: &Verifier, data: Value) -> Outcome {
    let TargetKind::Survey { questions } = &verifier.def.kind else {
        return Outcome::default();
    };

    let is_submission = match &data {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    };
    if is_submission {
        return Outcome { data: Some(data), ..Outcome::default() };
    }

    let pending = json!({
        "type": "survey",
        "questions": questions,
    });
    Outcome { pending: Some(pending), ..Outcome::default() }
}

// ---------------------------------------------------------------------------
// Config validation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SurveyBank {
    questions: Vec<SurveyQuestion>,
}

pub fn validate(
    raw: &RawTargetDef,
    global: &GlobalConfig,
) -> Result<(String, TargetKind), VerifyError> {
    let name = validate_name(raw)?;
    let filepath = resolve_target_file(global, raw.file.as_deref())?;
    let raw_bank = std::fs::read_to_string(&filepath)
        .map_err(|e| VerifyError::config(format!("failed to read survey description: {e}")))?;
    let bank: SurveyBank = serde_yaml::from_str(&raw_bank)
        .map_err(|e| VerifyError::config(format!("failed to parse survey description: {e}")))?;

    let mut questions = bank.questions;
    let mut ids = std::collections::HashSet::new();
    for question in &mut questions {
        validate_question(question)?;
        if !ids.insert(question.id.clone()) {
            return Err(VerifyError::config(
                "A question item must contain an unique String property \"id\"",
            ));
        }
    }

    Ok((name, TargetKind::Survey { questions }))
}

fn validate_question(question: &mut SurveyQuestion) -> Result<(), VerifyError> {
    match question.qtype {
        SurveyQuestionType::Multiple | SurveyQuestionType::Checkbox => {
            let has_choices = question.choices.as_ref().is_some_and(|c| !c.is_empty());
            if !has_choices {
                return Err(VerifyError::config(format!(
                    "A question item of \"{}\" type must contain an Array property \"choices\"",
                    match question.qtype {
                        SurveyQuestionType::Multiple => "multiple",
                        _ => "checkbox",
                    }
                )));
            }
        }
        SurveyQuestionType::Text | SurveyQuestionType::Paragraph => {}
        SurveyQuestionType::Linear => {
            // Linear scales always carry a range and labels once validated.
            question.range.get_or_insert_with(Default::default);
            question.labels.get_or_insert_with(Default::default);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::verifier::tests::{global_for_tests, verifier_with_global};
    use serde_json::json;
    use std::io::Write;

    fn survey_verifier() -> Verifier {
        let questions = vec![SurveyQuestion {
            id: "nps".into(),
            question: "How likely are you to recommend this workshop?".into(),
            qtype: SurveyQuestionType::Linear,
            page: 1,
            required: true,
            choices: None,
            range: Some(Default::default()),
            labels: Some(Default::default()),
        }];
        verifier_with_global(
            "survey1",
            TargetKind::Survey { questions },
            0,
            global_for_tests(),
        )
    }

    #[tokio::test]
    async fn first_call_returns_questions_second_completes() {
        let store = Store::new();
        let verifier = survey_verifier();

        let report = verifier.run(&store, json!({})).await.unwrap();
        let pending = report.pending.expect("pending");
        assert_eq!(pending["type"], json!("survey"));
        assert_eq!(pending["questions"][0]["id"], json!("nps"));
        assert!(!report.is_final);

        let answers = json!({"nps": 9});
        let report = verifier.run(&store, answers.clone()).await.unwrap();
        assert!(report.pending.is_none());
        assert_eq!(report.data, Some(answers));
        assert!(report.is_final);
    }

    fn validate_bank(yaml: &str) -> Result<(String, TargetKind), VerifyError> {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("survey.yml")).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        let mut global = global_for_tests();
        global.app_directory = dir.path().to_path_buf();
        let raw = RawTargetDef {
            name: Some("survey1".into()),
            target_type: Some("survey".into()),
            file: Some("survey.yml".into()),
            ..RawTargetDef::default()
        };
        validate(&raw, &global)
    }

    #[test]
    fn linear_questions_get_default_range_and_labels() {
        let (_, kind) = validate_bank(
            "questions:\n\
             - id: nps\n\
             \x20 question: Recommend?\n\
             \x20 type: linear\n",
        )
        .unwrap();
        let TargetKind::Survey { questions } = kind else { panic!("expected survey") };
        let range = questions[0].range.as_ref().unwrap();
        assert_eq!((range.start, range.end), (0, 10));
        let labels = questions[0].labels.as_ref().unwrap();
        assert_eq!(labels.left, "Very unlikely");
        assert_eq!(labels.right, "Very likely");
        assert_eq!(questions[0].page, 1);
    }

    #[test]
    fn partial_range_and_labels_fall_back_per_field() {
        let (_, kind) = validate_bank(
            "questions:\n\
             - id: nps\n\
             \x20 question: Recommend?\n\
             \x20 type: linear\n\
             \x20 range:\n\
             \x20   start: 1\n\
             \x20 labels:\n\
             \x20   left: Never\n",
        )
        .unwrap();
        let TargetKind::Survey { questions } = kind else { panic!("expected survey") };
        let range = questions[0].range.as_ref().unwrap();
        assert_eq!((range.start, range.end), (1, 10));
        let labels = questions[0].labels.as_ref().unwrap();
        assert_eq!(labels.left, "Never");
        assert_eq!(labels.right, "Very likely");
    }

    #[test]
    fn duplicate_ids_and_missing_choices_are_config_errors() {
        let dup = validate_bank(
            "questions:\n\
             - id: q\n\
             \x20 question: one\n\
             \x20 type: text\n\
             - id: q\n\
             \x20 question: two\n\
             \x20 type: paragraph\n",
        );
        assert!(dup.is_err());

        let missing = validate_bank(
            "questions:\n\
             - id: q\n\
             \x20 question: pick\n\
             \x20 type: checkbox\n",
        );
        assert!(missing.is_err());
    }
}
