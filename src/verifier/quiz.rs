//! Quiz target: graded multiple-choice/text questions loaded from a YAML bank.
//!
//! Each submission is checked against the authored answer. Solved questions
//! accumulate in the pending status until `passThreshold` of them are correct,
//! at which point the target completes. Repeated failures on a text question
//! can reveal the correct answer (see `REVEAL_ANSWER_LIMIT`); the reveal is
//! single-use and cleared from the stored status on the next evaluation.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{GlobalConfig, RawTargetDef};
use crate::domain::{
    QuizAnswer, QuizQuestion, QuizQuestionType, TargetKind, REVEAL_ANSWER_LIMIT,
};
use crate::errors::VerifyError;
use crate::store::Store;
use crate::verifier::base::{resolve_target_file, validate_name, Outcome, Verifier};

/// Per-user quiz progress, persisted opaquely as the target's pending status.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizStatus {
    #[serde(rename = "type")]
    type_name: String,
    name: String,
    pass_threshold: usize,
    #[serde(default)]
    solved: Vec<usize>,
    /// Failure counter per question index (stringified for JSON object keys).
    #[serde(default)]
    failed_count: HashMap<String, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    passed: Option<bool>,
    /// Next question to present, answer stripped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    question: Option<Value>,
    /// Revealed answer, present for one response only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correct_answer: Option<QuizAnswer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizSubmission {
    question_index: usize,
    answer: QuizAnswer,
}

pub async fn verify(
    verifier: &Verifier,
    store: &Store,
    data: Value,
) -> Result<Outcome, VerifyError> {
    let TargetKind::Quiz { questions, pass_threshold } = &verifier.def.kind else {
        return Err(VerifyError::internal("quiz verify invoked for a non-quiz target"));
    };

    let mut status = load_status(verifier, store, questions, *pass_threshold).await;
    // Any previously revealed answer is single-use.
    status.correct_answer = None;

    if !is_empty_data(&data) {
        let submission: QuizSubmission = serde_json::from_value(data).map_err(|_| {
            VerifyError::user("quiz submission must contain \"questionIndex\" and \"answer\"")
        })?;
        let question = questions.get(submission.question_index).ok_or_else(|| {
            VerifyError::user(format!("there is no question {}", submission.question_index))
        })?;

        let (passed, correct_answer) = check_question(question, &submission.answer);
        status.passed = Some(passed);
        if passed {
            if !status.solved.contains(&question.index) {
                status.solved.push(question.index);
            }
        } else {
            let count = status.failed_count.entry(question.index.to_string()).or_insert(0);
            *count += 1;
            let exceeded_reveal_limit = *count >= REVEAL_ANSWER_LIMIT;
            if verifier.global.display_answer && exceeded_reveal_limit {
                status.correct_answer = correct_answer;
            }
        }
    }

    if status.solved.len() >= *pass_threshold {
        return Ok(Outcome::default());
    }

    status.question = Some(next_question(questions, &status.solved));
    let pending = serde_json::to_value(&status)
        .map_err(|e| VerifyError::internal(format!("failed to serialize quiz status: {e}")))?;
    Ok(Outcome { pending: Some(pending), ..Outcome::default() })
}

async fn load_status(
    verifier: &Verifier,
    store: &Store,
    questions: &[QuizQuestion],
    pass_threshold: usize,
) -> QuizStatus {
    let stored = verifier.target_status(store).await;
    if let Ok(status) = serde_json::from_value::<QuizStatus>(stored.clone()) {
        return status;
    }
    QuizStatus {
        type_name: verifier.def.kind.name().into(),
        name: verifier.def.name.clone(),
        pass_threshold,
        solved: vec![],
        failed_count: questions.iter().map(|q| (q.index.to_string(), 0)).collect(),
        passed: None,
        question: None,
        correct_answer: None,
    }
}

/// Check one submission. Returns the pass flag and, for text questions that
/// allow it, the answer eligible for reveal.
fn check_question(question: &QuizQuestion, answer: &QuizAnswer) -> (bool, Option<QuizAnswer>) {
    let passed = match (&question.answer, answer) {
        // Multiple-answer: pass iff the symmetric set difference is empty.
        (QuizAnswer::Choices(correct), QuizAnswer::Choices(submitted))
            if question.multi_answer =>
        {
            let correct: HashSet<i64> = correct.iter().copied().collect();
            let submitted: HashSet<i64> = submitted.iter().copied().collect();
            correct == submitted
        }
        (correct, submitted) => correct == submitted,
    };

    let reveal = if question.qtype == QuizQuestionType::Text && !question.hide_answer && !passed {
        Some(question.answer.clone())
    } else {
        None
    };
    (passed, reveal)
}

/// Uniform random pick among unsolved questions, answer stripped.
/// Repeats across calls are acceptable; `solved` is the only exclusion.
fn next_question(questions: &[QuizQuestion], solved: &[usize]) -> Value {
    let unsolved: Vec<&QuizQuestion> =
        questions.iter().filter(|q| !solved.contains(&q.index)).collect();
    let pick = rand::thread_rng().gen_range(0..unsolved.len());
    unsolved[pick].stripped()
}

fn is_empty_data(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Config validation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizBank {
    questions: Vec<QuizQuestion>,
    #[serde(default)]
    pass_threshold: Option<usize>,
}

pub fn validate(
    raw: &RawTargetDef,
    global: &GlobalConfig,
) -> Result<(String, TargetKind), VerifyError> {
    let name = validate_name(raw)?;
    let filepath = resolve_target_file(global, raw.file.as_deref())?;
    let raw_bank = std::fs::read_to_string(&filepath)
        .map_err(|e| VerifyError::config(format!("failed to read quiz description: {e}")))?;
    let bank: QuizBank = serde_yaml::from_str(&raw_bank)
        .map_err(|e| VerifyError::config(format!("failed to parse quiz description: {e}")))?;

    let mut questions = bank.questions;
    if questions.is_empty() {
        return Err(VerifyError::config(
            "Quiz description must contain a non-empty Array property \"questions\"",
        ));
    }
    for (index, question) in questions.iter_mut().enumerate() {
        question.index = index;
        validate_question(question)?;
    }

    let pass_threshold = bank.pass_threshold.unwrap_or(questions.len());
    if pass_threshold == 0 || pass_threshold > questions.len() {
        return Err(VerifyError::config(format!(
            "Property \"passThreshold\" must be a value between 0 and {}",
            questions.len()
        )));
    }

    Ok((name, TargetKind::Quiz { questions, pass_threshold }))
}

fn validate_question(question: &mut QuizQuestion) -> Result<(), VerifyError> {
    match question.qtype {
        QuizQuestionType::Multiple => {
            if question.choices.is_empty() {
                return Err(VerifyError::config(
                    "A question item of \"multiple\" type must contain an Array property \"choices\"",
                ));
            }
            let choices = question.choices.len() as i64;
            match &mut question.answer {
                QuizAnswer::Choice(answer) => {
                    if *answer < 0 || *answer >= choices {
                        return Err(VerifyError::config(format!(
                            "Property \"answer\" must be a value between 0 and {}",
                            choices - 1
                        )));
                    }
                }
                QuizAnswer::Choices(answers) => {
                    if answers.iter().any(|a| *a < 0 || *a >= choices) {
                        return Err(VerifyError::config(format!(
                            "Items within \"answer\" must be a value between 0 and {}",
                            choices - 1
                        )));
                    }
                    // Deduplicate while preserving author order.
                    let mut seen = HashSet::new();
                    answers.retain(|a| seen.insert(*a));
                    question.multi_answer = true;
                }
                QuizAnswer::Text(_) => {
                    return Err(VerifyError::config(
                        "\"answer\" property within a question item must be either a Number or an Array",
                    ));
                }
            }
        }
        QuizQuestionType::Text => {
            if !matches!(question.answer, QuizAnswer::Text(_)) {
                return Err(VerifyError::config(
                    "\"answer\" property of a question item of type \"text\" must be a String",
                ));
            }
        }
    }
    Ok(())
}
