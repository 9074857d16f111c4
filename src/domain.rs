//! Domain models: target definitions, question banks, and per-user state.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Literal stored as a target's status once its completion condition holds.
pub const STATUS_COMPLETED: &str = "completed";

/// Number of failed quiz attempts on one question after which the correct
/// answer may be revealed (text questions only, when the workshop allows it).
pub const REVEAL_ANSWER_LIMIT: u32 = 3;

/// Workshop-level progress of a single user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Progress {
  #[default]
  NotStarted,
  Started,
  Completed,
}

/// One document per user. `target_status` maps a target name to either the
/// literal `"completed"` or an opaque pending payload owned by the target type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
  pub user: String,
  #[serde(default)]
  pub progress: Progress,
  #[serde(default)]
  pub last_accessed: Option<DateTime<Utc>>,
  #[serde(default)]
  pub last_verified: Option<DateTime<Utc>>,
  #[serde(default)]
  pub rating: Option<u8>,
  #[serde(default)]
  pub target_status: HashMap<String, Value>,
}

/// Aggregated progress view returned by `GET /verify`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
  pub progress: Progress,
  pub targets_completed: HashMap<String, bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rating: Option<u8>,
  /// Set only once the workshop is completed (timestamp of the last verification).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub completion_time: Option<DateTime<Utc>>,
}

/// Declared script input. `name` becomes an environment variable, `desc` is
/// shown to the user when prompting for the value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputDef {
  pub name: String,
  pub desc: String,
}

/// Validated, immutable definition of one verification target.
/// Constructed once by the registry at startup, read-only thereafter.
#[derive(Clone, Debug)]
pub struct TargetDef {
  pub name: String,
  /// Minimum interval between verification attempts, in ms. 0 = unlimited.
  pub retry_limit_ms: u64,
  /// Sandboxed execution budget, in ms.
  pub timeout_ms: u64,
  pub kind: TargetKind,
}

/// Closed union of the five verification strategies.
#[derive(Clone, Debug)]
pub enum TargetKind {
  Confirm,
  Quiz {
    questions: Vec<QuizQuestion>,
    pass_threshold: usize,
  },
  Survey {
    questions: Vec<SurveyQuestion>,
  },
  Script {
    filepath: PathBuf,
    language: Option<String>,
    inputs: Vec<InputDef>,
  },
  Codelab {
    files: Vec<String>,
    command: String,
    user_input_file: String,
    language: Option<String>,
  },
}

impl TargetKind {
  pub fn name(&self) -> &'static str {
    match self {
      TargetKind::Confirm => "confirm",
      TargetKind::Quiz { .. } => "quiz",
      TargetKind::Survey { .. } => "survey",
      TargetKind::Script { .. } => "script",
      TargetKind::Codelab { .. } => "codelab",
    }
  }
}

// ---------------------------------------------------------------------------
// Quiz question bank
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizQuestionType {
  Multiple,
  Text,
}

/// Answer as authored in the bank or submitted by a user. Untagged so a bare
/// number, a number array, or a string all deserialize naturally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuizAnswer {
  Choice(i64),
  Choices(Vec<i64>),
  Text(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizQuestion {
  /// Stable position in the bank, assigned at load time.
  #[serde(default)]
  pub index: usize,
  pub question: String,
  #[serde(rename = "type")]
  pub qtype: QuizQuestionType,
  #[serde(default)]
  pub choices: Vec<String>,
  pub answer: QuizAnswer,
  #[serde(default, rename = "multiAnswer")]
  pub multi_answer: bool,
  #[serde(default, rename = "hideAnswer")]
  pub hide_answer: bool,
}

impl QuizQuestion {
  /// Serialize for delivery to the user, with the answer stripped.
  pub fn stripped(&self) -> Value {
    let mut value = serde_json::to_value(self).unwrap_or_default();
    if let Some(map) = value.as_object_mut() {
      map.remove("answer");
    }
    value
  }
}

// ---------------------------------------------------------------------------
// Survey question bank
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyQuestionType {
  Multiple,
  Checkbox,
  Text,
  Paragraph,
  Linear,
}

fn default_range_start() -> i64 {
  0
}

fn default_range_end() -> i64 {
  10
}

/// Each field falls back independently, so an author writing only
/// `range: {start: 1}` still gets the default upper end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearRange {
  #[serde(default = "default_range_start")]
  pub start: i64,
  #[serde(default = "default_range_end")]
  pub end: i64,
}

impl Default for LinearRange {
  fn default() -> Self {
    Self { start: default_range_start(), end: default_range_end() }
  }
}

fn default_label_left() -> String {
  "Very unlikely".into()
}

fn default_label_right() -> String {
  "Very likely".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearLabels {
  #[serde(default = "default_label_left")]
  pub left: String,
  #[serde(default = "default_label_right")]
  pub right: String,
}

impl Default for LinearLabels {
  fn default() -> Self {
    Self { left: default_label_left(), right: default_label_right() }
  }
}

fn default_page() -> u32 {
  1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurveyQuestion {
  pub id: String,
  pub question: String,
  #[serde(rename = "type")]
  pub qtype: SurveyQuestionType,
  /// Questions are grouped into pages on the UI side.
  #[serde(default = "default_page")]
  pub page: u32,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub choices: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub range: Option<LinearRange>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub labels: Option<LinearLabels>,
}
