//! Confirm target: the trivial terminal type. Any run completes immediately,
//! with no stored pending state. Used as the backward-compatibility default
//! when verification is enabled without explicit targets.

use serde_json::Value;

use crate::config::RawTargetDef;
use crate::domain::TargetKind;
use crate::errors::VerifyError;
use crate::verifier::base::{validate_name, Outcome, Verifier};

pub fn verify(_verifier: &Verifier, _data: &Value) -> Outcome {
    Outcome::default()
}

pub fn validate(raw: &RawTargetDef) -> Result<(String, TargetKind), VerifyError> {
    let name = validate_name(raw)?;
    Ok((name, TargetKind::Confirm))
}
