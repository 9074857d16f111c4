//! Public request/response DTOs for the HTTP API (serde ready).
//!
//! Every response is either `{ "data": ... }` or `{ "error": {...} }`; the
//! frontend switches on which key is present. Wire names stay camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::VerifyError;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct DataOut<T: Serialize> {
    pub data: T,
}

/// Failure envelope. Verification failures never surface as HTTP errors;
/// the body carries the message (and partial output when there is any).
#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<Vec<String>>,
}

impl From<&VerifyError> for ErrorBody {
    fn from(err: &VerifyError) -> Self {
        ErrorBody {
            message: err.message.clone(),
            passed: if err.passed.is_empty() { None } else { Some(err.passed.clone()) },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyIn {
    pub target: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct RatingIn {
    pub rating: u8,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub more: Option<Value>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
