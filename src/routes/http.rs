//! HTTP endpoint handlers. Thin wrappers over the registry, store, and client.
//!
//! User identity arrives pre-parsed in the `x-workshop-user` header (the auth
//! proxy upstream validates the JWT); a missing header is a 401. Verification
//! failures are not HTTP failures: they come back 200 with an `{error}` body
//! so the frontend can render the message and any partial `passed` output.

use std::sync::Arc;
use axum::{
  extract::State,
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::errors::{Severity, VerifyError, VerifyErrorKind};
use crate::protocol::*;
use crate::state::AppState;
use crate::store::{SCOPE_PROTECTED, SCOPE_SHARED};
use crate::verifier::RunReport;

const USER_HEADER: &str = "x-workshop-user";

fn identify(headers: &HeaderMap) -> Result<String, Response> {
  match headers.get(USER_HEADER).and_then(|v| v.to_str().ok()).filter(|u| !u.is_empty()) {
    Some(user) => Ok(user.to_string()),
    None => Err(
      (
        StatusCode::UNAUTHORIZED,
        Json(ErrorOut { error: ErrorBody { message: "Not Authenticated".into(), passed: None } }),
      )
        .into_response(),
    ),
  }
}

fn error_out(err: &VerifyError) -> Response {
  Json(ErrorOut { error: ErrorBody::from(err) }).into_response()
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip_all, fields(target = %body.target))]
pub async fn http_post_verify(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<VerifyIn>,
) -> Response {
  let user = match identify(&headers) {
    Ok(user) => user,
    Err(resp) => return resp,
  };
  match run_verify(&state, &user, body).await {
    Ok(report) => Json(DataOut { data: report }).into_response(),
    Err(err) => {
      if err.kind == VerifyErrorKind::User {
        info!(
          target: "verify",
          doc_id = %state.config.doc_id,
          title = %state.config.title,
          %user,
          event = "Verify",
          status = "Failed",
          "Verify Status Updated"
        );
      } else if err.severity() == Severity::Warning {
        warn!(target: "verify", %user, api = "/api/v1/verify", error = %err, "verification rejected");
      } else {
        error!(target: "verify", %user, api = "/api/v1/verify", error = %err, "verification failed");
      }
      error_out(&err)
    }
  }
}

async fn run_verify(
  state: &AppState,
  user: &str,
  body: VerifyIn,
) -> Result<RunReport, VerifyError> {
  let verifier = state.registry()?.create(user, &body.target)?;
  let report = verifier.run(&state.store, body.data).await?;
  if report.is_final {
    // The run already succeeded; a broken progress service must not turn
    // a completed workshop into an error response.
    if let Err(err) = state.client.set_user_progress_completed(user).await {
      error!(target: "workshop_backend", %user, error = %err, "failed to report workshop completion");
    }
    info!(
      target: "verify",
      doc_id = %state.config.doc_id,
      title = %state.config.title,
      %user,
      event = "Verify",
      status = "Completed",
      "Verify Status Updated"
    );
  }
  Ok(report)
}

#[instrument(level = "info", skip_all)]
pub async fn http_get_verify(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> Response {
  let user = match identify(&headers) {
    Ok(user) => user,
    Err(resp) => return resp,
  };
  state.store.update_last_accessed(&user).await;
  let progress = state.store.get_user_progress(&user).await;
  Json(DataOut { data: progress }).into_response()
}

#[instrument(level = "info", skip_all)]
pub async fn http_delete_verify(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> Response {
  let user = match identify(&headers) {
    Ok(user) => user,
    Err(resp) => return resp,
  };
  state.store.reset_progress(&user).await;
  if let Err(err) = state.client.set_user_progress_attempted(&user).await {
    error!(target: "workshop_backend", %user, error = %err, "failed to report workshop restart");
  }
  info!(
    target: "verify",
    doc_id = %state.config.doc_id,
    title = %state.config.title,
    %user,
    event = "Verify",
    status = "Started",
    "Verify Status Updated"
  );
  Json(DataOut { data: "successful" }).into_response()
}

#[instrument(level = "info", skip_all, fields(rating = body.rating))]
pub async fn http_post_rating(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<RatingIn>,
) -> Response {
  let user = match identify(&headers) {
    Ok(user) => user,
    Err(resp) => return resp,
  };
  if body.rating > 10 {
    return error_out(&VerifyError::user("rating must be between 0 and 10"));
  }
  // Upsert the user document first so a rating before any verification sticks.
  state.store.update_last_accessed(&user).await;
  if let Err(err) = state.store.update_rating(&user, body.rating).await {
    let err = VerifyError::from(err);
    error!(target: "workshop_backend", %user, error = %err, "failed to store rating");
    return error_out(&err);
  }
  info!(
    target: "verify",
    doc_id = %state.config.doc_id,
    title = %state.config.title,
    %user,
    event = "Rating",
    rating = body.rating,
    feedback = body.feedback.as_deref().unwrap_or(""),
    more = %body.more.clone().unwrap_or(serde_json::Value::Null),
    "Rating Submitted"
  );

  if state.client.has_catalog() {
    let average = state.store.average_rating().await;
    match state.client.set_catalog_rating(average).await {
      Ok(()) => {
        info!(target: "workshop_backend", doc_id = %state.config.doc_id, %average, "Updated catalog rating");
      }
      Err(err) => {
        error!(target: "workshop_backend", error = %err, "failed to update catalog rating");
        return error_out(&err);
      }
    }
  }
  Json(DataOut { data: "successfully updated" }).into_response()
}

#[instrument(level = "info", skip_all)]
pub async fn http_put_variable_protected(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(variables): Json<Map<String, Value>>,
) -> Response {
  put_scoped_variables(&state, &headers, SCOPE_PROTECTED, variables).await
}

#[instrument(level = "info", skip_all)]
pub async fn http_put_variable_shared(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(variables): Json<Map<String, Value>>,
) -> Response {
  put_scoped_variables(&state, &headers, SCOPE_SHARED, variables).await
}

/// Protected/shared scopes are maintainer-only; the user scope is open.
async fn put_scoped_variables(
  state: &AppState,
  headers: &HeaderMap,
  scope: &str,
  variables: Map<String, Value>,
) -> Response {
  let user = match identify(headers) {
    Ok(user) => user,
    Err(resp) => return resp,
  };
  if !state.is_maintainer(&user) {
    return (
      StatusCode::FORBIDDEN,
      Json(ErrorOut { error: ErrorBody { message: "Not Authorized".into(), passed: None } }),
    )
      .into_response();
  }
  state.store.update_variables(scope, variables.clone()).await;
  info!(target: "workshop_backend", %user, %scope, count = variables.len(), "Updated scoped variables");
  Json(variables).into_response()
}

#[instrument(level = "info", skip_all)]
pub async fn http_put_variable_user(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(variables): Json<Map<String, Value>>,
) -> Response {
  let user = match identify(&headers) {
    Ok(user) => user,
    Err(resp) => return resp,
  };
  state.store.update_variables(&user, variables.clone()).await;
  Json(variables).into_response()
}

#[instrument(level = "info", skip_all)]
pub async fn http_get_variable(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> Response {
  let user = match identify(&headers) {
    Ok(user) => user,
    Err(resp) => return resp,
  };
  // Maintainers see protected values merged in; regular users never do.
  let merged = state.store.get_variables(&user, state.is_maintainer(&user)).await;
  Json(merged).into_response()
}
