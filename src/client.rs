//! Outbound calls to the external progress and catalog services.
//!
//! Both service URLs come from env (SERVICE_PROGRESS, SERVICE_CATALOG); when a
//! URL is unset the corresponding calls are silent no-ops so a standalone
//! workshop needs no external infrastructure. The services sit behind internal
//! load balancers with self-signed certificates, hence the relaxed TLS.

use serde_json::{json, Value};
use tracing::debug;

use crate::errors::VerifyError;

#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    progress_url: Option<String>,
    catalog_url: Option<String>,
    doc_id: String,
}

impl ServiceClient {
    pub fn from_env(doc_id: &str) -> Self {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_default();
        Self {
            http,
            progress_url: std::env::var("SERVICE_PROGRESS").ok().filter(|u| !u.is_empty()),
            catalog_url: std::env::var("SERVICE_CATALOG").ok().filter(|u| !u.is_empty()),
            doc_id: doc_id.to_string(),
        }
    }

    /// Mark the workshop "attempted" for a user (fresh start or reset).
    pub async fn set_user_progress_attempted(&self, user: &str) -> Result<(), VerifyError> {
        self.set_user_progress(user, "attempted").await
    }

    /// Mark the workshop "completed" for a user.
    pub async fn set_user_progress_completed(&self, user: &str) -> Result<(), VerifyError> {
        self.set_user_progress(user, "completed").await
    }

    async fn set_user_progress(&self, user: &str, progress: &str) -> Result<(), VerifyError> {
        let Some(base) = &self.progress_url else {
            return Ok(());
        };
        // The progress service rejects updates for unknown users, so the
        // document is created first when absent.
        if self.get_user_progress(base, user).await?.is_none() {
            self.create_user_progress(base, user).await?;
        }
        let url = format!("{base}/{user}/{progress}");
        debug!(target: "workshop_backend", %url, "Send progress update request");
        self.http
            .put(&url)
            .json(&json!({ "docId": self.doc_id }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::http(format!("PUT request to {url} failed: {e}")))?;
        Ok(())
    }

    async fn get_user_progress(&self, base: &str, user: &str) -> Result<Option<Value>, VerifyError> {
        let url = format!("{base}/{user}");
        let body: Value = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::http(format!("GET request to {url} failed: {e}")))?
            .json()
            .await
            .map_err(|e| VerifyError::http(format!("GET request to {url} failed: {e}")))?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let is_empty = match &data {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        Ok(if is_empty { None } else { Some(data) })
    }

    async fn create_user_progress(&self, base: &str, user: &str) -> Result<(), VerifyError> {
        self.http
            .post(base)
            .json(&json!({ "_id": user }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::http(format!("POST request to {base} failed: {e}")))?;
        debug!(target: "workshop_backend", %user, "Created user progress document");
        Ok(())
    }

    /// Push the workshop's average rating to the catalog entry.
    pub async fn set_catalog_rating(&self, rating: f64) -> Result<(), VerifyError> {
        let Some(base) = &self.catalog_url else {
            return Ok(());
        };
        let url = format!("{base}/{}", self.doc_id);
        debug!(target: "workshop_backend", %url, "Send rating update request");
        self.http
            .put(&url)
            .json(&json!({ "rating": rating }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::http(format!("PUT request to {url} failed: {e}")))?;
        Ok(())
    }

    pub fn has_catalog(&self) -> bool {
        self.catalog_url.is_some()
    }
}
