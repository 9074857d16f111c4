//! Document store: per-user progress state and scoped variable bags.
//!
//! Documents live in in-memory maps behind tokio `RwLock`s, addressed by user
//! (user state) or scope (variables), so contention is naturally partitioned.
//! Per-user updates are deliberately last-write-wins: two concurrent
//! verification requests for the same user can race, and that weak-consistency
//! tradeoff is documented behavior for single-user-driven usage.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{Progress, UserProgress, UserState, STATUS_COMPLETED};
use crate::errors::StoreError;

/// Variable scope shared across every user.
pub const SCOPE_SHARED: &str = "shared";
/// Variable scope visible only to maintainers and script verification.
pub const SCOPE_PROTECTED: &str = "protected";

#[derive(Clone, Default)]
pub struct Store {
    users: Arc<RwLock<HashMap<String, UserState>>>,
    variables: Arc<RwLock<HashMap<String, Map<String, Value>>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_user_state(&self, user: &str) -> Option<UserState> {
        self.users.read().await.get(user).cloned()
    }

    /// Stamp the login/access time, creating the document if needed.
    pub async fn update_last_accessed(&self, user: &str) {
        let mut users = self.users.write().await;
        let state = users.entry(user.to_string()).or_insert_with(|| UserState {
            user: user.to_string(),
            progress: Progress::Started,
            ..UserState::default()
        });
        state.last_accessed = Some(Utc::now());
    }

    /// Stamp the verification attempt time, creating the document if needed.
    pub async fn update_last_verified(&self, user: &str, at: DateTime<Utc>) {
        let mut users = self.users.write().await;
        let state = users.entry(user.to_string()).or_insert_with(|| UserState {
            user: user.to_string(),
            progress: Progress::Started,
            ..UserState::default()
        });
        state.last_verified = Some(at);
    }

    pub async fn update_progress(&self, user: &str, progress: Progress) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let state = users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(format!("user = {user}")))?;
        state.progress = progress;
        Ok(())
    }

    pub async fn update_target_status(
        &self,
        user: &str,
        target: &str,
        status: Value,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let state = users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(format!("user = {user}")))?;
        state.target_status.insert(target.to_string(), status);
        Ok(())
    }

    pub async fn update_rating(&self, user: &str, rating: u8) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let state = users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(format!("user = {user}")))?;
        state.rating = Some(rating);
        Ok(())
    }

    /// Restart the workshop: progress back to started, all target status gone.
    /// Upserts so a reset before any verification still succeeds.
    pub async fn reset_progress(&self, user: &str) {
        let mut users = self.users.write().await;
        let state = users.entry(user.to_string()).or_insert_with(|| UserState {
            user: user.to_string(),
            ..UserState::default()
        });
        state.progress = Progress::Started;
        state.target_status.clear();
        debug!(target: "workshop_backend", %user, "Reset workshop progress");
    }

    pub async fn average_rating(&self) -> f64 {
        let users = self.users.read().await;
        let ratings: Vec<u8> = users.values().filter_map(|s| s.rating).collect();
        if ratings.is_empty() {
            return 0.0;
        }
        ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64
    }

    /// Aggregated progress: which targets hold the `"completed"` literal,
    /// plus rating and (when finished) the completion timestamp.
    pub async fn get_user_progress(&self, user: &str) -> UserProgress {
        let users = self.users.read().await;
        let state = users.get(user).cloned().unwrap_or_default();
        let targets_completed: HashMap<String, bool> = state
            .target_status
            .iter()
            .filter(|(_, status)| status.as_str() == Some(STATUS_COMPLETED))
            .map(|(name, _)| (name.clone(), true))
            .collect();
        let completion_time = if state.progress == Progress::Completed {
            state.last_verified
        } else {
            None
        };
        UserProgress {
            progress: state.progress,
            targets_completed,
            rating: state.rating,
            completion_time,
        }
    }

    /// Replace the variable bag for a scope (a user id, `"shared"`, or
    /// `"protected"`). Upserts.
    pub async fn update_variables(&self, scope: &str, variables: Map<String, Value>) {
        self.variables.write().await.insert(scope.to_string(), variables);
    }

    /// Merged view for a reading user. Shared always wins, protected (when
    /// included) overrides user-scope values.
    pub async fn get_variables(&self, user: &str, include_protected: bool) -> Map<String, Value> {
        let variables = self.variables.read().await;
        let mut merged = Map::new();
        if let Some(user_vars) = variables.get(user) {
            merged.extend(user_vars.clone());
        }
        if include_protected {
            if let Some(protected) = variables.get(SCOPE_PROTECTED) {
                merged.extend(protected.clone());
            }
        }
        if let Some(shared) = variables.get(SCOPE_SHARED) {
            merged.extend(shared.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, i64)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
    }

    #[tokio::test]
    async fn variable_resolution_precedence() {
        let store = Store::new();
        store.update_variables("ada@example.com", vars(&[("a", 1)])).await;
        store.update_variables(SCOPE_PROTECTED, vars(&[("a", 2), ("b", 2)])).await;
        store.update_variables(SCOPE_SHARED, vars(&[("a", 3)])).await;

        let merged = store.get_variables("ada@example.com", true).await;
        assert_eq!(merged.get("a"), Some(&json!(3)));
        assert_eq!(merged.get("b"), Some(&json!(2)));

        let without_protected = store.get_variables("ada@example.com", false).await;
        assert_eq!(without_protected.get("a"), Some(&json!(3)));
        assert!(without_protected.get("b").is_none());
    }

    #[tokio::test]
    async fn update_without_document_is_not_found() {
        let store = Store::new();
        let err = store.update_progress("ghost@example.com", Progress::Completed).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
        let err = store.update_target_status("ghost@example.com", "t", json!("completed")).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn reset_clears_target_status_and_restarts() {
        let store = Store::new();
        store.update_last_verified("u@example.com", Utc::now()).await;
        store
            .update_target_status("u@example.com", "quiz1", json!(STATUS_COMPLETED))
            .await
            .unwrap();
        store.update_progress("u@example.com", Progress::Completed).await.unwrap();

        store.reset_progress("u@example.com").await;
        let progress = store.get_user_progress("u@example.com").await;
        assert_eq!(progress.progress, Progress::Started);
        assert!(progress.targets_completed.is_empty());
    }

    #[tokio::test]
    async fn completion_time_only_when_completed() {
        let store = Store::new();
        store.update_last_verified("u@example.com", Utc::now()).await;
        let progress = store.get_user_progress("u@example.com").await;
        assert!(progress.completion_time.is_none());

        store.update_progress("u@example.com", Progress::Completed).await.unwrap();
        let progress = store.get_user_progress("u@example.com").await;
        assert!(progress.completion_time.is_some());
    }

    #[tokio::test]
    async fn concurrent_target_updates_are_last_write_wins() {
        let store = Store::new();
        store.update_last_accessed("u@example.com").await;

        let left = store.clone();
        let right = store.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move {
                left.update_target_status("u@example.com", "quiz1", json!({"solved": [0]})).await
            }),
            tokio::spawn(async move {
                right.update_target_status("u@example.com", "quiz1", json!({"solved": [1]})).await
            }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        // No transactional isolation: whichever write lands last wins, and
        // the document holds exactly one of the two payloads.
        let state = store.get_user_state("u@example.com").await.unwrap();
        let status = state.target_status.get("quiz1").unwrap();
        assert!(
            *status == json!({"solved": [0]}) || *status == json!({"solved": [1]}),
            "unexpected merged status: {status}"
        );
    }

    #[tokio::test]
    async fn average_rating_over_rated_users() {
        let store = Store::new();
        assert_eq!(store.average_rating().await, 0.0);
        store.update_last_accessed("a@x.com").await;
        store.update_last_accessed("b@x.com").await;
        store.update_last_accessed("c@x.com").await;
        store.update_rating("a@x.com", 10).await.unwrap();
        store.update_rating("b@x.com", 5).await.unwrap();
        assert!((store.average_rating().await - 7.5).abs() < f64::EPSILON);
    }
}
