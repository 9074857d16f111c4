//! Application state: workshop config, verifier registry, document store,
//! and the outbound service client, shared across handlers via `Arc`.

use tracing::info;

use crate::client::ServiceClient;
use crate::config::{VerifyFeature, WorkshopConfig};
use crate::errors::VerifyError;
use crate::store::Store;
use crate::verifier::VerifierRegistry;

pub struct AppState {
    pub config: WorkshopConfig,
    /// `None` when the workshop disables verification entirely.
    pub registry: Option<VerifierRegistry>,
    pub store: Store,
    pub client: ServiceClient,
}

impl AppState {
    /// Build state from the loaded workshop config. A malformed verify
    /// section is fatal here, before the server starts listening.
    pub fn new(config: WorkshopConfig) -> Result<Self, VerifyError> {
        let registry = match &config.verify {
            VerifyFeature::Enabled(false) => {
                info!(target: "workshop_backend", doc_id = %config.doc_id, "Verification feature disabled");
                None
            }
            feature => {
                let registry =
                    VerifierRegistry::from_config(feature, &config.global, &config.doc_id)?;
                info!(
                    target: "workshop_backend",
                    doc_id = %config.doc_id,
                    targets = registry.targets().len(),
                    "Verification targets registered"
                );
                Some(registry)
            }
        };
        let client = ServiceClient::from_env(&config.doc_id);
        Ok(Self { config, registry, store: Store::new(), client })
    }

    pub fn registry(&self) -> Result<&VerifierRegistry, VerifyError> {
        self.registry.as_ref().ok_or_else(|| {
            VerifyError::factory_init("the verification feature is not enabled for this workshop")
        })
    }

    pub fn is_maintainer(&self, user: &str) -> bool {
        self.config.maintainers.iter().any(|m| m == user)
    }
}
