//! Process-wide context
//!
//! Built once by the caller and passed by reference to every operation that
//! talks to the provider or needs a family capability. Cloning is cheap.

use std::sync::Arc;

use crate::config::WalkerConfig;
use crate::families::FamilyRegistry;
use crate::provider::AccountStateProvider;

#[derive(Clone)]
pub struct WalkerContext {
    provider: Arc<dyn AccountStateProvider>,
    families: Arc<FamilyRegistry>,
    config: Arc<WalkerConfig>,
}

impl WalkerContext {
    /// Context with the built-in families
    pub fn new(provider: Arc<dyn AccountStateProvider>, config: WalkerConfig) -> Self {
        Self::with_families(provider, FamilyRegistry::builtin(), config)
    }

    pub fn with_families(
        provider: Arc<dyn AccountStateProvider>,
        families: FamilyRegistry,
        config: WalkerConfig,
    ) -> Self {
        log::debug!("Walker context ready: {:?}", families);
        Self {
            provider,
            families: Arc::new(families),
            config: Arc::new(config),
        }
    }

    pub fn provider(&self) -> &dyn AccountStateProvider {
        self.provider.as_ref()
    }

    pub fn families(&self) -> &FamilyRegistry {
        &self.families
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }
}

impl std::fmt::Debug for WalkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalkerContext")
            .field("families", &self.families)
            .field("config", &self.config)
            .finish()
    }
}
