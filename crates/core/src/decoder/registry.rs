//! Mode to variant dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use super::variants::{BeaconDecoder, DecoderVariant, LrptDecoder};
use crate::satellite::DecoderMode;

/// Maps each [`DecoderMode`] to the variant that decodes it.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    variants: HashMap<DecoderMode, Arc<dyn DecoderVariant>>,
}

impl DecoderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in variant.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(DecoderMode::Lrpt, Arc::new(LrptDecoder))
            .register(DecoderMode::Jy1sat, Arc::new(BeaconDecoder))
    }

    /// Add or replace the variant for `mode`.
    pub fn register(mut self, mode: DecoderMode, variant: Arc<dyn DecoderVariant>) -> Self {
        self.variants.insert(mode, variant);
        self
    }

    pub fn resolve(&self, mode: DecoderMode) -> Option<Arc<dyn DecoderVariant>> {
        self.variants.get(&mode).cloned()
    }

    pub fn modes(&self) -> Vec<DecoderMode> {
        let mut modes: Vec<_> = self.variants.keys().copied().collect();
        modes.sort_by_key(|m| m.as_str());
        modes
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("modes", &self.modes())
            .finish()
    }
}
