pub mod stockout;

use crate::context::BusinessContext;
use crate::domain::features::FeatureSet;
use crate::domain::insight::Insight;

/// One analyst capability: a pure rule over the feature set.
///
/// Checks must not perform I/O or mutate shared state; a run is a function
/// of (features, context) only.
pub trait AnalystCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Whether this check can run under the given context (e.g. required
    /// thresholds are configured for the industry).
    fn is_applicable(&self, context: &BusinessContext) -> bool;

    fn execute(
        &self,
        features: &FeatureSet,
        context: &BusinessContext,
    ) -> anyhow::Result<Vec<Insight>>;
}

/// Ordered, explicit list of checks. Populated at initialization; no
/// dynamic discovery.
pub struct CheckRegistry {
    checks: Vec<Box<dyn AnalystCheck>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(stockout::StockOutRiskCheck));
        registry
    }

    pub fn register(&mut self, check: Box<dyn AnalystCheck>) {
        self.checks.push(check);
    }

    pub fn get(&self, name: &str) -> Option<&dyn AnalystCheck> {
        self.checks
            .iter()
            .find(|c| c.name() == name)
            .map(|c| &**c)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn get_applicable(&self, context: &BusinessContext) -> Vec<&dyn AnalystCheck> {
        self.checks
            .iter()
            .filter(|c| c.is_applicable(context))
            .map(|c| &**c)
            .collect()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_stockout_check() {
        let registry = CheckRegistry::with_defaults();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(stockout::CHECK_NAME).is_some());
        assert!(registry.get("no_such_check").is_none());
    }

    #[test]
    fn applicable_checks_filter_on_context() {
        let registry = CheckRegistry::with_defaults();
        let ctx = BusinessContext::retail();
        assert_eq!(registry.get_applicable(&ctx).len(), 1);
    }
}
