use std::fmt;

/// Conflicting inventory rows for a single product. Fatal: the snapshot is
/// ambiguous and no downstream number would be trustworthy.
#[derive(Debug, Clone)]
pub struct DataInconsistency {
    pub product_id: String,
    pub detail: String,
}

impl fmt::Display for DataInconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inconsistent inventory data for product '{}': {}",
            self.product_id, self.detail
        )
    }
}

impl std::error::Error for DataInconsistency {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextValueKind {
    Threshold,
    Norm,
}

impl ContextValueKind {
    fn as_str(&self) -> &'static str {
        match self {
            ContextValueKind::Threshold => "threshold",
            ContextValueKind::Norm => "norm",
        }
    }
}

/// A business context is missing a value a check depends on. This is a
/// configuration defect, not a data problem.
#[derive(Debug, Clone)]
pub struct MissingContextValue {
    pub industry: String,
    pub kind: ContextValueKind,
    pub name: String,
}

impl fmt::Display for MissingContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' not found in {} context",
            self.kind.as_str(),
            self.name,
            self.industry
        )
    }
}

impl std::error::Error for MissingContextValue {}

#[derive(Debug, Clone)]
pub struct UnknownIndustry {
    pub industry: String,
    pub available: Vec<String>,
}

impl fmt::Display for UnknownIndustry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "industry '{}' not supported (available: {})",
            self.industry,
            self.available.join(", ")
        )
    }
}

impl std::error::Error for UnknownIndustry {}
