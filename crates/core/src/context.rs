use crate::error::{ContextValueKind, MissingContextValue, UnknownIndustry};
use std::collections::BTreeMap;

// Threshold names read by the stock-out risk check and the extractor.
pub const CRITICAL_DAYS_OF_STOCK: &str = "critical_days_of_stock";
pub const MEDIUM_DAYS_OF_STOCK: &str = "medium_days_of_stock";
pub const TOP_SELLER_REVENUE_PERCENTILE: &str = "top_seller_revenue_percentile";
pub const SALES_LOOKBACK_DAYS: &str = "sales_lookback_days";
pub const MIN_SALES_DAYS_REQUIRED: &str = "min_sales_days_required";
pub const MIN_COVERAGE_FRACTION: &str = "min_coverage_fraction";

pub const TYPICAL_STOCK_TURNOVER: &str = "typical_stock_turnover";

const REQUIRED_THRESHOLDS: &[&str] = &[
    CRITICAL_DAYS_OF_STOCK,
    MEDIUM_DAYS_OF_STOCK,
    TOP_SELLER_REVENUE_PERCENTILE,
    SALES_LOOKBACK_DAYS,
    MIN_SALES_DAYS_REQUIRED,
    MIN_COVERAGE_FRACTION,
];

const REQUIRED_NORMS: &[&str] = &[TYPICAL_STOCK_TURNOVER];

const INDUSTRIES: &[&str] = &["retail"];

/// Industry-specific thresholds and norms. Constructed once, never mutated
/// afterwards; safe to share across analysis runs.
#[derive(Debug, Clone)]
pub struct BusinessContext {
    industry: String,
    thresholds: BTreeMap<String, f64>,
    norms: BTreeMap<String, f64>,
}

impl BusinessContext {
    /// Keyed lookup over the closed set of named configurations, validated
    /// at construction time.
    pub fn for_industry(industry: &str) -> anyhow::Result<Self> {
        let context = match industry.trim().to_ascii_lowercase().as_str() {
            "retail" => Self::retail(),
            _ => {
                return Err(UnknownIndustry {
                    industry: industry.to_string(),
                    available: INDUSTRIES.iter().map(|s| s.to_string()).collect(),
                }
                .into())
            }
        };
        context.validate()?;
        Ok(context)
    }

    pub fn retail() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(CRITICAL_DAYS_OF_STOCK.to_string(), 7.0);
        thresholds.insert(MEDIUM_DAYS_OF_STOCK.to_string(), 14.0);
        thresholds.insert(TOP_SELLER_REVENUE_PERCENTILE.to_string(), 0.30);
        thresholds.insert(SALES_LOOKBACK_DAYS.to_string(), 30.0);
        thresholds.insert(MIN_SALES_DAYS_REQUIRED.to_string(), 7.0);
        thresholds.insert(MIN_COVERAGE_FRACTION.to_string(), 0.50);

        let mut norms = BTreeMap::new();
        norms.insert(TYPICAL_STOCK_TURNOVER.to_string(), 12.0);
        norms.insert("typical_margin".to_string(), 0.30);

        Self {
            industry: "retail".to_string(),
            thresholds,
            norms,
        }
    }

    pub fn list_industries() -> &'static [&'static str] {
        INDUSTRIES
    }

    /// Override one threshold. Intended for alternate industry configs and
    /// tests; call before the context is handed to an engine.
    pub fn with_threshold(mut self, name: &str, value: f64) -> Self {
        self.thresholds.insert(name.to_string(), value);
        self
    }

    pub fn with_norm(mut self, name: &str, value: f64) -> Self {
        self.norms.insert(name.to_string(), value);
        self
    }

    pub fn industry(&self) -> &str {
        &self.industry
    }

    pub fn get_threshold(&self, name: &str) -> anyhow::Result<f64> {
        self.thresholds.get(name).copied().ok_or_else(|| {
            MissingContextValue {
                industry: self.industry.clone(),
                kind: ContextValueKind::Threshold,
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn get_norm(&self, name: &str) -> anyhow::Result<f64> {
        self.norms.get(name).copied().ok_or_else(|| {
            MissingContextValue {
                industry: self.industry.clone(),
                kind: ContextValueKind::Norm,
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn has_threshold(&self, name: &str) -> bool {
        self.thresholds.contains_key(name)
    }

    pub fn has_norm(&self, name: &str) -> bool {
        self.norms.contains_key(name)
    }

    /// Configuration defect check: every value the pipeline reads must be
    /// present before any analysis runs.
    pub fn validate(&self) -> anyhow::Result<()> {
        for name in REQUIRED_THRESHOLDS {
            self.get_threshold(name)?;
        }
        for name in REQUIRED_NORMS {
            self.get_norm(name)?;
        }
        Ok(())
    }
}
