use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered severity scale. Declaration order is rank order, so sorting
/// ascending puts `Critical` first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insight categories, in tie-break order for prioritization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Risk,
    Anomaly,
    Opportunity,
    Info,
}

/// A metric attached to an insight for traceability. Every value cited by an
/// insight must be recomputable from the feature set and context thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Bool(v) => write!(f, "{v}"),
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v:.2}"),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Int(v as i64)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub check_name: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub insight_type: InsightType,
    pub metrics: BTreeMap<String, MetricValue>,
    pub recommendation: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Insight {
    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_critical_first() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::High < Severity::Medium);
        assert!(Severity::Medium < Severity::Low);
        assert!(Severity::Low < Severity::Info);
    }

    #[test]
    fn insight_type_tie_break_order() {
        assert!(InsightType::Risk < InsightType::Anomaly);
        assert!(InsightType::Anomaly < InsightType::Opportunity);
        assert!(InsightType::Opportunity < InsightType::Info);
    }

    #[test]
    fn metric_values_serialize_untagged() {
        let v = serde_json::to_value(MetricValue::Int(3)).unwrap();
        assert_eq!(v, serde_json::json!(3));
        let v = serde_json::to_value(MetricValue::Text("high".to_string())).unwrap();
        assert_eq!(v, serde_json::json!("high"));
    }

    #[test]
    fn float_metrics_display_with_two_decimals() {
        assert_eq!(MetricValue::Float(37.5).to_string(), "37.50");
        assert_eq!(MetricValue::Int(5).to_string(), "5");
    }
}
