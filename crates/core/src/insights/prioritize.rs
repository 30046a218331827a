use crate::domain::insight::{Insight, Severity};

/// Total order for presentation: severity rank ascending (critical first),
/// ties by insight type (risk before anomaly before opportunity before
/// info), then original insertion order. The sort is stable, so the last
/// tie-break comes for free.
pub fn prioritize(mut insights: Vec<Insight>) -> Vec<Insight> {
    insights.sort_by_key(|i| (i.severity, i.insight_type));
    insights
}

/// Critical insights only. Pure view; does not mutate the input.
pub fn critical(insights: &[Insight]) -> Vec<&Insight> {
    insights
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .collect()
}

/// Insights at or above a minimum severity. `Severity` ranks critical
/// lowest, so "at or above" is `<=` on the enum.
pub fn at_or_above(insights: &[Insight], min_severity: Severity) -> Vec<&Insight> {
    insights
        .iter()
        .filter(|i| i.severity <= min_severity)
        .collect()
}
