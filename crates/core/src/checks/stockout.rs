use crate::checks::AnalystCheck;
use crate::context::{
    BusinessContext, CRITICAL_DAYS_OF_STOCK, MEDIUM_DAYS_OF_STOCK, MIN_COVERAGE_FRACTION,
    TOP_SELLER_REVENUE_PERCENTILE,
};
use crate::domain::features::{FeatureRecord, FeatureSet, VelocityConfidence};
use crate::domain::insight::{Insight, InsightType, MetricValue, Severity};
use std::collections::{BTreeMap, BTreeSet};

pub const CHECK_NAME: &str = "stockout_risk";

/// Identifies products at risk of stock-out from days-of-cover.
///
/// Severity is contextual: top sellers are escalated one level because a
/// stock-out there costs disproportionate revenue.
pub struct StockOutRiskCheck;

/// Per-product working view for one run. Derived from the feature set; the
/// top-seller flag is relative across the whole set so it lives here, not on
/// the feature record.
#[derive(Debug)]
struct Assessment<'a> {
    record: &'a FeatureRecord,
    days_of_stock: f64,
    is_top_seller: bool,
    severity: Severity,
}

impl AnalystCheck for StockOutRiskCheck {
    fn name(&self) -> &'static str {
        CHECK_NAME
    }

    fn description(&self) -> &'static str {
        "Identifies products at risk of running out of stock based on days of cover"
    }

    fn is_applicable(&self, context: &BusinessContext) -> bool {
        context.has_threshold(CRITICAL_DAYS_OF_STOCK) && context.has_threshold(MEDIUM_DAYS_OF_STOCK)
    }

    fn execute(
        &self,
        features: &FeatureSet,
        context: &BusinessContext,
    ) -> anyhow::Result<Vec<Insight>> {
        // An empty analysis is valid, not exceptional.
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let critical_days = context.get_threshold(CRITICAL_DAYS_OF_STOCK)?;
        let medium_days = context.get_threshold(MEDIUM_DAYS_OF_STOCK)?;
        let top_fraction = context.get_threshold(TOP_SELLER_REVENUE_PERCENTILE)?;
        let min_coverage = context.get_threshold(MIN_COVERAGE_FRACTION)?;

        let top_sellers = top_sellers_by_revenue(features, top_fraction);
        let assessments: Vec<Assessment> = features
            .iter()
            .map(|(product_id, record)| {
                let days_of_stock = record.quantity.max(0.0) / record.daily_sales_velocity;
                let is_top_seller = top_sellers.contains(product_id.as_str());
                Assessment {
                    record,
                    days_of_stock,
                    is_top_seller,
                    severity: classify_severity(
                        days_of_stock,
                        is_top_seller,
                        critical_days,
                        medium_days,
                    ),
                }
            })
            .collect();

        let mut insights = Vec::new();
        for severity in [Severity::Critical, Severity::High, Severity::Medium] {
            let mut bucket: Vec<&Assessment> = assessments
                .iter()
                .filter(|a| a.severity == severity)
                .collect();
            if bucket.is_empty() {
                continue;
            }
            bucket.sort_by(|a, b| {
                a.days_of_stock
                    .partial_cmp(&b.days_of_stock)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.record.product_id.cmp(&b.record.product_id))
            });
            insights.push(bucket_insight(severity, &bucket, features.len()));
        }

        // Trust-first: low coverage is reported even when no risk was found,
        // so silence never implies confidence the data does not support.
        let coverage = features.high_confidence_fraction();
        if !features.sales_rows_supplied() || coverage < min_coverage {
            insights.push(coverage_insight(features));
        }

        tracing::debug!(
            products = features.len(),
            top_sellers = top_sellers.len(),
            insights = insights.len(),
            coverage,
            "stock-out risk check complete"
        );
        Ok(insights)
    }
}

/// Severity as a pure function of days-of-stock, top-seller status and the
/// context thresholds.
pub fn classify_severity(
    days_of_stock: f64,
    is_top_seller: bool,
    critical_days: f64,
    medium_days: f64,
) -> Severity {
    if days_of_stock < critical_days {
        if is_top_seller {
            Severity::Critical
        } else {
            Severity::High
        }
    } else if days_of_stock < medium_days {
        if is_top_seller {
            Severity::High
        } else {
            Severity::Medium
        }
    } else if is_top_seller {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Top `fraction` of products by snapshot revenue, counted with ceil so any
/// non-empty set has at least one top seller. Revenue ties straddling the
/// cutoff resolve by product_id ascending.
fn top_sellers_by_revenue(features: &FeatureSet, fraction: f64) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    if features.is_empty() || fraction <= 0.0 {
        return out;
    }

    let mut ranked: Vec<(&String, f64)> = features
        .iter()
        .map(|(product_id, record)| (product_id, record.revenue))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let count = ((features.len() as f64) * fraction).ceil() as usize;
    for (product_id, _) in ranked.into_iter().take(count.min(features.len())) {
        out.insert(product_id.clone());
    }
    out
}

/// Qualitative timeframe for the description. Derived from severity alone,
/// never from the raw day count, to avoid implying precision the velocity
/// estimate cannot support.
fn timeframe(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "this week",
        Severity::High => "the next 1–2 weeks",
        _ => "the next 2–3 weeks",
    }
}

fn bucket_insight(severity: Severity, bucket: &[&Assessment], total_products: usize) -> Insight {
    let affected = bucket.len();
    let top_seller_count = bucket.iter().filter(|a| a.is_top_seller).count();
    let min_days = bucket
        .iter()
        .map(|a| a.days_of_stock)
        .fold(f64::INFINITY, f64::min);
    let avg_days =
        bucket.iter().map(|a| a.days_of_stock).sum::<f64>() / affected as f64;
    let velocity_estimated = bucket
        .iter()
        .any(|a| a.record.velocity_confidence == VelocityConfidence::Low);

    let when = timeframe(severity);
    let (title, outlook, recommendation) = match severity {
        Severity::Critical => (
            headline(affected, "needs immediate attention", "need immediate attention"),
            "These products may run out this week at the current rate of sales. This could \
             result in missed sales and customer dissatisfaction."
                .to_string(),
            "Prioritize reordering items that may run out this week at the current rate of sales.",
        ),
        Severity::High => (
            headline(affected, "needs action soon", "need action soon"),
            "These products should be reordered soon to avoid future shortages.".to_string(),
            "Plan reorders soon for products that may run out in the next 1–2 weeks at the \
             current rate of sales.",
        ),
        _ => (
            headline(affected, "to monitor", "to monitor"),
            "Stock levels should be monitored for these products.".to_string(),
            "Monitor stock levels and plan reorders before products reach critical levels.",
        ),
    };

    let product_list = bucket
        .iter()
        .map(|a| {
            format!(
                "{} (may run out {when} at the current rate of sales)",
                a.record.product_name
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let description = format!("{product_list}\n\n{outlook}");

    let mut recommendation = recommendation.to_string();
    if top_seller_count > 0 {
        recommendation
            .push_str(" Pay special attention to top-selling products to avoid revenue loss.");
    }

    let mut metrics = BTreeMap::new();
    metrics.insert("affected_count".to_string(), MetricValue::from(affected));
    metrics.insert(
        "top_seller_count".to_string(),
        MetricValue::from(top_seller_count),
    );
    metrics.insert("min_days_of_stock".to_string(), MetricValue::from(min_days));
    metrics.insert("avg_days_of_stock".to_string(), MetricValue::from(avg_days));
    metrics.insert(
        "total_products".to_string(),
        MetricValue::from(total_products),
    );

    let mut metadata = BTreeMap::new();
    metadata.insert(
        "product_ids".to_string(),
        serde_json::json!(bucket
            .iter()
            .map(|a| a.record.product_id.as_str())
            .collect::<Vec<_>>()),
    );
    metadata.insert(
        "velocity_estimated".to_string(),
        serde_json::json!(velocity_estimated),
    );

    Insight {
        check_name: CHECK_NAME.to_string(),
        title,
        description,
        severity,
        insight_type: InsightType::Risk,
        metrics,
        recommendation: Some(recommendation),
        metadata,
    }
}

fn headline(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("Stock-out risk: 1 product {singular}")
    } else {
        format!("Stock-out risk: {count} products {plural}")
    }
}

fn coverage_insight(features: &FeatureSet) -> Insight {
    let total = features.len();
    let high_confidence = features.high_confidence_count();
    let coverage = features.high_confidence_fraction();

    let (title, description, recommendation) = if !features.sales_rows_supplied() {
        (
            "Data coverage: sales history missing",
            "Sales data was not provided, so stock-out risk is assessed from estimated sales \
             patterns rather than actual sales history. This reduces the accuracy of timing \
             predictions."
                .to_string(),
            "Add sales rows (date, product_id, units_sold) covering activity after the \
             inventory snapshot date. Actual sales rates make stock-out timing far more \
             precise.",
        )
    } else {
        (
            "Data coverage: sales history limited",
            format!(
                "Reliable sales history covers only {high_confidence} of {total} products \
                 ({:.0}% coverage). Assessments for the remaining products rely on industry \
                 estimates and may be less accurate.",
                coverage * 100.0
            ),
            "Add sales rows for all products. More complete sales history improves the \
             accuracy of stock-out predictions.",
        )
    };

    let mut metrics = BTreeMap::new();
    metrics.insert(
        "has_sales_data".to_string(),
        MetricValue::from(features.sales_rows_supplied()),
    );
    metrics.insert(
        "high_confidence_products".to_string(),
        MetricValue::from(high_confidence),
    );
    metrics.insert("total_products".to_string(), MetricValue::from(total));
    metrics.insert("coverage_fraction".to_string(), MetricValue::from(coverage));

    let mut metadata = BTreeMap::new();
    metadata.insert("data_quality_issue".to_string(), serde_json::json!(true));

    Insight {
        check_name: CHECK_NAME.to_string(),
        title: title.to_string(),
        description,
        severity: Severity::Info,
        insight_type: InsightType::Anomaly,
        metrics,
        recommendation: Some(recommendation.to_string()),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, quantity: f64, price: f64, velocity: f64) -> FeatureRecord {
        FeatureRecord {
            product_id: id.to_string(),
            product_name: format!("Product {id}"),
            price,
            quantity,
            daily_sales_velocity: velocity,
            velocity_confidence: VelocityConfidence::High,
            revenue: quantity * price,
        }
    }

    fn feature_set(records: Vec<FeatureRecord>, sales_rows_supplied: bool) -> FeatureSet {
        let map = records
            .into_iter()
            .map(|r| (r.product_id.clone(), r))
            .collect();
        FeatureSet::new(map, sales_rows_supplied)
    }

    #[test]
    fn severity_table_is_exhaustive_and_deterministic() {
        let cases = [
            (3.0, false, Severity::High),
            (3.0, true, Severity::Critical),
            (10.0, false, Severity::Medium),
            (10.0, true, Severity::High),
            (20.0, false, Severity::Low),
            (20.0, true, Severity::Medium),
        ];
        for (days, top, expected) in cases {
            assert_eq!(classify_severity(days, top, 7.0, 14.0), expected);
            // Determinism: same inputs, same output.
            assert_eq!(classify_severity(days, top, 7.0, 14.0), expected);
        }
    }

    #[test]
    fn thresholds_come_from_context_not_constants() {
        // With an alternate industry config the same product reclassifies.
        assert_eq!(classify_severity(10.0, false, 7.0, 14.0), Severity::Medium);
        assert_eq!(classify_severity(10.0, false, 12.0, 21.0), Severity::High);
    }

    #[test]
    fn empty_feature_set_returns_no_insights() {
        let check = StockOutRiskCheck;
        let out = check
            .execute(&FeatureSet::default(), &BusinessContext::retail())
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn one_insight_per_nonempty_severity_bucket() {
        // Revenue ranking puts P1 (3000) on top; ceil(4 * 0.3) = 2 top
        // sellers: P1 and P2 (1000).
        let features = feature_set(
            vec![
                record("P1", 3.0, 1000.0, 1.0),  // 3 days, top => Critical
                record("P2", 10.0, 100.0, 1.0),  // 10 days, top => High
                record("P3", 10.0, 1.0, 1.0),    // 10 days => Medium
                record("P4", 100.0, 1.0, 1.0),   // 100 days => Low, no insight
            ],
            true,
        );
        let check = StockOutRiskCheck;
        let out = check.execute(&features, &BusinessContext::retail()).unwrap();

        let severities: Vec<Severity> = out.iter().map(|i| i.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::High, Severity::Medium]
        );
        for insight in &out {
            assert_eq!(insight.insight_type, InsightType::Risk);
            assert_eq!(
                insight.metric("total_products"),
                Some(&MetricValue::Int(4))
            );
            assert_eq!(
                insight.metric("affected_count"),
                Some(&MetricValue::Int(1))
            );
        }
        assert_eq!(
            out[0].metric("top_seller_count"),
            Some(&MetricValue::Int(1))
        );
    }

    #[test]
    fn bucket_metrics_are_recomputable() {
        let features = feature_set(
            vec![
                record("P1", 8.0, 10.0, 1.0),  // 8 days
                record("P2", 12.0, 10.0, 1.0), // 12 days
            ],
            true,
        );
        // Make neither a top seller so both land in Medium.
        let ctx = BusinessContext::retail().with_threshold(TOP_SELLER_REVENUE_PERCENTILE, 0.0);
        let out = StockOutRiskCheck.execute(&features, &ctx).unwrap();

        assert_eq!(out.len(), 1);
        let insight = &out[0];
        assert_eq!(insight.severity, Severity::Medium);
        assert_eq!(insight.metric("affected_count"), Some(&MetricValue::Int(2)));
        assert_eq!(
            insight.metric("min_days_of_stock"),
            Some(&MetricValue::Float(8.0))
        );
        assert_eq!(
            insight.metric("avg_days_of_stock"),
            Some(&MetricValue::Float(10.0))
        );
    }

    #[test]
    fn description_lists_products_with_severity_timeframe() {
        let features = feature_set(vec![record("P1", 3.0, 1000.0, 1.0)], true);
        let out = StockOutRiskCheck
            .execute(&features, &BusinessContext::retail())
            .unwrap();

        // Single product is always a top seller => Critical.
        assert_eq!(out[0].severity, Severity::Critical);
        assert!(out[0].description.contains("Product P1"));
        assert!(out[0].description.contains("this week"));
        assert!(out[0].title.contains("1 product needs immediate attention"));
    }

    #[test]
    fn top_seller_cutoff_ties_resolve_by_product_id() {
        // Identical revenue everywhere; ceil(3 * 0.34) = 2: P1 and P2 win by
        // id order at the straddled cutoff.
        let features = feature_set(
            vec![
                record("P3", 10.0, 10.0, 1.0),
                record("P1", 10.0, 10.0, 1.0),
                record("P2", 10.0, 10.0, 1.0),
            ],
            true,
        );
        let top = top_sellers_by_revenue(&features, 0.34);
        assert_eq!(
            top.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["P1", "P2"]
        );
    }

    #[test]
    fn coverage_insight_fires_without_sales_rows() {
        let mut low = record("P1", 100.0, 10.0, 1.0);
        low.velocity_confidence = VelocityConfidence::Low;
        let features = feature_set(vec![low], false);
        let out = StockOutRiskCheck
            .execute(&features, &BusinessContext::retail())
            .unwrap();

        let coverage: Vec<&Insight> = out
            .iter()
            .filter(|i| i.severity == Severity::Info)
            .collect();
        assert_eq!(coverage.len(), 1);
        assert_eq!(coverage[0].insight_type, InsightType::Anomaly);
        assert_eq!(
            coverage[0].metric("has_sales_data"),
            Some(&MetricValue::Bool(false))
        );
    }

    #[test]
    fn coverage_insight_fires_even_when_no_risk_found() {
        // Plenty of stock (no risk buckets) but thin history: the caveat
        // must still be reported.
        let mut a = record("P1", 1000.0, 10.0, 1.0);
        a.velocity_confidence = VelocityConfidence::Low;
        let mut b = record("P2", 1000.0, 10.0, 1.0);
        b.velocity_confidence = VelocityConfidence::Low;
        let c = record("P3", 1000.0, 10.0, 1.0);
        let features = feature_set(vec![a, b, c], true);

        let ctx = BusinessContext::retail().with_threshold(TOP_SELLER_REVENUE_PERCENTILE, 0.0);
        let out = StockOutRiskCheck.execute(&features, &ctx).unwrap();

        // 1/3 high confidence < 0.5 coverage floor.
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Info);
        assert_eq!(
            out[0].metric("high_confidence_products"),
            Some(&MetricValue::Int(1))
        );
    }

    #[test]
    fn sufficient_coverage_suppresses_the_caveat() {
        let features = feature_set(
            vec![record("P1", 1000.0, 10.0, 1.0), record("P2", 1000.0, 10.0, 1.0)],
            true,
        );
        let ctx = BusinessContext::retail().with_threshold(TOP_SELLER_REVENUE_PERCENTILE, 0.0);
        let out = StockOutRiskCheck.execute(&features, &ctx).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn days_of_stock_never_negative() {
        let mut negative = record("P1", -5.0, 10.0, 1.0);
        negative.quantity = -5.0;
        let features = feature_set(vec![negative], true);
        let out = StockOutRiskCheck
            .execute(&features, &BusinessContext::retail())
            .unwrap();

        // Quantity floors at 0 => 0 days => Critical (single product is a
        // top seller).
        assert_eq!(out[0].severity, Severity::Critical);
        assert_eq!(
            out[0].metric("min_days_of_stock"),
            Some(&MetricValue::Float(0.0))
        );
    }

    #[test]
    fn estimated_velocity_scenario_lands_in_medium_for_single_product() {
        // qty 5, no sales, turnover 12 => velocity ≈ 0.164, ≈ 30.4 days.
        // A single product is always a top seller, so >= 14 days => Medium.
        let velocity: f64 = 5.0 / (365.0 / 12.0);
        let mut rec = record("P002", 5.0, 25.0, velocity.max(0.01));
        rec.velocity_confidence = VelocityConfidence::Low;
        let features = feature_set(vec![rec], false);

        let out = StockOutRiskCheck
            .execute(&features, &BusinessContext::retail())
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].severity, Severity::Medium);
        assert_eq!(out[1].severity, Severity::Info);
        let days = 5.0 / velocity;
        assert!((days - 30.4166).abs() < 1e-3);
    }
}
