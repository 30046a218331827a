use crate::checks::CheckRegistry;
use crate::context::BusinessContext;
use crate::domain::insight::Insight;
use crate::extract;
use crate::ingest::table::AnalysisTable;
use crate::ingest::validate;
use crate::insights::prioritize;

/// Orchestrates one analysis run: validate → extract → checks → prioritize.
///
/// A run is a pure function of (table, context); the engine holds no mutable
/// state and can be reused across runs.
pub struct AnalyticsEngine {
    context: BusinessContext,
    registry: CheckRegistry,
}

impl AnalyticsEngine {
    pub fn new(context: BusinessContext, registry: CheckRegistry) -> Self {
        Self { context, registry }
    }

    pub fn with_defaults(context: BusinessContext) -> Self {
        Self::new(context, CheckRegistry::with_defaults())
    }

    pub fn context(&self) -> &BusinessContext {
        &self.context
    }

    /// Run the full pipeline over one table. Fatal errors (inconsistent
    /// inventory, missing context values) propagate unmodified; data-quality
    /// problems surface as insights, never as errors.
    pub fn analyze(&self, table: &AnalysisTable) -> anyhow::Result<Vec<Insight>> {
        validate::validate(table)?;
        let features = extract::extract(table, &self.context)?;

        let mut insights = Vec::new();
        for check in self.registry.get_applicable(&self.context) {
            let t0 = std::time::Instant::now();
            let mut out = check.execute(&features, &self.context)?;
            tracing::debug!(
                check = check.name(),
                insights = out.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "check complete"
            );
            insights.append(&mut out);
        }

        Ok(prioritize::prioritize(insights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::insight::Severity;
    use crate::error::DataInconsistency;
    use crate::ingest::table::TableRow;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn inventory_row(id: &str, price: f64, quantity: f64) -> TableRow {
        TableRow {
            product_id: id.to_string(),
            as_of_date: Some(date("2024-12-01")),
            product_name: Some(format!("Product {id}")),
            price: Some(price),
            starting_quantity: Some(quantity),
            ..TableRow::default()
        }
    }

    fn sales_row(id: &str, d: &str, units: f64) -> TableRow {
        TableRow {
            product_id: id.to_string(),
            date: Some(date(d)),
            units_sold: Some(units),
            ..TableRow::default()
        }
    }

    fn engine() -> AnalyticsEngine {
        AnalyticsEngine::with_defaults(BusinessContext::retail())
    }

    #[test]
    fn analyze_emits_prioritized_insights() {
        let mut rows = vec![
            // 5 units at 2/day => 2.5 days; top seller by revenue.
            inventory_row("P1", 100.0, 5.0),
            // Plenty of stock, cheap.
            inventory_row("P2", 1.0, 500.0),
        ];
        for day in 2..=12 {
            rows.push(sales_row("P1", &format!("2024-12-{day:02}"), 2.0));
            rows.push(sales_row("P2", &format!("2024-12-{day:02}"), 1.0));
        }
        let table = AnalysisTable { rows };

        let insights = engine().analyze(&table).unwrap();
        assert!(!insights.is_empty());
        assert_eq!(insights[0].severity, Severity::Critical);
        for pair in insights.windows(2) {
            assert!(pair[0].severity <= pair[1].severity);
        }
    }

    #[test]
    fn no_sales_input_always_reports_coverage() {
        let table = AnalysisTable {
            rows: vec![inventory_row("P1", 10.0, 1000.0)],
        };
        let insights = engine().analyze(&table).unwrap();
        assert!(insights
            .iter()
            .any(|i| i.severity == Severity::Info && i.title.contains("sales history missing")));
    }

    #[test]
    fn inconsistent_inventory_aborts_the_run() {
        let table = AnalysisTable {
            rows: vec![
                inventory_row("P1", 10.0, 100.0),
                inventory_row("P1", 10.0, 90.0),
            ],
        };
        let err = engine().analyze(&table).unwrap_err();
        assert!(err.downcast_ref::<DataInconsistency>().is_some());
    }

    #[test]
    fn invalid_table_fails_validation_before_extraction() {
        let table = AnalysisTable {
            rows: vec![sales_row("P1", "2024-12-02", 1.0)],
        };
        assert!(engine().analyze(&table).is_err());
    }
}
