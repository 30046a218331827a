use crate::context::{
    BusinessContext, MIN_SALES_DAYS_REQUIRED, SALES_LOOKBACK_DAYS, TYPICAL_STOCK_TURNOVER,
};
use crate::domain::features::{
    FeatureRecord, FeatureSet, ProductRecord, SalesObservation, VelocityConfidence, VELOCITY_FLOOR,
};
use crate::error::DataInconsistency;
use crate::ingest::table::AnalysisTable;
use anyhow::ensure;
use chrono::{Duration, NaiveDate};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Build the per-product feature mapping from a validated unified table.
///
/// Sales are aligned to each product's snapshot: only observations dated
/// strictly after `as_of_date` contribute to velocity. Products without
/// eligible sales fall back to a turnover-based estimate.
pub fn extract(table: &AnalysisTable, context: &BusinessContext) -> anyhow::Result<FeatureSet> {
    let lookback_days = context.get_threshold(SALES_LOOKBACK_DAYS)? as i64;
    let min_sale_days = context.get_threshold(MIN_SALES_DAYS_REQUIRED)? as usize;
    let annual_turnover = context.get_norm(TYPICAL_STOCK_TURNOVER)?;
    ensure!(
        lookback_days >= 1,
        "sales_lookback_days must be >= 1 (got {lookback_days})"
    );
    ensure!(
        annual_turnover > 0.0,
        "typical_stock_turnover must be > 0 (got {annual_turnover})"
    );

    let (products, sales, sales_rows_supplied) = partition(table)?;

    let mut records = BTreeMap::new();
    for (product_id, product) in &products {
        let observed = sales.get(product_id).map(Vec::as_slice).unwrap_or(&[]);
        let (velocity, confidence) =
            match measured_velocity(observed, product.as_of_date, lookback_days, min_sale_days) {
                Some(v) => v,
                None => (
                    estimated_velocity(product.starting_quantity, annual_turnover),
                    VelocityConfidence::Low,
                ),
            };

        records.insert(
            product_id.clone(),
            FeatureRecord {
                product_id: product.product_id.clone(),
                product_name: product.product_name.clone(),
                price: product.price,
                quantity: product.starting_quantity,
                daily_sales_velocity: velocity,
                velocity_confidence: confidence,
                revenue: product.starting_quantity * product.price,
            },
        );
    }

    let features = FeatureSet::new(records, sales_rows_supplied);
    tracing::debug!(
        products = features.len(),
        high_confidence = features.high_confidence_count(),
        sales_rows_supplied,
        "feature extraction complete"
    );
    Ok(features)
}

type PartitionedRows = (
    BTreeMap<String, ProductRecord>,
    BTreeMap<String, Vec<SalesObservation>>,
    bool,
);

fn partition(table: &AnalysisTable) -> anyhow::Result<PartitionedRows> {
    let mut products: BTreeMap<String, ProductRecord> = BTreeMap::new();
    let mut sales: BTreeMap<String, Vec<SalesObservation>> = BTreeMap::new();
    let mut sales_rows_supplied = false;

    for row in &table.rows {
        let product_id = row.product_id.trim().to_string();

        if row.is_inventory() {
            let (Some(as_of_date), Some(name), Some(price), Some(quantity)) = (
                row.as_of_date,
                row.product_name.as_deref(),
                row.price,
                row.starting_quantity,
            ) else {
                anyhow::bail!(
                    "inventory row for product '{product_id}' is missing required fields \
                     (run the table through ingest::validate first)"
                );
            };

            let record = ProductRecord {
                product_id: product_id.clone(),
                product_name: name.trim().to_string(),
                price,
                starting_quantity: quantity,
                as_of_date,
            };

            match products.entry(product_id) {
                Entry::Vacant(entry) => {
                    entry.insert(record);
                }
                Entry::Occupied(entry) => {
                    let existing = entry.get();
                    // Exact duplicate snapshot rows collapse silently.
                    if existing.as_of_date != record.as_of_date
                        || existing.starting_quantity != record.starting_quantity
                    {
                        return Err(DataInconsistency {
                            product_id: entry.key().clone(),
                            detail: format!(
                                "conflicting inventory snapshots: as_of_date {} / quantity {} vs \
                                 as_of_date {} / quantity {}",
                                existing.as_of_date,
                                existing.starting_quantity,
                                record.as_of_date,
                                record.starting_quantity
                            ),
                        }
                        .into());
                    }
                }
            }
        } else if row.is_sales() {
            sales_rows_supplied = true;
            let (Some(date), Some(units_sold)) = (row.date, row.units_sold) else {
                continue;
            };
            sales.entry(product_id).or_default().push(SalesObservation {
                product_id: row.product_id.trim().to_string(),
                date,
                units_sold,
            });
        }
    }

    Ok((products, sales, sales_rows_supplied))
}

/// Velocity from eligible sales, or `None` when no observation survives the
/// strict `date > as_of_date` filter.
///
/// The lookback window is `lookback_days` days ending at the latest eligible
/// sale date; velocity is total units over distinct sale days within it.
fn measured_velocity(
    observed: &[SalesObservation],
    as_of_date: NaiveDate,
    lookback_days: i64,
    min_sale_days: usize,
) -> Option<(f64, VelocityConfidence)> {
    let eligible: Vec<&SalesObservation> =
        observed.iter().filter(|o| o.date > as_of_date).collect();
    let latest = eligible.iter().map(|o| o.date).max()?;

    let window_start = latest - Duration::days(lookback_days);
    let mut total_units = 0.0;
    let mut sale_days: BTreeSet<NaiveDate> = BTreeSet::new();
    for obs in &eligible {
        if obs.date > window_start {
            total_units += obs.units_sold;
            sale_days.insert(obs.date);
        }
    }

    let velocity = (total_units / sale_days.len() as f64).max(VELOCITY_FLOOR);
    let confidence = if sale_days.len() >= min_sale_days {
        VelocityConfidence::High
    } else {
        VelocityConfidence::Low
    };
    Some((velocity, confidence))
}

/// No sales history: assume stock turns over `annual_turnover` times per
/// year, so daily sales ≈ quantity / (365 / turnover). The floor keeps the
/// estimate usable for zero-quantity products.
fn estimated_velocity(quantity: f64, annual_turnover: f64) -> f64 {
    (quantity / (365.0 / annual_turnover)).max(VELOCITY_FLOOR)
}
