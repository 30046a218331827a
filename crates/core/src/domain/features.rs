use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lower bound on daily sales velocity. This is an estimation artifact, not a
/// measured value: it keeps days-of-stock finite for products that never sell.
pub const VELOCITY_FLOOR: f64 = 0.01;

/// The single inventory snapshot row for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub product_name: String,
    pub price: f64,
    pub starting_quantity: f64,
    pub as_of_date: NaiveDate,
}

/// One day's sales for one product. Only observations dated strictly after
/// the product's snapshot date are eligible for velocity calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesObservation {
    pub product_id: String,
    pub date: NaiveDate,
    pub units_sold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityConfidence {
    High,
    Low,
}

/// Per-product features for one analysis run. Immutable after extraction.
///
/// Top-seller membership is relative across the whole product set, so it is
/// derived in the check layer rather than stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub product_id: String,
    pub product_name: String,
    pub price: f64,
    pub quantity: f64,

    /// Units per day, floored at [`VELOCITY_FLOOR`]. Estimated from industry
    /// norms (confidence `Low`) when no eligible sales exist.
    pub daily_sales_velocity: f64,
    pub velocity_confidence: VelocityConfidence,

    /// quantity × price at snapshot time.
    pub revenue: f64,
}

/// The feature mapping for one analysis run, keyed by product_id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    records: BTreeMap<String, FeatureRecord>,
    sales_rows_supplied: bool,
}

impl FeatureSet {
    pub fn new(records: BTreeMap<String, FeatureRecord>, sales_rows_supplied: bool) -> Self {
        Self {
            records,
            sales_rows_supplied,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, product_id: &str) -> Option<&FeatureRecord> {
        self.records.get(product_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureRecord)> {
        self.records.iter()
    }

    /// Whether the input table contained any sales rows at all, eligible or
    /// not. Distinguishes "no sales data supplied" from "thin sales history".
    pub fn sales_rows_supplied(&self) -> bool {
        self.sales_rows_supplied
    }

    pub fn high_confidence_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.velocity_confidence == VelocityConfidence::High)
            .count()
    }

    pub fn high_confidence_fraction(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.high_confidence_count() as f64 / self.records.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, confidence: VelocityConfidence) -> FeatureRecord {
        FeatureRecord {
            product_id: id.to_string(),
            product_name: format!("Product {id}"),
            price: 10.0,
            quantity: 100.0,
            daily_sales_velocity: 2.0,
            velocity_confidence: confidence,
            revenue: 1000.0,
        }
    }

    #[test]
    fn high_confidence_fraction_counts_records() {
        let mut records = BTreeMap::new();
        records.insert("P1".to_string(), record("P1", VelocityConfidence::High));
        records.insert("P2".to_string(), record("P2", VelocityConfidence::Low));
        records.insert("P3".to_string(), record("P3", VelocityConfidence::High));
        let features = FeatureSet::new(records, true);

        assert_eq!(features.high_confidence_count(), 2);
        assert!((features.high_confidence_fraction() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_set_has_zero_coverage() {
        let features = FeatureSet::default();
        assert!(features.is_empty());
        assert_eq!(features.high_confidence_fraction(), 0.0);
    }
}
