use crate::ingest::table::AnalysisTable;
use anyhow::ensure;

/// Thin format check over the unified table. Schema-level only: consistency
/// across rows (duplicate snapshots etc.) is the extractor's concern.
pub fn validate(table: &AnalysisTable) -> anyhow::Result<()> {
    ensure!(!table.is_empty(), "input table is empty");

    let mut inventory_rows = 0usize;
    for (idx, row) in table.rows.iter().enumerate() {
        let line = idx + 1;
        ensure!(
            !row.product_id.trim().is_empty(),
            "row {line}: product_id must be non-empty"
        );

        let is_inventory = row.is_inventory();
        let is_sales = row.is_sales();
        ensure!(
            !(is_inventory && is_sales),
            "row {line} (product '{}'): a row may carry an inventory snapshot or a sale, never both",
            row.product_id
        );

        if is_inventory {
            inventory_rows += 1;
            ensure!(
                row.as_of_date.is_some(),
                "row {line} (product '{}'): inventory row is missing as_of_date",
                row.product_id
            );
            ensure!(
                row.product_name
                    .as_deref()
                    .is_some_and(|n| !n.trim().is_empty()),
                "row {line} (product '{}'): inventory row is missing product_name",
                row.product_id
            );
            let price = row.price;
            ensure!(
                price.is_some_and(|p| p > 0.0),
                "row {line} (product '{}'): price must be present and > 0 (got {price:?})",
                row.product_id
            );
            let qty = row.starting_quantity;
            ensure!(
                qty.is_some_and(|q| q >= 0.0),
                "row {line} (product '{}'): starting_quantity must be >= 0 (got {qty:?})",
                row.product_id
            );
        } else if is_sales {
            let units = row.units_sold;
            ensure!(
                units.is_some_and(|u| u >= 0.0),
                "row {line} (product '{}'): units_sold must be >= 0 (got {units:?})",
                row.product_id
            );
        } else {
            anyhow::bail!(
                "row {line} (product '{}'): row is neither an inventory snapshot \
                 (starting_quantity) nor a sale (date + units_sold)",
                row.product_id
            );
        }
    }

    ensure!(
        inventory_rows > 0,
        "input table has no inventory rows (at least one starting_quantity is required)"
    );
    Ok(())
}
