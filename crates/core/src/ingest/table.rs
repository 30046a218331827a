use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// One row of the unified tabular input.
///
/// Inventory rows populate `starting_quantity` (with name, price and
/// as_of_date); sales rows populate `date` and `units_sold`. Empty CSV
/// fields deserialize to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub product_id: String,
    #[serde(default)]
    pub as_of_date: Option<NaiveDate>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub starting_quantity: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub units_sold: Option<f64>,
}

impl TableRow {
    pub fn is_inventory(&self) -> bool {
        self.starting_quantity.is_some()
    }

    pub fn is_sales(&self) -> bool {
        self.date.is_some() && self.units_sold.is_some()
    }
}

/// The validated-format unified table handed to the analytics pipeline.
#[derive(Debug, Clone, Default)]
pub struct AnalysisTable {
    pub rows: Vec<TableRow>,
}

impl AnalysisTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append another table's rows (legacy two-file mode: a separate sales
    /// CSV merged into the unified table).
    pub fn extend(&mut self, other: AnalysisTable) {
        self.rows.extend(other.rows);
    }
}

pub fn read_table<R: Read>(reader: R) -> anyhow::Result<AnalysisTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, result) in csv_reader.deserialize::<TableRow>().enumerate() {
        // +2: one for the header line, one for 1-based numbering.
        let row = result.with_context(|| format!("CSV parse error at line {}", idx + 2))?;
        rows.push(row);
    }

    anyhow::ensure!(!rows.is_empty(), "CSV contains no data rows");
    Ok(AnalysisTable { rows })
}

pub fn read_table_file(path: &Path) -> anyhow::Result<AnalysisTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_table(file).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
as_of_date,product_id,product_name,price,starting_quantity,date,units_sold
2024-12-01,P001,Widget,10.00,150,,
,P001,,,,2024-12-02,3
,P001,,,,2024-12-03,5
2024-12-01,P002,Gadget,25.00,5,,
";

    #[test]
    fn parses_mixed_inventory_and_sales_rows() {
        let table = read_table(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 4);

        let inv = &table.rows[0];
        assert!(inv.is_inventory());
        assert!(!inv.is_sales());
        assert_eq!(inv.product_id, "P001");
        assert_eq!(inv.starting_quantity, Some(150.0));
        assert_eq!(
            inv.as_of_date,
            Some(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap())
        );

        let sale = &table.rows[1];
        assert!(sale.is_sales());
        assert!(!sale.is_inventory());
        assert_eq!(sale.units_sold, Some(3.0));
        assert_eq!(
            sale.date,
            Some(NaiveDate::from_ymd_opt(2024, 12, 2).unwrap())
        );
    }

    #[test]
    fn rejects_header_only_input() {
        let csv = "as_of_date,product_id,product_name,price,starting_quantity,date,units_sold\n";
        assert!(read_table(csv.as_bytes()).is_err());
    }

    #[test]
    fn rejects_unparseable_dates_with_line_number() {
        let csv = "\
as_of_date,product_id,product_name,price,starting_quantity,date,units_sold
not-a-date,P001,Widget,10.00,150,,
";
        let err = read_table(csv.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn extend_appends_rows() {
        let mut table = read_table(SAMPLE_CSV.as_bytes()).unwrap();
        let sales_only = "\
as_of_date,product_id,product_name,price,starting_quantity,date,units_sold
,P002,,,,2024-12-05,2
";
        table.extend(read_table(sales_only.as_bytes()).unwrap());
        assert_eq!(table.len(), 5);
        assert!(table.rows[4].is_sales());
    }
}
