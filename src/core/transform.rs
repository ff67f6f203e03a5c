use crate::adapters::DelimitedTextAdapter;
use crate::core::extract::{SourceLocation, SourceReader};
use crate::domain::model::{Cell, RecordSet, ReferenceRateTable};
use crate::domain::ports::{SourceAdapter, Storage};
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a cell could not be read as a number.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingReason {
    WasNull,
    Empty,
    Unparseable(String),
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReason::WasNull => f.write_str("value was null"),
            MissingReason::Empty => f.write_str("value was empty"),
            MissingReason::Unparseable(text) => write!(f, "'{}' is not a number", text),
        }
    }
}

/// Outcome of best-effort numeric coercion for one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    Value(f64),
    Missing(MissingReason),
}

impl Coercion {
    pub fn into_cell(self) -> Cell {
        match self {
            Coercion::Value(n) => Cell::Number(n),
            Coercion::Missing(_) => Cell::Null,
        }
    }
}

pub fn coerce_cell(cell: &Cell) -> Coercion {
    match cell {
        Cell::Number(n) if n.is_finite() => Coercion::Value(*n),
        Cell::Number(n) => Coercion::Missing(MissingReason::Unparseable(n.to_string())),
        Cell::Null => Coercion::Missing(MissingReason::WasNull),
        Cell::Text(text) => {
            let cleaned: String = text.replace(['\n', '\r'], "");
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                return Coercion::Missing(MissingReason::Empty);
            }
            match cleaned.parse::<f64>() {
                Ok(n) if n.is_finite() => Coercion::Value(n),
                _ => Coercion::Missing(MissingReason::Unparseable(text.clone())),
            }
        }
    }
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub column: String,
    #[serde(default)]
    pub decimals: Option<u32>,
}

impl NumericColumn {
    /// Largest accepted `decimals`.
    pub const MAX_DECIMALS: u32 = 15;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConversion {
    pub base_column: String,
    pub targets: Vec<String>,
    /// Name of each derived column, with `{code}` replaced by the target code.
    #[serde(default)]
    pub column_template: Option<String>,
}

impl CurrencyConversion {
    pub const ROUND_DECIMALS: u32 = 2;

    pub fn derived_column_name(&self, code: &str) -> String {
        match &self.column_template {
            Some(template) => template.replace("{code}", code),
            None => format!("{}_{}", self.base_column, code),
        }
    }
}

/// Where the exchange rate table is read from, and which columns hold the
/// currency code and the multiplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSource {
    pub location: SourceLocation,
    pub code_column: String,
    pub rate_column: String,
}

impl RateSource {
    pub async fn load<S: Storage>(&self, reader: &SourceReader<S>) -> Result<ReferenceRateTable> {
        let text = reader.read_text(&self.location).await?;
        let table = DelimitedTextAdapter::new().parse(&text)?;
        let rates =
            ReferenceRateTable::from_record_set(&table, &self.code_column, &self.rate_column)?;
        tracing::info!("Loaded {} exchange rates from {}", rates.len(), self.location);
        Ok(rates)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercionSummary {
    pub column: String,
    pub parsed: usize,
    pub missing: usize,
}

#[derive(Debug)]
pub struct Transformed {
    pub records: RecordSet,
    pub coerced: Vec<CoercionSummary>,
    pub derived_columns: Vec<String>,
    pub missing_columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Transformer {
    numeric: Vec<NumericColumn>,
    currency: Option<CurrencyConversion>,
}

impl Transformer {
    pub fn new(numeric: Vec<NumericColumn>, currency: Option<CurrencyConversion>) -> Self {
        Self { numeric, currency }
    }

    pub fn currency(&self) -> Option<&CurrencyConversion> {
        self.currency.as_ref()
    }

    pub fn transform(&self, mut data: RecordSet, rates: &ReferenceRateTable) -> Result<Transformed> {
        tracing::info!("🔧 Starting transform on {} records", data.len());

        let mut coerced = Vec::new();
        let mut missing_columns = Vec::new();
        for spec in &self.numeric {
            match coerce_column(&mut data, spec)? {
                Some(summary) => coerced.push(summary),
                None => {
                    tracing::warn!("Column '{}' not found in the data", spec.column);
                    missing_columns.push(spec.column.clone());
                }
            }
        }

        let derived_columns = match &self.currency {
            Some(conversion) => add_derived_columns(&mut data, conversion, rates)?,
            None => Vec::new(),
        };

        tracing::info!("✅ Transform complete: {} records", data.len());
        Ok(Transformed {
            records: data,
            coerced,
            derived_columns,
            missing_columns,
        })
    }
}

/// Coerces one column in place. Returns `None` when the column is absent.
pub fn coerce_column(data: &mut RecordSet, spec: &NumericColumn) -> Result<Option<CoercionSummary>> {
    let Some(cells) = data.column(&spec.column) else {
        return Ok(None);
    };

    let mut summary = CoercionSummary {
        column: spec.column.clone(),
        ..Default::default()
    };
    let mut values = Vec::with_capacity(cells.len());
    for (row, cell) in cells.into_iter().enumerate() {
        let coercion = match coerce_cell(cell) {
            Coercion::Value(n) => Coercion::Value(match spec.decimals {
                Some(decimals) => round_to(n, decimals),
                None => n,
            }),
            missing => missing,
        };
        match &coercion {
            Coercion::Value(_) => summary.parsed += 1,
            Coercion::Missing(reason) => {
                summary.missing += 1;
                tracing::debug!("{} row {}: set to null, {}", spec.column, row, reason);
            }
        }
        values.push(coercion.into_cell());
    }

    data.replace_column_values(&spec.column, values)?;
    Ok(Some(summary))
}

/// Appends one `round(base * rate, 2)` column per target currency. Every
/// target code is checked first so a missing rate leaves `data` untouched.
pub fn add_derived_columns(
    data: &mut RecordSet,
    conversion: &CurrencyConversion,
    rates: &ReferenceRateTable,
) -> Result<Vec<String>> {
    let base: Vec<Option<f64>> = data
        .column(&conversion.base_column)
        .ok_or_else(|| EtlError::SchemaMismatch {
            expected: vec![conversion.base_column.clone()],
            available: data.columns().to_vec(),
        })?
        .into_iter()
        .map(|cell| match coerce_cell(cell) {
            Coercion::Value(n) => Some(n),
            Coercion::Missing(_) => None,
        })
        .collect();

    let mut plan = Vec::with_capacity(conversion.targets.len());
    for code in &conversion.targets {
        let rate = rates.get(code).ok_or_else(|| EtlError::MissingRate { code: code.clone() })?;
        let name = conversion.derived_column_name(code);
        if data.has_column(&name) || plan.iter().any(|(existing, _)| existing == &name) {
            return Err(EtlError::malformed(
                "record set",
                format!("derived column '{}' already exists", name),
            ));
        }
        plan.push((name, rate));
    }

    let mut added = Vec::with_capacity(plan.len());
    for (name, rate) in plan {
        let values = base
            .iter()
            .map(|value| {
                let converted = value
                    .map(|v| round_to(v * rate, CurrencyConversion::ROUND_DECIMALS))
                    .filter(|v| v.is_finite());
                Cell::from(converted)
            })
            .collect();
        data.add_column(name.clone(), values)?;
        added.push(name);
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_a() -> RecordSet {
        let mut data = RecordSet::new(["Name", "MC_USD_Billion"]).unwrap();
        data.push_row(vec![Cell::text("Bank A"), Cell::Number(100.0)])
            .unwrap();
        data
    }

    fn bank_conversion(targets: &[&str]) -> CurrencyConversion {
        CurrencyConversion {
            base_column: "MC_USD_Billion".to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            column_template: Some("MC_{code}_Billion".to_string()),
        }
    }

    #[test]
    fn test_bank_a_scenario() {
        let rates = ReferenceRateTable::from_pairs([("GBP", 0.8), ("EUR", 0.9)]).unwrap();
        let transformer = Transformer::new(vec![], Some(bank_conversion(&["GBP", "EUR"])));

        let result = transformer.transform(bank_a(), &rates).unwrap();
        let data = result.records;

        assert_eq!(
            data.columns(),
            &["Name", "MC_USD_Billion", "MC_GBP_Billion", "MC_EUR_Billion"]
        );
        assert_eq!(data.value(0, "MC_GBP_Billion"), Some(&Cell::Number(80.0)));
        assert_eq!(data.value(0, "MC_EUR_Billion"), Some(&Cell::Number(90.0)));
        assert_eq!(result.derived_columns, vec!["MC_GBP_Billion", "MC_EUR_Billion"]);
    }

    #[test]
    fn test_derived_values_are_rounded_to_two_places() {
        let mut data = RecordSet::new(["MC_USD_Billion"]).unwrap();
        data.push_row(vec![Cell::Number(432.92)]).unwrap();
        data.push_row(vec![Cell::Number(1.005)]).unwrap();
        let rates = ReferenceRateTable::from_pairs([("INR", 82.95), ("EUR", 1.0)]).unwrap();

        add_derived_columns(&mut data, &bank_conversion(&["INR", "EUR"]), &rates).unwrap();

        assert_eq!(data.value(0, "MC_INR_Billion"), Some(&Cell::Number(35910.71)));
        assert_eq!(
            data.value(1, "MC_EUR_Billion"),
            Some(&Cell::Number(round_to(1.005, 2)))
        );
    }

    #[test]
    fn test_null_base_propagates_to_every_derived_column() {
        let mut data = RecordSet::new(["Name", "MC_USD_Billion"]).unwrap();
        data.push_row(vec![Cell::text("Bank A"), Cell::Null]).unwrap();
        data.push_row(vec![Cell::text("Bank B"), Cell::text("n/a")])
            .unwrap();
        let rates = ReferenceRateTable::from_pairs([("GBP", 0.8), ("EUR", 0.9)]).unwrap();
        let transformer = Transformer::new(
            vec![NumericColumn {
                column: "MC_USD_Billion".to_string(),
                decimals: None,
            }],
            Some(bank_conversion(&["GBP", "EUR"])),
        );

        let result = transformer.transform(data, &rates).unwrap();
        for row in 0..2 {
            assert_eq!(result.records.value(row, "MC_GBP_Billion"), Some(&Cell::Null));
            assert_eq!(result.records.value(row, "MC_EUR_Billion"), Some(&Cell::Null));
        }
        assert_eq!(result.coerced[0].missing, 2);
    }

    #[test]
    fn test_overflowing_conversion_becomes_null() {
        let mut data = RecordSet::new(["MC_USD_Billion"]).unwrap();
        data.push_row(vec![Cell::Number(1e308)]).unwrap();
        data.push_row(vec![Cell::Number(1.0)]).unwrap();
        let rates = ReferenceRateTable::from_pairs([("ZWL", 10.0)]).unwrap();

        add_derived_columns(&mut data, &bank_conversion(&["ZWL"]), &rates).unwrap();

        assert_eq!(data.value(0, "MC_ZWL_Billion"), Some(&Cell::Null));
        assert_eq!(data.value(1, "MC_ZWL_Billion"), Some(&Cell::Number(10.0)));
    }

    #[test]
    fn test_missing_rate_writes_no_columns() {
        let mut data = bank_a();
        let rates = ReferenceRateTable::from_pairs([("GBP", 0.8), ("EUR", 0.9)]).unwrap();

        let err = add_derived_columns(&mut data, &bank_conversion(&["GBP", "INR", "EUR"]), &rates)
            .unwrap_err();

        match err {
            EtlError::MissingRate { code } => assert_eq!(code, "INR"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(data, bank_a());
    }

    #[test]
    fn test_missing_base_column_is_schema_mismatch() {
        let mut data = RecordSet::new(["Name"]).unwrap();
        let rates = ReferenceRateTable::from_pairs([("GBP", 0.8)]).unwrap();
        let err = add_derived_columns(&mut data, &bank_conversion(&["GBP"]), &rates).unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_coerce_cell_is_best_effort() {
        assert_eq!(coerce_cell(&Cell::text(" 432.92\n")), Coercion::Value(432.92));
        assert_eq!(coerce_cell(&Cell::Number(3.5)), Coercion::Value(3.5));
        assert_eq!(
            coerce_cell(&Cell::text("   ")),
            Coercion::Missing(MissingReason::Empty)
        );
        assert_eq!(coerce_cell(&Cell::Null), Coercion::Missing(MissingReason::WasNull));
        assert!(matches!(
            coerce_cell(&Cell::text("abc")),
            Coercion::Missing(MissingReason::Unparseable(_))
        ));
    }

    #[test]
    fn test_price_cleanup_rounds_and_nulls_invalid() {
        let mut data = RecordSet::new(["name", "price"]).unwrap();
        data.push_row(vec![Cell::text("Chair"), Cell::text("45.456")])
            .unwrap();
        data.push_row(vec![Cell::text("Rug"), Cell::text("n/a")]).unwrap();
        let transformer = Transformer::new(
            vec![NumericColumn {
                column: "price".to_string(),
                decimals: Some(2),
            }],
            None,
        );

        let result = transformer
            .transform(data, &ReferenceRateTable::default())
            .unwrap();

        assert_eq!(result.records.value(0, "price"), Some(&Cell::Number(45.46)));
        assert_eq!(result.records.value(1, "price"), Some(&Cell::Null));
        assert_eq!(
            result.coerced,
            vec![CoercionSummary {
                column: "price".to_string(),
                parsed: 1,
                missing: 1,
            }]
        );
    }

    #[test]
    fn test_absent_numeric_column_is_reported_not_fatal() {
        let transformer = Transformer::new(
            vec![NumericColumn {
                column: "price".to_string(),
                decimals: Some(2),
            }],
            None,
        );
        let result = transformer
            .transform(bank_a(), &ReferenceRateTable::default())
            .unwrap();

        assert_eq!(result.missing_columns, vec!["price"]);
        assert_eq!(result.records, bank_a());
    }

    #[test]
    fn test_default_derived_column_name() {
        let conversion = CurrencyConversion {
            base_column: "amount".to_string(),
            targets: vec!["GBP".to_string()],
            column_template: None,
        };
        assert_eq!(conversion.derived_column_name("GBP"), "amount_GBP");
    }
}
