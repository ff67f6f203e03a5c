use crate::domain::model::{Cell, RecordSet};
use crate::domain::ports::SourceAdapter;
use crate::utils::error::{EtlError, Result};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Header to pick from the page and the column name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub header: String,
    pub rename: String,
}

impl ColumnSelection {
    pub fn new(header: impl Into<String>, rename: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            rename: rename.into(),
        }
    }
}

/// Parses the first `<table>` carrying a CSS class marker out of an
/// already-fetched page and keeps only the selected columns.
#[derive(Debug, Clone)]
pub struct HtmlTableAdapter {
    table_class: String,
    columns: Vec<ColumnSelection>,
}

impl HtmlTableAdapter {
    pub fn new(table_class: impl Into<String>, columns: Vec<ColumnSelection>) -> Self {
        Self {
            table_class: table_class.into(),
            columns,
        }
    }

    /// The largest-banks table: `Bank name` and `Market cap (US$ billion)`.
    pub fn largest_banks() -> Self {
        Self::new(
            "wikitable",
            vec![
                ColumnSelection::new("Bank name", "Name"),
                ColumnSelection::new("Market cap (US$ billion)", "MC_USD_Billion"),
            ],
        )
    }

    pub fn table_class(&self) -> &str {
        &self.table_class
    }

    pub fn columns(&self) -> &[ColumnSelection] {
        &self.columns
    }

    fn selector(&self, css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| EtlError::InvalidConfigValueError {
            field: "table_class".to_string(),
            value: self.table_class.clone(),
            reason: e.to_string(),
        })
    }
}

/// Lower-cases and drops all whitespace so `Market cap\n(US$ billion)`
/// matches `market cap (us$ billion)`.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn row_cells(row: ElementRef<'_>) -> Vec<(bool, String)> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter_map(|cell| match cell.value().name() {
            "th" => Some((true, cell_text(cell))),
            "td" => Some((false, cell_text(cell))),
            _ => None,
        })
        .collect()
}

impl SourceAdapter for HtmlTableAdapter {
    fn format_name(&self) -> &'static str {
        "html"
    }

    fn parse(&self, text: &str) -> Result<RecordSet> {
        let document = Html::parse_document(text);
        let table_selector = self.selector(&format!("table.{}", self.table_class))?;
        let row_selector = self.selector("tr")?;

        let table = document.select(&table_selector).next().ok_or_else(|| {
            EtlError::malformed(
                self.format_name(),
                format!("no <table class=\"{}\"> found", self.table_class),
            )
        })?;

        let mut headers: Option<Vec<String>> = None;
        let mut body: Vec<Vec<String>> = Vec::new();
        for row in table.select(&row_selector) {
            let cells = row_cells(row);
            if cells.is_empty() {
                continue;
            }
            if headers.is_none() && cells.iter().all(|(is_header, _)| *is_header) {
                headers = Some(cells.into_iter().map(|(_, text)| text).collect());
            } else if headers.is_some() && cells.iter().any(|(is_header, _)| !*is_header) {
                body.push(cells.into_iter().map(|(_, text)| text).collect());
            }
        }
        let headers = headers.unwrap_or_default();
        tracing::debug!("Columns in the table: {:?}", headers);

        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut positions = Vec::with_capacity(self.columns.len());
        let mut missing = Vec::new();
        for selection in &self.columns {
            let wanted = normalize_header(&selection.header);
            match normalized.iter().position(|h| *h == wanted) {
                Some(index) => positions.push(index),
                None => missing.push(selection.header.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(EtlError::SchemaMismatch {
                expected: missing,
                available: headers,
            });
        }

        let mut data = RecordSet::new(self.columns.iter().map(|c| c.rename.clone()))?;
        for cells in body {
            if cells.len() < headers.len() {
                tracing::debug!("Short table row with {} cells, padding with nulls", cells.len());
            }
            let row = positions
                .iter()
                .map(|&index| match cells.get(index) {
                    Some(text) if !text.is_empty() => Cell::text(text.as_str()),
                    _ => Cell::Null,
                })
                .collect();
            data.push_row(row)?;
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<table class="infobox"><tr><th>Ignore</th></tr></table>
<table class="wikitable sortable">
  <tbody>
    <tr><th>Rank</th><th>Bank name</th><th>Market cap<br>(US$ billion)</th></tr>
    <tr><td>1</td><td><a href="/jpm">JPMorgan Chase</a></td><td>432.92
</td></tr>
    <tr><td>2</td><td>Bank of America</td><td>231.52</td></tr>
  </tbody>
</table>
<table class="wikitable"><tr><th>Other</th></tr><tr><td>x</td></tr></table>
</body></html>"#;

    #[test]
    fn test_selects_and_renames_columns_from_first_table() {
        let data = HtmlTableAdapter::largest_banks().parse(PAGE).unwrap();

        assert_eq!(data.columns(), &["Name", "MC_USD_Billion"]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.value(0, "Name"), Some(&Cell::text("JPMorgan Chase")));
        assert_eq!(data.value(0, "MC_USD_Billion"), Some(&Cell::text("432.92")));
        assert_eq!(data.value(1, "Name"), Some(&Cell::text("Bank of America")));
    }

    #[test]
    fn test_missing_header_is_schema_mismatch() {
        let page = r#"<table class="wikitable"><tr><th>Rank</th><th>Name</th></tr>
            <tr><td>1</td><td>A</td></tr></table>"#;
        let err = HtmlTableAdapter::largest_banks().parse(page).unwrap_err();

        match err {
            EtlError::SchemaMismatch {
                expected,
                available,
            } => {
                assert_eq!(expected, vec!["Bank name", "Market cap (US$ billion)"]);
                assert_eq!(available, vec!["Rank", "Name"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_table_is_malformed() {
        let err = HtmlTableAdapter::largest_banks()
            .parse("<html><body><p>nothing</p></body></html>")
            .unwrap_err();
        assert!(matches!(err, EtlError::MalformedSource { .. }));
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(
            normalize_header(" Market cap\n(US$ Billion) "),
            normalize_header("market cap (us$ billion)")
        );
    }
}
