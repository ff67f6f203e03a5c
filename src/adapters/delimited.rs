use crate::domain::model::{Cell, RecordSet};
use crate::domain::ports::SourceAdapter;
use crate::utils::error::{EtlError, Result};

/// Header row plus text cells. Empty fields are read as null.
#[derive(Debug, Clone)]
pub struct DelimitedTextAdapter {
    delimiter: u8,
}

impl DelimitedTextAdapter {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Default for DelimitedTextAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for DelimitedTextAdapter {
    fn format_name(&self) -> &'static str {
        "csv"
    }

    fn parse(&self, text: &str) -> Result<RecordSet> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(EtlError::malformed(self.format_name(), "missing header row"));
        }

        let mut data = RecordSet::new(headers)
            .map_err(|e| EtlError::malformed(self.format_name(), e.to_string()))?;

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                EtlError::malformed(self.format_name(), format!("record {}: {}", line + 1, e))
            })?;
            let cells = record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Cell::Null
                    } else {
                        Cell::text(field)
                    }
                })
                .collect();
            data.push_row(cells)?;
        }

        tracing::debug!(
            "Parsed {} delimited rows with columns {:?}",
            data.len(),
            data.columns()
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reads_all_cells_as_text() {
        let adapter = DelimitedTextAdapter::new();
        let data = adapter
            .parse("name,price\nApple,1.25\nPear,\n")
            .unwrap();

        assert_eq!(data.columns(), &["name", "price"]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.value(0, "price"), Some(&Cell::text("1.25")));
        assert_eq!(data.value(1, "price"), Some(&Cell::Null));
    }

    #[test]
    fn test_parse_with_tab_delimiter() {
        let adapter = DelimitedTextAdapter::with_delimiter(b'\t');
        let data = adapter.parse("Currency\tRate\nEUR\t0.93\n").unwrap();

        assert_eq!(data.columns(), &["Currency", "Rate"]);
        assert_eq!(data.value(0, "Rate"), Some(&Cell::text("0.93")));
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        let adapter = DelimitedTextAdapter::new();
        let err = adapter.parse("a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(err, EtlError::MalformedSource { .. }));
    }

    #[test]
    fn test_duplicate_headers_are_malformed() {
        let adapter = DelimitedTextAdapter::new();
        let err = adapter.parse("a,a\n1,2\n").unwrap_err();
        assert!(matches!(err, EtlError::MalformedSource { .. }));
    }

    #[test]
    fn test_header_only_gives_empty_set() {
        let adapter = DelimitedTextAdapter::new();
        let data = adapter.parse("a,b\n").unwrap();
        assert!(data.is_empty());
        assert_eq!(data.columns(), &["a", "b"]);
    }
}
