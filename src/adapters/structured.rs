use crate::domain::model::{Cell, RecordSet};
use crate::domain::ports::SourceAdapter;
use crate::utils::error::{EtlError, Result};
use serde_json::Value;

/// JSON array of flat objects; the union of keys becomes the column set.
#[derive(Debug, Clone, Default)]
pub struct StructuredObjectAdapter;

impl StructuredObjectAdapter {
    pub fn new() -> Self {
        Self
    }

    fn to_cell(&self, key: &str, value: Value) -> Result<Cell> {
        match value {
            Value::Null => Ok(Cell::Null),
            Value::String(s) if s.is_empty() => Ok(Cell::Null),
            Value::String(s) => Ok(Cell::Text(s)),
            Value::Number(n) => n.as_f64().map(Cell::Number).ok_or_else(|| {
                EtlError::malformed(self.format_name(), format!("number out of range in '{}'", key))
            }),
            Value::Bool(b) => Ok(Cell::Text(b.to_string())),
            Value::Array(_) | Value::Object(_) => Err(EtlError::malformed(
                self.format_name(),
                format!("field '{}' is nested; only flat objects are supported", key),
            )),
        }
    }
}

impl SourceAdapter for StructuredObjectAdapter {
    fn format_name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, text: &str) -> Result<RecordSet> {
        let json_data: Value = serde_json::from_str(text)
            .map_err(|e| EtlError::malformed(self.format_name(), e.to_string()))?;

        let Value::Array(items) = json_data else {
            return Err(EtlError::malformed(
                self.format_name(),
                "top level must be an array of objects",
            ));
        };

        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(obj) = item else {
                return Err(EtlError::malformed(
                    self.format_name(),
                    format!("element {} is not an object", index),
                ));
            };
            let mut row = Vec::with_capacity(obj.len());
            for (key, value) in obj {
                let cell = self.to_cell(&key, value)?;
                row.push((key, cell));
            }
            rows.push(row);
        }

        Ok(RecordSet::from_named_rows(rows))
    }
}
