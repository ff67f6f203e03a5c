use crate::domain::model::{Cell, RecordSet};
use crate::domain::ports::SourceAdapter;
use crate::utils::error::{EtlError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// XML document whose root holds repeating record elements:
///
/// ```xml
/// <records>
///   <record><name>Desk</name><price>120.5</price></record>
/// </records>
/// ```
///
/// Every child tag of a record becomes a column.
#[derive(Debug, Clone)]
pub struct HierarchicalMarkupAdapter {
    record_tag: String,
}

impl HierarchicalMarkupAdapter {
    pub fn new() -> Self {
        Self::with_record_tag("record")
    }

    pub fn with_record_tag(record_tag: impl Into<String>) -> Self {
        Self {
            record_tag: record_tag.into(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> EtlError {
        EtlError::malformed(self.format_name(), reason)
    }
}

impl Default for HierarchicalMarkupAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn text_cell(text: String) -> Cell {
    if text.is_empty() {
        Cell::Null
    } else {
        Cell::Text(text)
    }
}

impl SourceAdapter for HierarchicalMarkupAdapter {
    fn format_name(&self) -> &'static str {
        "xml"
    }

    fn parse(&self, text: &str) -> Result<RecordSet> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        // depth 1 = root, 2 = record, 3 = field
        let mut depth = 0usize;
        let mut saw_root = false;
        let mut saw_record = false;
        let mut rows: Vec<Vec<(String, Cell)>> = Vec::new();
        let mut current: Option<Vec<(String, Cell)>> = None;
        let mut field: Option<(String, String)> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                self.error(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;
            match event {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    depth += 1;
                    match depth {
                        1 => saw_root = true,
                        2 if name == self.record_tag => {
                            saw_record = true;
                            current = Some(Vec::new());
                        }
                        3 if current.is_some() => field = Some((name, String::new())),
                        d if d > 3 && current.is_some() => {
                            return Err(self.error(format!(
                                "element <{}> is nested inside a field",
                                name
                            )));
                        }
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    match depth + 1 {
                        1 => saw_root = true,
                        2 if name == self.record_tag => {
                            saw_record = true;
                            rows.push(Vec::new());
                        }
                        3 => {
                            if let Some(row) = current.as_mut() {
                                row.push((name, Cell::Null));
                            }
                        }
                        _ => {}
                    }
                }
                Event::Text(t) => {
                    if let Some((_, buf)) = field.as_mut() {
                        let value = t.unescape().map_err(|e| self.error(e.to_string()))?;
                        buf.push_str(&value);
                    }
                }
                Event::CData(c) => {
                    if let Some((_, buf)) = field.as_mut() {
                        buf.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::End(_) => {
                    match depth {
                        3 => {
                            if let (Some(row), Some((name, value))) = (current.as_mut(), field.take())
                            {
                                // A repeated tag inside one record keeps the last value.
                                row.retain(|(existing, _)| existing != &name);
                                row.push((name, text_cell(value)));
                            }
                        }
                        2 => {
                            if let Some(row) = current.take() {
                                rows.push(row);
                            }
                        }
                        _ => {}
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(self.error("document has no root element"));
        }
        if depth != 0 {
            return Err(self.error("document ended inside an open element"));
        }
        if !saw_record {
            return Err(self.error(format!(
                "expected repeating <{}> elements under the root",
                self.record_tag
            )));
        }

        Ok(RecordSet::from_named_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_become_columns() {
        let xml = r#"<?xml version="1.0"?>
<records>
  <record><name>Desk</name><price>120.5</price></record>
  <record><name>Lamp &amp; Bulb</name><colour>blue</colour></record>
</records>"#;

        let data = HierarchicalMarkupAdapter::new().parse(xml).unwrap();

        assert_eq!(data.columns(), &["name", "price", "colour"]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.value(0, "price"), Some(&Cell::text("120.5")));
        assert_eq!(data.value(1, "name"), Some(&Cell::text("Lamp & Bulb")));
        assert_eq!(data.value(1, "price"), Some(&Cell::Null));
    }

    #[test]
    fn test_empty_fields_are_null() {
        let xml = "<records><record><name>Desk</name><price/><note></note></record></records>";
        let data = HierarchicalMarkupAdapter::new().parse(xml).unwrap();

        assert_eq!(data.value(0, "price"), Some(&Cell::Null));
        assert_eq!(data.value(0, "note"), Some(&Cell::Null));
    }

    #[test]
    fn test_missing_record_elements_is_malformed() {
        let xml = "<records><item><name>Desk</name></item></records>";
        let err = HierarchicalMarkupAdapter::new().parse(xml).unwrap_err();

        assert!(matches!(err, EtlError::MalformedSource { .. }));
        assert!(err.to_string().contains("<record>"));
    }

    #[test]
    fn test_custom_record_tag() {
        let xml = "<rows><row><id>7</id></row></rows>";
        let data = HierarchicalMarkupAdapter::with_record_tag("row")
            .parse(xml)
            .unwrap();
        assert_eq!(data.value(0, "id"), Some(&Cell::text("7")));
    }

    #[test]
    fn test_unbalanced_and_nested_documents_fail() {
        let adapter = HierarchicalMarkupAdapter::new();
        assert!(adapter.parse("<records><record><a>1</b></record></records>").is_err());
        assert!(adapter
            .parse("<records><record><a><b>1</b></a></record></records>")
            .is_err());
        assert!(adapter.parse("").is_err());
    }
}
