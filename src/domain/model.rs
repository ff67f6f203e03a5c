use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;
use std::fmt;

/// A single typed value in a [`RecordSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Null,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            // Whole numbers keep one decimal so they read back as floats.
            Cell::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{:.1}", n)
            }
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Null => Ok(()),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map(Cell::Number).unwrap_or(Cell::Null)
    }
}

/// In-memory table shared by every stage.
///
/// Rows are stored positionally against `columns`, so every row always
/// carries exactly one cell per declared column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RecordSet {
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for column in columns {
            set.declare_column(column.into())?;
        }
        Ok(set)
    }

    /// Builds a record set from rows of `(column, cell)` pairs. The column list
    /// is the union of all names in first-seen order; absent names become null.
    pub fn from_named_rows(rows: Vec<Vec<(String, Cell)>>) -> Self {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut columns = Vec::new();
        for row in &rows {
            for (name, _) in row {
                if !index.contains_key(name) {
                    index.insert(name.clone(), columns.len());
                    columns.push(name.clone());
                }
            }
        }

        let rows = rows
            .into_iter()
            .map(|pairs| {
                let mut cells = vec![Cell::Null; columns.len()];
                for (name, cell) in pairs {
                    cells[index[&name]] = cell;
                }
                cells
            })
            .collect();

        Self { columns, rows }
    }

    fn declare_column(&mut self, name: String) -> Result<()> {
        if self.columns.contains(&name) {
            return Err(EtlError::malformed(
                "record set",
                format!("duplicate column '{}'", name),
            ));
        }
        self.columns.push(name);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn push_row(&mut self, cells: Vec<Cell>) -> Result<()> {
        if cells.len() != self.columns.len() {
            return Err(EtlError::malformed(
                "record set",
                format!(
                    "row has {} cells but {} columns are declared",
                    cells.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(cells);
        Ok(())
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|cells| &cells[index])
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|cells| &cells[index]).collect())
    }

    /// Appends a column at the end of the column list.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Cell>) -> Result<()> {
        let name = name.into();
        if values.len() != self.rows.len() {
            return Err(EtlError::malformed(
                "record set",
                format!(
                    "column '{}' has {} values for {} rows",
                    name,
                    values.len(),
                    self.rows.len()
                ),
            ));
        }
        self.declare_column(name)?;
        for (cells, value) in self.rows.iter_mut().zip(values) {
            cells.push(value);
        }
        Ok(())
    }

    /// Overwrites the values of an existing column in place.
    pub fn replace_column_values(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        let index = self.column_index(name).ok_or_else(|| EtlError::SchemaMismatch {
            expected: vec![name.to_string()],
            available: self.columns.clone(),
        })?;
        if values.len() != self.rows.len() {
            return Err(EtlError::malformed(
                "record set",
                format!("column '{}' replacement has wrong length", name),
            ));
        }
        for (cells, value) in self.rows.iter_mut().zip(values) {
            cells[index] = value;
        }
        Ok(())
    }

    /// Row-wise concatenation. Columns of `other` that are new are appended;
    /// cells missing on either side become null.
    pub fn concat(mut self, other: RecordSet) -> RecordSet {
        let mut mapping = Vec::with_capacity(other.columns.len());
        for column in other.columns {
            match self.column_index(&column) {
                Some(index) => mapping.push(index),
                None => {
                    mapping.push(self.columns.len());
                    self.columns.push(column);
                    for cells in &mut self.rows {
                        cells.push(Cell::Null);
                    }
                }
            }
        }

        let width = self.columns.len();
        for row in other.rows {
            let mut cells = vec![Cell::Null; width];
            for (cell, &target) in row.into_iter().zip(&mapping) {
                cells[target] = cell;
            }
            self.rows.push(cells);
        }
        self
    }
}

/// Currency code to multiplier relative to a fixed base currency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceRateTable {
    rates: HashMap<String, f64>,
}

impl ReferenceRateTable {
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut rates = HashMap::new();
        for (code, rate) in pairs {
            let code = code.into().trim().to_uppercase();
            if !rate.is_finite() || rate <= 0.0 {
                return Err(EtlError::malformed(
                    "rate table",
                    format!("rate for {} must be a positive number, got {}", code, rate),
                ));
            }
            if rates.insert(code.clone(), rate).is_some() {
                return Err(EtlError::malformed(
                    "rate table",
                    format!("duplicate currency code {}", code),
                ));
            }
        }
        Ok(Self { rates })
    }

    /// Reads a rate table out of a two-column record set such as
    /// `Currency,Rate`.
    pub fn from_record_set(data: &RecordSet, code_column: &str, rate_column: &str) -> Result<Self> {
        let missing: Vec<String> = [code_column, rate_column]
            .iter()
            .filter(|c| !data.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(EtlError::SchemaMismatch {
                expected: missing,
                available: data.columns().to_vec(),
            });
        }

        let mut pairs = Vec::with_capacity(data.len());
        for row in 0..data.len() {
            let code = match data.value(row, code_column) {
                Some(Cell::Text(code)) => code.clone(),
                _ => {
                    return Err(EtlError::malformed(
                        "rate table",
                        format!("row {} has no currency code", row + 1),
                    ))
                }
            };
            let rate = match data.value(row, rate_column) {
                Some(Cell::Number(n)) => *n,
                Some(Cell::Text(text)) => text.trim().parse::<f64>().map_err(|_| {
                    EtlError::malformed(
                        "rate table",
                        format!("rate '{}' for {} is not a number", text, code),
                    )
                })?,
                _ => {
                    return Err(EtlError::malformed(
                        "rate table",
                        format!("rate for {} is missing", code),
                    ))
                }
            };
            pairs.push((code, rate));
        }
        Self::from_pairs(pairs)
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.rates.get(&code.to_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Rows returned by a store query. Column names are informational.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Transform,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "Extract",
            Stage::Transform => "Transform",
            Stage::Load => "Load",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed(Stage),
}

impl PipelineState {
    /// Happy-path successor. Terminal states stay where they are.
    pub fn next(self) -> Self {
        match self {
            PipelineState::Idle => PipelineState::Extracting,
            PipelineState::Extracting => PipelineState::Transforming,
            PipelineState::Transforming => PipelineState::Loading,
            PipelineState::Loading => PipelineState::Done,
            terminal => terminal,
        }
    }

    pub fn fail(self) -> Self {
        match self.stage() {
            Some(stage) => PipelineState::Failed(stage),
            None => self,
        }
    }

    pub fn stage(self) -> Option<Stage> {
        match self {
            PipelineState::Extracting => Some(Stage::Extract),
            PipelineState::Transforming => Some(Stage::Transform),
            PipelineState::Loading => Some(Stage::Load),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}
