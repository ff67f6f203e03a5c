use crate::domain::model::{QueryResult, RecordSet};
use crate::domain::ports::{Storage, TableStore};
use crate::utils::error::{EtlError, Result};

/// Serializes a record set as CSV: header row in column order, no index.
pub fn to_csv_bytes(data: &RecordSet) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(data.columns())?;
    for row in data.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub csv_path: Option<String>,
    pub table: Option<String>,
    pub rows: usize,
}

pub struct Loader<S: Storage> {
    storage: S,
    csv_path: Option<String>,
    store: Option<Box<dyn TableStore>>,
    table: String,
}

impl<S: Storage> Loader<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            csv_path: None,
            store: None,
            table: String::new(),
        }
    }

    pub fn with_csv_path(mut self, path: impl Into<String>) -> Self {
        self.csv_path = Some(path.into());
        self
    }

    pub fn with_store(mut self, store: Box<dyn TableStore>, table: impl Into<String>) -> Self {
        self.store = Some(store);
        self.table = table.into();
        self
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub async fn write_to_file(&self, data: &RecordSet, path: &str) -> Result<()> {
        let bytes = to_csv_bytes(data)?;
        self.storage.write_file(path, &bytes).await?;
        tracing::info!("💾 Wrote {} rows to {}", data.len(), path);
        Ok(())
    }

    pub async fn write_to_store(&self, data: &RecordSet, table: &str) -> Result<()> {
        let store = self.store.as_ref().ok_or_else(|| EtlError::StoreError {
            table: table.to_string(),
            message: "no store configured".to_string(),
        })?;
        store.replace_table(table, data).await?;
        tracing::info!("💾 Replaced table {} with {} rows", table, data.len());
        Ok(())
    }

    /// Writes to every configured sink.
    pub async fn load(&self, data: &RecordSet) -> Result<LoadReport> {
        let mut report = LoadReport {
            rows: data.len(),
            ..Default::default()
        };

        if let Some(path) = &self.csv_path {
            self.write_to_file(data, path).await?;
            report.csv_path = Some(path.clone());
        }
        if self.store.is_some() {
            self.write_to_store(data, &self.table).await?;
            report.table = Some(self.table.clone());
        }
        Ok(report)
    }

    pub async fn try_query(&self, statement: &str) -> Result<QueryResult> {
        let store = self.store.as_ref().ok_or_else(|| EtlError::QueryError {
            statement: statement.to_string(),
            message: "no store configured".to_string(),
        })?;
        store.query(statement).await
    }

    /// Diagnostic passthrough: failures are logged and yield an empty result.
    pub async fn run_query(&self, statement: &str) -> QueryResult {
        tracing::debug!("Executing Query: {}", statement);
        match self.try_query(statement).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Error occurred while executing query: {}", e);
                QueryResult::default()
            }
        }
    }

    pub async fn close(&self) {
        if let Some(store) = &self.store {
            store.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{DelimitedTextAdapter, LocalStorage, SqliteStore};
    use crate::core::transform::{coerce_cell, Coercion};
    use crate::domain::model::Cell;
    use crate::domain::ports::SourceAdapter;
    use tempfile::TempDir;

    fn sample() -> RecordSet {
        let mut data = RecordSet::new(["Name", "MC_USD_Billion", "MC_GBP_Billion"]).unwrap();
        data.push_row(vec![
            Cell::text("Bank A"),
            Cell::Number(100.0),
            Cell::Number(80.0),
        ])
        .unwrap();
        data.push_row(vec![Cell::text("Bank, B"), Cell::Number(90.5), Cell::Null])
            .unwrap();
        data
    }

    fn local_loader(temp_dir: &TempDir) -> Loader<LocalStorage> {
        Loader::new(LocalStorage::new(
            temp_dir.path().to_str().unwrap().to_string(),
        ))
    }

    #[test]
    fn test_csv_layout() {
        let bytes = to_csv_bytes(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "Name,MC_USD_Billion,MC_GBP_Billion\nBank A,100.0,80.0\n\"Bank, B\",90.5,\n"
        );
    }

    #[tokio::test]
    async fn test_file_round_trip_through_delimited_adapter() {
        let temp_dir = TempDir::new().unwrap();
        let loader = local_loader(&temp_dir);
        let data = sample();

        loader.write_to_file(&data, "out/banks.csv").await.unwrap();
        let text = std::fs::read_to_string(temp_dir.path().join("out/banks.csv")).unwrap();
        let reread = DelimitedTextAdapter::new().parse(&text).unwrap();

        assert_eq!(reread.columns(), data.columns());
        assert_eq!(reread.len(), data.len());
        for (original, read) in data.rows().iter().zip(reread.rows()) {
            for (a, b) in original.iter().zip(read) {
                match (a, coerce_cell(b)) {
                    (Cell::Number(x), Coercion::Value(y)) => assert_eq!(*x, y),
                    (Cell::Null, _) => assert_eq!(b, &Cell::Null),
                    (Cell::Text(x), _) => assert_eq!(b, &Cell::Text(x.clone())),
                    (a, b) => panic!("mismatch: {a:?} vs {b:?}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_write_to_file_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let loader = local_loader(&temp_dir);

        loader.write_to_file(&sample(), "banks.csv").await.unwrap();
        let single = RecordSet::new(["only"]).unwrap();
        loader.write_to_file(&single, "banks.csv").await.unwrap();

        let text = std::fs::read_to_string(temp_dir.path().join("banks.csv")).unwrap();
        assert_eq!(text, "only\n");
    }

    #[tokio::test]
    async fn test_store_write_twice_keeps_second_input() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        let loader = local_loader(&temp_dir).with_store(Box::new(store), "Largest_banks");

        loader.write_to_store(&sample(), "Largest_banks").await.unwrap();
        let mut second = RecordSet::new(["Name", "MC_USD_Billion", "MC_GBP_Billion"]).unwrap();
        second
            .push_row(vec![Cell::text("Bank C"), Cell::Number(1.0), Cell::Number(0.8)])
            .unwrap();
        loader.write_to_store(&second, "Largest_banks").await.unwrap();

        let result = loader.run_query("SELECT * FROM Largest_banks").await;
        assert_eq!(result.rows, second.rows().to_vec());
    }

    #[tokio::test]
    async fn test_run_query_suppresses_errors() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        let loader = local_loader(&temp_dir).with_store(Box::new(store), "t");

        let result = loader.run_query("SELECT nope FROM nowhere").await;
        assert!(result.is_empty());
        assert!(loader.try_query("SELECT nope FROM nowhere").await.is_err());
    }

    #[tokio::test]
    async fn test_load_writes_all_sinks() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        let loader = local_loader(&temp_dir)
            .with_csv_path("Largest_banks_data.csv")
            .with_store(Box::new(store), "Largest_banks");

        let report = loader.load(&sample()).await.unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.csv_path.as_deref(), Some("Largest_banks_data.csv"));
        assert_eq!(report.table.as_deref(), Some("Largest_banks"));
        assert!(temp_dir.path().join("Largest_banks_data.csv").exists());

        let count = loader.run_query("SELECT COUNT(*) FROM Largest_banks").await;
        assert_eq!(count.rows, vec![vec![Cell::Number(2.0)]]);
        loader.close().await;
    }
}
