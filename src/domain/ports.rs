use crate::domain::model::{QueryResult, RecordSet};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Parses one raw source into a record set. Adapters do no business
/// transforms; numeric coercion belongs to the transform stage.
pub trait SourceAdapter: Send + Sync {
    fn format_name(&self) -> &'static str;
    fn parse(&self, text: &str) -> Result<RecordSet>;
}

/// Fetches raw page markup for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Query-capable relational store.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Drops and recreates `table` with the contents of `data`.
    async fn replace_table(&self, table: &str, data: &RecordSet) -> Result<()>;
    async fn query(&self, statement: &str) -> Result<QueryResult>;
    async fn close(&self);
}

/// Append-only progress log. Each call writes exactly one line.
pub trait ProgressLog: Send + Sync {
    fn append(&self, message: &str) -> Result<()>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<crate::core::extract::Extraction>;
    async fn transform(&self, data: RecordSet) -> Result<crate::core::transform::Transformed>;
    async fn load(&self, data: &RecordSet) -> Result<crate::core::load::LoadReport>;
    async fn query(&self, statement: &str) -> Result<QueryResult>;
    /// Releases run-scoped resources. Called once at the end of every run.
    async fn close(&self);
}
