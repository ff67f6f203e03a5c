use crate::adapters::{HttpFetcher, SqliteStore};
use crate::config::toml_config::TomlConfig;
use crate::core::extract::{Extraction, Extractor, SourceReader};
use crate::core::load::{LoadReport, Loader};
use crate::core::transform::{RateSource, Transformed, Transformer};
use crate::core::{PageFetcher, Pipeline, QueryResult, RecordSet, ReferenceRateTable, Storage, TableStore};
use crate::utils::error::Result;
use std::sync::Arc;

/// Pipeline assembled from a [`TomlConfig`]: configured sources, numeric
/// cleanup and currency conversion, CSV and/or SQLite sinks.
pub struct TabularPipeline<S: Storage> {
    reader: SourceReader<S>,
    extractor: Extractor,
    transformer: Transformer,
    rates: Option<RateSource>,
    loader: Loader<S>,
}

impl<S: Storage + Clone> TabularPipeline<S> {
    pub fn new(
        reader: SourceReader<S>,
        extractor: Extractor,
        transformer: Transformer,
        rates: Option<RateSource>,
        loader: Loader<S>,
    ) -> Self {
        Self {
            reader,
            extractor,
            transformer,
            rates,
            loader,
        }
    }

    /// Builds the pipeline with the real HTTP fetcher and, when
    /// `[load.database]` is set, an SQLite connection opened for this run.
    pub async fn from_config(config: &TomlConfig, storage: S) -> Result<Self> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(config.timeout_seconds())?);
        let store: Option<Box<dyn TableStore>> = match &config.load.database {
            Some(db) => Some(Box::new(SqliteStore::connect(&db.url).await?)),
            None => None,
        };
        Self::from_config_with(config, storage, fetcher, store)
    }

    /// Same as [`TabularPipeline::from_config`] with injected collaborators.
    pub fn from_config_with(
        config: &TomlConfig,
        storage: S,
        fetcher: Arc<dyn PageFetcher>,
        store: Option<Box<dyn TableStore>>,
    ) -> Result<Self> {
        let extractor = Extractor::new(config.source_specs()?, config.extract.policy);
        let transformer = Transformer::new(
            config.transform.numeric.clone(),
            config
                .transform
                .currency
                .as_ref()
                .map(|currency| currency.conversion.clone()),
        );

        let mut loader = Loader::new(storage.clone());
        if let Some(path) = &config.load.csv_path {
            loader = loader.with_csv_path(path.clone());
        }
        if let (Some(db), Some(store)) = (&config.load.database, store) {
            loader = loader.with_store(store, db.table.clone());
        }

        Ok(Self::new(
            SourceReader::new(storage, fetcher),
            extractor,
            transformer,
            config.rate_source()?,
            loader,
        ))
    }

    pub fn loader(&self) -> &Loader<S> {
        &self.loader
    }
}

#[async_trait::async_trait]
impl<S: Storage + Clone> Pipeline for TabularPipeline<S> {
    async fn extract(&self) -> Result<Extraction> {
        tracing::info!(
            "🚀 Extracting from {} sources ({:?} policy)",
            self.extractor.sources().len(),
            self.extractor.policy()
        );
        let extraction = self.extractor.extract(&self.reader).await?;
        tracing::info!("📊 Extracted {} records", extraction.records.len());
        Ok(extraction)
    }

    async fn transform(&self, data: RecordSet) -> Result<Transformed> {
        // Rates are read once per run, only when a conversion is configured.
        let rates = match &self.rates {
            Some(source) if self.transformer.currency().is_some() => {
                source.load(&self.reader).await?
            }
            _ => ReferenceRateTable::default(),
        };
        self.transformer.transform(data, &rates)
    }

    async fn load(&self, data: &RecordSet) -> Result<LoadReport> {
        self.loader.load(data).await
    }

    async fn query(&self, statement: &str) -> Result<QueryResult> {
        self.loader.try_query(statement).await
    }

    async fn close(&self) {
        self.loader.close().await;
    }
}
