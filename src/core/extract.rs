use crate::domain::model::RecordSet;
use crate::domain::ports::{PageFetcher, SourceAdapter, Storage};
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a source's raw text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    File(String),
    Url(String),
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::File(path) => f.write_str(path),
            SourceLocation::Url(url) => f.write_str(url),
        }
    }
}

/// Reads raw source text from files through [`Storage`] and from URLs
/// through a [`PageFetcher`].
pub struct SourceReader<S: Storage> {
    storage: S,
    fetcher: Arc<dyn PageFetcher>,
}

impl<S: Storage> SourceReader<S> {
    pub fn new(storage: S, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { storage, fetcher }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn read_text(&self, location: &SourceLocation) -> Result<String> {
        match location {
            SourceLocation::Url(url) => self.fetcher.fetch(url).await,
            SourceLocation::File(path) => {
                let bytes = self.storage.read_file(path).await?;
                String::from_utf8(bytes).map_err(|e| {
                    EtlError::malformed("text", format!("{} is not valid UTF-8: {}", path, e))
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPolicy {
    /// The first failing source aborts the whole extraction.
    #[default]
    Strict,
    /// Failing sources are skipped and reported; at least one must succeed.
    Lenient,
}

pub struct SourceSpec {
    pub name: String,
    pub adapter: Box<dyn SourceAdapter>,
    pub location: SourceLocation,
}

impl SourceSpec {
    pub fn new(
        name: impl Into<String>,
        adapter: Box<dyn SourceAdapter>,
        location: SourceLocation,
    ) -> Self {
        Self {
            name: name.into(),
            adapter,
            location,
        }
    }
}

#[derive(Debug)]
pub struct SkippedSource {
    pub name: String,
    pub error: EtlError,
}

#[derive(Debug)]
pub struct Extraction {
    pub records: RecordSet,
    pub sources_read: usize,
    pub skipped: Vec<SkippedSource>,
}

pub struct Extractor {
    sources: Vec<SourceSpec>,
    policy: ExtractionPolicy,
}

impl Extractor {
    pub fn new(sources: Vec<SourceSpec>, policy: ExtractionPolicy) -> Self {
        Self { sources, policy }
    }

    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    pub fn policy(&self) -> ExtractionPolicy {
        self.policy
    }

    async fn extract_one<S: Storage>(
        &self,
        reader: &SourceReader<S>,
        source: &SourceSpec,
    ) -> Result<RecordSet> {
        let text = reader.read_text(&source.location).await?;
        source.adapter.parse(&text)
    }

    /// Reads every source in order and concatenates the results row-wise.
    pub async fn extract<S: Storage>(&self, reader: &SourceReader<S>) -> Result<Extraction> {
        let mut merged: Option<RecordSet> = None;
        let mut sources_read = 0;
        let mut skipped = Vec::new();

        for source in &self.sources {
            tracing::debug!(
                "Extracting {} source '{}' from {}",
                source.adapter.format_name(),
                source.name,
                source.location
            );
            match self.extract_one(reader, source).await {
                Ok(data) => {
                    tracing::info!("📊 Source '{}' produced {} records", source.name, data.len());
                    sources_read += 1;
                    merged = Some(match merged {
                        Some(acc) => acc.concat(data),
                        None => data,
                    });
                }
                Err(error) => match self.policy {
                    ExtractionPolicy::Strict => {
                        return Err(EtlError::Extraction {
                            source_name: source.name.clone(),
                            cause: Box::new(error),
                        });
                    }
                    ExtractionPolicy::Lenient => {
                        tracing::warn!("Skipping source '{}': {}", source.name, error);
                        skipped.push(SkippedSource {
                            name: source.name.clone(),
                            error,
                        });
                    }
                },
            }
        }

        if sources_read == 0 {
            if let Some(last) = skipped.pop() {
                return Err(EtlError::Extraction {
                    source_name: last.name,
                    cause: Box::new(last.error),
                });
            }
        }

        Ok(Extraction {
            records: merged.unwrap_or_default(),
            sources_read,
            skipped,
        })
    }
}
