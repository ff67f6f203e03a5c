use crate::core::Pipeline;
use crate::domain::model::{PipelineState, QueryResult, RecordSet, Stage};
use crate::domain::ports::ProgressLog;
use crate::utils::error::EtlError;
use std::fmt;

/// Structured progress events. Each one becomes a single progress-log line.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted,
    StageStarted(Stage),
    StageCompleted { stage: Stage, summary: String },
    StageFailed { stage: Stage, error: String },
    SourceSkipped { source: String, error: String },
    ColumnMissing { column: String },
    QueryExecuted { statement: String, rows: usize },
    QueryFailed { statement: String, error: String },
    RunFinished { state: PipelineState },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::RunStarted => f.write_str("ETL Process Started"),
            PipelineEvent::StageStarted(stage) => match stage {
                Stage::Extract => f.write_str("Extracting data..."),
                Stage::Transform => f.write_str("Transforming data..."),
                Stage::Load => f.write_str("Loading data..."),
            },
            PipelineEvent::StageCompleted { summary, .. } => f.write_str(summary),
            PipelineEvent::StageFailed { stage, error } => {
                write!(f, "{} stage failed: {}", stage, error)
            }
            PipelineEvent::SourceSkipped { source, error } => {
                write!(f, "Skipping source '{}': {}", source, error)
            }
            PipelineEvent::ColumnMissing { column } => {
                write!(f, "Column '{}' not found in the data.", column)
            }
            PipelineEvent::QueryExecuted { statement, rows } => {
                write!(f, "Executing Query: {} ({} rows)", statement, rows)
            }
            PipelineEvent::QueryFailed { statement, error } => {
                write!(f, "Error occurred while executing query {}: {}", statement, error)
            }
            PipelineEvent::RunFinished { state } => match state {
                PipelineState::Done => f.write_str("ETL Process Finished"),
                PipelineState::Failed(stage) => write!(f, "ETL Process Failed during {}", stage),
                other => write!(f, "ETL Process stopped in state {:?}", other),
            },
        }
    }
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: EtlError,
}

#[derive(Debug)]
pub struct QueryReport {
    pub statement: String,
    pub result: QueryResult,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub state: PipelineState,
    pub records: Option<RecordSet>,
    pub queries: Vec<QueryReport>,
    pub failure: Option<StageFailure>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
    }
}

/// Sequences extract, transform and load with a failure boundary per stage.
pub struct PipelineRunner<P: Pipeline> {
    pipeline: P,
    progress: Box<dyn ProgressLog>,
    queries: Vec<String>,
    state: PipelineState,
}

impl<P: Pipeline> PipelineRunner<P> {
    pub fn new(pipeline: P, progress: Box<dyn ProgressLog>) -> Self {
        Self {
            pipeline,
            progress,
            queries: Vec::new(),
            state: PipelineState::Idle,
        }
    }

    /// Diagnostic statements run against the store after a successful load.
    pub fn with_queries(mut self, queries: Vec<String>) -> Self {
        self.queries = queries;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::StageFailed { .. } | PipelineEvent::QueryFailed { .. } => {
                tracing::error!("❌ {}", event)
            }
            PipelineEvent::SourceSkipped { .. } | PipelineEvent::ColumnMissing { .. } => {
                tracing::warn!("{}", event)
            }
            _ => tracing::info!("{}", event),
        }
        if let Err(e) = self.progress.append(&event.to_string()) {
            tracing::warn!("Could not write progress log entry: {}", e);
        }
    }

    fn advance(&mut self) {
        let next = self.state.next();
        tracing::debug!("Pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
        if let Some(stage) = next.stage() {
            self.emit(PipelineEvent::StageStarted(stage));
        }
    }

    fn fail(&mut self, error: EtlError) -> StageFailure {
        let stage = self.state.stage().unwrap_or(Stage::Extract);
        self.emit(PipelineEvent::StageFailed {
            stage,
            error: error.to_string(),
        });
        self.state = self.state.fail();
        StageFailure { stage, error }
    }

    async fn run_stages(&mut self) -> Result<(RecordSet, Vec<QueryReport>), StageFailure> {
        self.advance();
        let extraction = match self.pipeline.extract().await {
            Ok(extraction) => extraction,
            Err(e) => return Err(self.fail(e)),
        };
        for skipped in &extraction.skipped {
            self.emit(PipelineEvent::SourceSkipped {
                source: skipped.name.clone(),
                error: skipped.error.to_string(),
            });
        }
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::Extract,
            summary: format!(
                "Data extraction complete: {} records from {} sources. Initiating Transformation process.",
                extraction.records.len(),
                extraction.sources_read
            ),
        });

        self.advance();
        let transformed = match self.pipeline.transform(extraction.records).await {
            Ok(transformed) => transformed,
            Err(e) => return Err(self.fail(e)),
        };
        for column in &transformed.missing_columns {
            self.emit(PipelineEvent::ColumnMissing {
                column: column.clone(),
            });
        }
        let summary = if transformed.derived_columns.is_empty() {
            "Data transformation complete.".to_string()
        } else {
            format!(
                "Data transformation complete. Columns added: {}.",
                transformed.derived_columns.join(", ")
            )
        };
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::Transform,
            summary,
        });
        let records = transformed.records;

        self.advance();
        let report = match self.pipeline.load(&records).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e)),
        };
        let mut targets = Vec::new();
        if let Some(path) = &report.csv_path {
            targets.push(path.clone());
        }
        if let Some(table) = &report.table {
            targets.push(format!("table {}", table));
        }
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::Load,
            summary: format!(
                "Data successfully loaded to {} ({} rows).",
                targets.join(" and "),
                report.rows
            ),
        });

        let mut queries = Vec::with_capacity(self.queries.len());
        for statement in &self.queries {
            let result = match self.pipeline.query(statement).await {
                Ok(result) => {
                    self.emit(PipelineEvent::QueryExecuted {
                        statement: statement.clone(),
                        rows: result.rows.len(),
                    });
                    result
                }
                Err(e) => {
                    self.emit(PipelineEvent::QueryFailed {
                        statement: statement.clone(),
                        error: e.to_string(),
                    });
                    QueryResult::default()
                }
            };
            queries.push(QueryReport {
                statement: statement.clone(),
                result,
            });
        }

        self.advance();
        Ok((records, queries))
    }

    /// Runs the pipeline once and consumes the runner. Stage errors end the
    /// run in `Failed` instead of propagating; the pipeline's resources are
    /// released either way.
    pub async fn run(mut self) -> RunOutcome {
        self.emit(PipelineEvent::RunStarted);

        let result = self.run_stages().await;
        self.pipeline.close().await;
        self.emit(PipelineEvent::RunFinished { state: self.state });

        match result {
            Ok((records, queries)) => RunOutcome {
                state: self.state,
                records: Some(records),
                queries,
                failure: None,
            },
            Err(failure) => RunOutcome {
                state: self.state,
                records: None,
                queries: Vec::new(),
                failure: Some(failure),
            },
        }
    }
}
