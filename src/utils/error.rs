use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Schema mismatch: expected columns [{}] not found (available: [{}])", expected.join(", "), available.join(", "))]
    SchemaMismatch {
        expected: Vec<String>,
        available: Vec<String>,
    },

    #[error("Malformed {format} source: {reason}")]
    MalformedSource { format: String, reason: String },

    #[error("Extraction failed for source '{source_name}': {cause}")]
    Extraction {
        source_name: String,
        #[source]
        cause: Box<EtlError>,
    },

    #[error("Missing exchange rate for currency '{code}'")]
    MissingRate { code: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Store error on table '{table}': {message}")]
    StoreError { table: String, message: String },

    #[error("Query failed ({statement}): {message}")]
    QueryError { statement: String, message: String },

    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("HTTP request to {url} returned status {status}")]
    HttpStatusError { url: String, status: u16 },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Source,
    Transform,
    Sink,
    Network,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Transient; rerunning later may succeed.
    Medium,
    /// Bad input or data; needs a fix before rerunning.
    High,
    /// Local environment problem (disk, database file).
    Critical,
}

impl EtlError {
    pub fn malformed(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSource {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SchemaMismatch { .. } | Self::MalformedSource { .. } | Self::CsvError(_) => {
                ErrorCategory::Source
            }
            Self::Extraction { cause, .. } => cause.category(),
            Self::MissingRate { .. } | Self::SerializationError(_) => ErrorCategory::Transform,
            Self::IoError(_) | Self::StoreError { .. } | Self::QueryError { .. } => {
                ErrorCategory::Sink
            }
            Self::ApiError(_) | Self::HttpStatusError { .. } => ErrorCategory::Network,
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Extraction { cause, .. } => cause.severity(),
            Self::ApiError(_) | Self::HttpStatusError { .. } => ErrorSeverity::Medium,
            Self::IoError(_) | Self::StoreError { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::SchemaMismatch { expected, .. } => format!(
                "Check that the page still contains a table with headers: {}",
                expected.join(", ")
            ),
            Self::MalformedSource { format, .. } => {
                format!("Inspect the {} input; it could not be parsed", format)
            }
            Self::Extraction { cause, .. } => cause.recovery_suggestion(),
            Self::MissingRate { code } => format!(
                "Add a rate for {} to the exchange rate table or remove it from transform.currency.targets",
                code
            ),
            Self::IoError(_) => "Check file paths and permissions".to_string(),
            Self::StoreError { .. } => {
                "Check that the database file is writable and not locked".to_string()
            }
            Self::QueryError { .. } => "Check the SQL statement syntax".to_string(),
            Self::ApiError(_) | Self::HttpStatusError { .. } => {
                "Check network connectivity and the source URL, then retry".to_string()
            }
            Self::CsvError(_) => "Check the delimited input for ragged rows".to_string(),
            Self::SerializationError(_) => "Check that the JSON input is valid".to_string(),
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => {
                "Review the TOML configuration file".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Source => format!("Could not read the input data: {}", self),
            ErrorCategory::Transform => format!("Could not transform the data: {}", self),
            ErrorCategory::Sink => format!("Could not write the output: {}", self),
            ErrorCategory::Network => format!("Could not reach a remote source: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
