use crate::adapters::{
    ColumnSelection, DelimitedTextAdapter, HierarchicalMarkupAdapter, HtmlTableAdapter,
    StructuredObjectAdapter,
};
use crate::core::extract::{ExtractionPolicy, SourceLocation, SourceSpec};
use crate::core::transform::{CurrencyConversion, NumericColumn, RateSource};
use crate::domain::ports::SourceAdapter;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub extract: ExtractConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    pub load: LoadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub report: Option<ReportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default)]
    pub policy: ExtractionPolicy,
    pub timeout_seconds: Option<u64>,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Json,
    Xml,
    HtmlTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: Option<String>,
    pub format: SourceFormat,
    pub path: Option<String>,
    pub url: Option<String>,
    /// Single-character field delimiter for `csv` sources.
    pub delimiter: Option<String>,
    /// Repeating element name for `xml` sources.
    pub record_tag: Option<String>,
    /// CSS class marker of the table for `html_table` sources.
    pub table_class: Option<String>,
    pub columns: Option<Vec<ColumnSelection>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub numeric: Vec<NumericColumn>,
    pub currency: Option<CurrencyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    #[serde(flatten)]
    pub conversion: CurrencyConversion,
    pub rates: RateSourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSourceConfig {
    pub path: Option<String>,
    pub url: Option<String>,
    pub code_column: Option<String>,
    pub rate_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub csv_path: Option<String>,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub table: String,
    #[serde(default)]
    pub queries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_progress_log")]
    pub progress_log: String,
}

fn default_progress_log() -> String {
    "code_log.txt".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            progress_log: default_progress_log(),
        }
    }
}

/// A single value printed to stdout after a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub column: String,
    pub row: usize,
    pub label: Option<String>,
}

fn location(field: &str, path: &Option<String>, url: &Option<String>) -> Result<SourceLocation> {
    match (path, url) {
        (Some(path), None) => Ok(SourceLocation::File(path.clone())),
        (None, Some(url)) => Ok(SourceLocation::Url(url.clone())),
        (None, None) => Err(EtlError::MissingConfigError {
            field: format!("{}.path or {}.url", field, field),
        }),
        (Some(path), Some(_)) => Err(EtlError::InvalidConfigValueError {
            field: field.to_string(),
            value: path.clone(),
            reason: "set either path or url, not both".to_string(),
        }),
    }
}

impl SourceConfig {
    pub fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("source{}", index + 1))
    }

    pub fn location(&self, index: usize) -> Result<SourceLocation> {
        location(
            &format!("extract.sources[{}]", index),
            &self.path,
            &self.url,
        )
    }

    pub fn adapter(&self, index: usize) -> Result<Box<dyn SourceAdapter>> {
        let adapter: Box<dyn SourceAdapter> = match self.format {
            SourceFormat::Csv => match &self.delimiter {
                None => Box::new(DelimitedTextAdapter::new()),
                Some(d) if d.len() == 1 => Box::new(DelimitedTextAdapter::with_delimiter(d.as_bytes()[0])),
                Some(d) => {
                    return Err(EtlError::InvalidConfigValueError {
                        field: format!("extract.sources[{}].delimiter", index),
                        value: d.clone(),
                        reason: "delimiter must be a single ASCII character".to_string(),
                    })
                }
            },
            SourceFormat::Json => Box::new(StructuredObjectAdapter::new()),
            SourceFormat::Xml => Box::new(match &self.record_tag {
                Some(tag) => HierarchicalMarkupAdapter::with_record_tag(tag.clone()),
                None => HierarchicalMarkupAdapter::new(),
            }),
            SourceFormat::HtmlTable => {
                let defaults = HtmlTableAdapter::largest_banks();
                Box::new(HtmlTableAdapter::new(
                    self.table_class
                        .clone()
                        .unwrap_or_else(|| defaults.table_class().to_string()),
                    self.columns
                        .clone()
                        .unwrap_or_else(|| defaults.columns().to_vec()),
                ))
            }
        };
        Ok(adapter)
    }

    pub fn to_spec(&self, index: usize) -> Result<SourceSpec> {
        Ok(SourceSpec::new(
            self.display_name(index),
            self.adapter(index)?,
            self.location(index)?,
        ))
    }
}

impl RateSourceConfig {
    pub fn to_rate_source(&self) -> Result<RateSource> {
        Ok(RateSource {
            location: location("transform.currency.rates", &self.path, &self.url)?,
            code_column: self
                .code_column
                .clone()
                .unwrap_or_else(|| "Currency".to_string()),
            rate_column: self.rate_column.clone().unwrap_or_else(|| "Rate".to_string()),
        })
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content)
            .map_err(|e| EtlError::config(format!("TOML parsing error: {}", e)))
    }

    /// 替換環境變數 (例如 ${RATES_URL})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::config(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn source_specs(&self) -> Result<Vec<SourceSpec>> {
        self.extract
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| source.to_spec(index))
            .collect()
    }

    pub fn rate_source(&self) -> Result<Option<RateSource>> {
        self.transform
            .currency
            .as_ref()
            .map(|currency| currency.rates.to_rate_source())
            .transpose()
    }

    pub fn queries(&self) -> Vec<String> {
        self.load
            .database
            .as_ref()
            .map(|db| db.queries.clone())
            .unwrap_or_default()
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.extract.timeout_seconds.unwrap_or(30)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validate_positive_number("extract.sources", self.extract.sources.len(), 1)?;
        if let Some(timeout) = self.extract.timeout_seconds {
            validate_positive_number("extract.timeout_seconds", timeout as usize, 1)?;
        }

        for (index, source) in self.extract.sources.iter().enumerate() {
            let field = format!("extract.sources[{}]", index);
            match source.location(index)? {
                SourceLocation::Url(url) => validate_url(&format!("{}.url", field), &url)?,
                SourceLocation::File(path) => validate_path(&format!("{}.path", field), &path)?,
            }
            source.adapter(index)?;
            if let Some(columns) = &source.columns {
                validate_positive_number(&format!("{}.columns", field), columns.len(), 1)?;
            }
        }

        for numeric in &self.transform.numeric {
            validate_non_empty_string("transform.numeric.column", &numeric.column)?;
            if let Some(decimals) = numeric.decimals {
                if decimals > NumericColumn::MAX_DECIMALS {
                    return Err(EtlError::InvalidConfigValueError {
                        field: format!("transform.numeric[{}].decimals", numeric.column),
                        value: decimals.to_string(),
                        reason: format!("Value must be at most {}", NumericColumn::MAX_DECIMALS),
                    });
                }
            }
        }
        if let Some(currency) = &self.transform.currency {
            validate_non_empty_string(
                "transform.currency.base_column",
                &currency.conversion.base_column,
            )?;
            validate_positive_number(
                "transform.currency.targets",
                currency.conversion.targets.len(),
                1,
            )?;
            match currency.rates.to_rate_source()?.location {
                SourceLocation::Url(url) => validate_url("transform.currency.rates.url", &url)?,
                SourceLocation::File(path) => {
                    validate_path("transform.currency.rates.path", &path)?
                }
            }
        }

        if self.load.csv_path.is_none() && self.load.database.is_none() {
            return Err(EtlError::MissingConfigError {
                field: "load.csv_path or load.database".to_string(),
            });
        }
        if let Some(path) = &self.load.csv_path {
            validate_path("load.csv_path", path)?;
        }
        if let Some(db) = &self.load.database {
            validate_non_empty_string("load.database.url", &db.url)?;
            validate_non_empty_string("load.database.table", &db.table)?;
        }

        validate_path("logging.progress_log", &self.logging.progress_log)?;
        if let Some(report) = &self.report {
            validate_non_empty_string("report.column", &report.column)?;
        }

        Ok(())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BANKS: &str = r#"
[pipeline]
name = "largest-banks"
description = "Top 10 banks by market capitalization"
version = "1.0"

[extract]
timeout_seconds = 10

[[extract.sources]]
name = "wikipedia"
format = "html_table"
url = "https://web.archive.org/web/20230908091635/https://en.wikipedia.org/wiki/List_of_largest_banks"

[[transform.numeric]]
column = "MC_USD_Billion"

[transform.currency]
base_column = "MC_USD_Billion"
targets = ["GBP", "EUR", "INR"]
column_template = "MC_{code}_Billion"

[transform.currency.rates]
path = "data/exchange_rate.csv"

[load]
csv_path = "./Largest_banks_data.csv"

[load.database]
url = "sqlite://Banks.db"
table = "Largest_banks"
queries = ["SELECT * FROM Largest_banks", "SELECT AVG(MC_GBP_Billion) FROM Largest_banks"]

[report]
column = "MC_EUR_Billion"
row = 4
label = "Market cap of the 5th largest bank in EUR"
"#;

    #[test]
    fn test_parse_bank_config() {
        let config = TomlConfig::from_toml_str(BANKS).unwrap();

        assert_eq!(config.pipeline.name, "largest-banks");
        assert_eq!(config.extract.policy, ExtractionPolicy::Strict);
        assert_eq!(config.extract.sources[0].format, SourceFormat::HtmlTable);
        assert_eq!(config.logging.progress_log, "code_log.txt");
        assert_eq!(config.queries().len(), 2);
        assert_eq!(config.timeout_seconds(), 10);

        let currency = config.transform.currency.as_ref().unwrap();
        assert_eq!(
            currency.conversion.derived_column_name("EUR"),
            "MC_EUR_Billion"
        );
        let rates = config.rate_source().unwrap().unwrap();
        assert_eq!(
            rates.location,
            SourceLocation::File("data/exchange_rate.csv".to_string())
        );
        assert_eq!(rates.code_column, "Currency");
        assert!(config.validate().is_ok());

        let specs = config.source_specs().unwrap();
        assert_eq!(specs[0].name, "wikipedia");
        assert_eq!(specs[0].adapter.format_name(), "html");
    }

    #[test]
    fn test_parse_multi_format_config() {
        let toml_content = r#"
[pipeline]
name = "multi-format"

[extract]
policy = "lenient"

[[extract.sources]]
format = "csv"
path = "data/source1.csv"

[[extract.sources]]
format = "json"
path = "data/source2.json"

[[extract.sources]]
format = "xml"
path = "data/source3.xml"
record_tag = "record"

[[transform.numeric]]
column = "price"
decimals = 2

[load]
csv_path = "transformed_data.csv"

[logging]
progress_log = "log_file.txt"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.extract.policy, ExtractionPolicy::Lenient);
        assert!(config.rate_source().unwrap().is_none());
        assert!(config.queries().is_empty());

        let names: Vec<String> = config
            .source_specs()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["source1", "source2", "source3"]);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TABULAR_ETL_TEST_RATES_URL", "https://rates.example.com/rates.csv");

        let config = TomlConfig::from_toml_str(
            &BANKS.replace(
                "path = \"data/exchange_rate.csv\"",
                "url = \"${TABULAR_ETL_TEST_RATES_URL}\"",
            ),
        )
        .unwrap();
        assert_eq!(
            config.rate_source().unwrap().unwrap().location,
            SourceLocation::Url("https://rates.example.com/rates.csv".to_string())
        );

        std::env::remove_var("TABULAR_ETL_TEST_RATES_URL");
    }

    #[test]
    fn test_config_validation_failures() {
        let both = BANKS.replace(
            "path = \"data/exchange_rate.csv\"",
            "path = \"a.csv\"\nurl = \"https://x.example.com\"",
        );
        assert!(TomlConfig::from_toml_str(&both).unwrap().validate().is_err());

        let bad_url = BANKS.replace("url = \"https://web.archive.org", "url = \"ftp://web.archive.org");
        assert!(TomlConfig::from_toml_str(&bad_url).unwrap().validate().is_err());

        let no_sinks = r#"
[pipeline]
name = "x"
[extract]
[[extract.sources]]
format = "csv"
path = "a.csv"
[load]
"#;
        let err = TomlConfig::from_toml_str(no_sinks)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, EtlError::MissingConfigError { .. }));

        let bad_delimiter = no_sinks.replace("path = \"a.csv\"", "path = \"a.csv\"\ndelimiter = \"::\"")
            + "csv_path = \"out.csv\"\n";
        assert!(TomlConfig::from_toml_str(&bad_delimiter)
            .unwrap()
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_excessive_decimals() {
        let content = BANKS.replace(
            "column = \"MC_USD_Billion\"\n\n[transform.currency]",
            "column = \"MC_USD_Billion\"\ndecimals = 16\n\n[transform.currency]",
        );
        let config = TomlConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.transform.numeric[0].decimals, Some(16));
        assert!(matches!(
            config.validate(),
            Err(EtlError::InvalidConfigValueError { ref field, .. }) if field.ends_with("decimals")
        ));

        let content = content.replace("decimals = 16", "decimals = 15");
        assert!(TomlConfig::from_toml_str(&content).unwrap().validate().is_ok());
    }

    #[test]
    fn test_unknown_format_is_parse_error() {
        let content = BANKS.replace("format = \"html_table\"", "format = \"parquet\"");
        assert!(TomlConfig::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BANKS.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.name, "largest-banks");
    }
}
