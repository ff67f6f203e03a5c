use crate::config::toml_config::TomlConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "tabular-etl")]
#[command(about = "Batch ETL: merge tabular sources, convert currencies, load to CSV and SQLite")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "configs/banks.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit diagnostics as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Override load.csv_path from config
    #[arg(long)]
    pub csv_path: Option<String>,

    /// Override logging.progress_log from config
    #[arg(long)]
    pub progress_log: Option<String>,
}

impl CliConfig {
    /// 套用命令列覆蓋設定
    pub fn apply_overrides(&self, config: &mut TomlConfig) {
        if let Some(path) = &self.csv_path {
            tracing::info!("🔧 CSV output overridden to: {}", path);
            config.load.csv_path = Some(path.clone());
        }
        if let Some(path) = &self.progress_log {
            tracing::info!("🔧 Progress log overridden to: {}", path);
            config.logging.progress_log = path.clone();
        }
    }
}
