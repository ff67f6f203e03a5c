use clap::Parser;
use tabular_etl::core::etl::QueryReport;
use tabular_etl::utils::error::ErrorSeverity;
use tabular_etl::utils::{logger, validation::Validate};
use tabular_etl::{
    CliConfig, FileProgressLog, LocalStorage, PipelineRunner, RecordSet, TabularPipeline,
    TomlConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting tabular-etl");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    // 載入 TOML 配置
    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };
    args.apply_overrides(&mut config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        perform_dry_run(&config);
        return Ok(());
    }

    // Relative paths in the config resolve against the working directory.
    let storage = LocalStorage::new(".".to_string());
    let pipeline = match TabularPipeline::from_config(&config, storage).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("❌ Could not prepare pipeline: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(exit_code(e.severity()));
        }
    };

    let progress = FileProgressLog::new(config.logging.progress_log.clone());
    let runner = PipelineRunner::new(pipeline, Box::new(progress)).with_queries(config.queries());
    let outcome = runner.run().await;

    if let Some(failure) = &outcome.failure {
        let e = &failure.error;
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ ETL process failed during {}: {} (Category: {:?}, Severity: {:?})",
            failure.stage,
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());
        std::process::exit(exit_code(e.severity()));
    }

    for report in &outcome.queries {
        print_query(report);
    }
    if let (Some(report), Some(records)) = (&config.report, &outcome.records) {
        print_report_value(records, &report.column, report.row, report.label.as_deref());
    }

    tracing::info!("✅ ETL process completed successfully!");
    println!("✅ ETL process completed successfully!");
    if let Some(path) = &config.load.csv_path {
        println!("📁 Output saved to: {}", path);
    }

    Ok(())
}

// 根據錯誤嚴重程度決定退出碼
fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Medium => 2, // 重試錯誤
        ErrorSeverity::High => 1,   // 處理錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    }
}

fn print_query(report: &QueryReport) {
    println!("{}", report.statement);
    println!("{}", report.result.columns.join(" | "));
    for row in &report.result.rows {
        let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
        println!("{}", cells.join(" | "));
    }
    println!();
}

fn print_report_value(records: &RecordSet, column: &str, row: usize, label: Option<&str>) {
    let label = label.unwrap_or(column);
    match records.value(row, column) {
        Some(value) => println!("{}: {}", label, value),
        None => tracing::warn!("Report value {}[{}] not present in the output", column, row),
    }
}

fn display_config_summary(config: &TomlConfig, args: &CliConfig) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name,
        config.pipeline.version.as_deref().unwrap_or("0.0")
    );
    println!("  Sources: {}", config.extract.sources.len());
    println!("  Policy: {:?}", config.extract.policy);
    if let Some(path) = &config.load.csv_path {
        println!("  CSV Output: {}", path);
    }
    if let Some(db) = &config.load.database {
        println!("  Database: {} (table {})", db.url, db.table);
    }
    println!("  Progress Log: {}", config.logging.progress_log);

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📡 Data Sources:");
    for (index, source) in config.extract.sources.iter().enumerate() {
        let location = source
            .location(index)
            .map(|l| l.to_string())
            .unwrap_or_else(|e| format!("<{}>", e));
        println!(
            "  {} [{:?}] {}",
            source.display_name(index),
            source.format,
            location
        );
    }

    println!();
    println!("⚙️ Transform:");
    for numeric in &config.transform.numeric {
        println!("  Numeric: {}", numeric.column);
    }
    if let Some(currency) = &config.transform.currency {
        let derived: Vec<String> = currency
            .conversion
            .targets
            .iter()
            .map(|code| currency.conversion.derived_column_name(code))
            .collect();
        println!(
            "  Currency: {} -> {}",
            currency.conversion.base_column,
            derived.join(", ")
        );
    }

    println!();
    println!("💾 Load:");
    if let Some(path) = &config.load.csv_path {
        println!("  CSV: {}", path);
    }
    if let Some(db) = &config.load.database {
        println!("  SQLite: {} -> {}", db.url, db.table);
        for query in &db.queries {
            println!("  Query: {}", query);
        }
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");
}
