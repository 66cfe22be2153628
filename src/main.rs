use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use std::env;
use std::path::Path;

use paymentx::{
    load_file, AnalyticsEngine, AppConfig, Database, IngestionPipeline, OwnerId, TransactionKind,
};

const USAGE: &str = "usage:
  paymentx import <owner-id> <file.json|file.csv> [--memory]
  paymentx summary <owner-id> [year]";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paymentx=info".into()),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = AppConfig::from_env().context("Failed to read configuration")?;

    match args.first().map(String::as_str) {
        Some("import") => run_import(&config, &args[1..]),
        Some("summary") => run_summary(&config, &args[1..]),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn open_database(config: &AppConfig, in_memory: bool) -> Result<Database> {
    let db = if in_memory {
        Database::in_memory()
    } else {
        Database::open(&config.database)
    };
    db.with_context(|| format!("Failed to open database {}", config.database.display()))
}

fn run_import(config: &AppConfig, args: &[String]) -> Result<()> {
    let in_memory = args.iter().any(|a| a == "--memory");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let (owner, file) = match positional.as_slice() {
        [owner, file] => (owner.as_str(), file.as_str()),
        _ => bail!("{}", USAGE),
    };

    println!("📥 PaymentX import");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let owner = OwnerId::parse(owner).context("Invalid owner id")?;

    // 1. Load statement
    println!("\n📂 Loading {}...", file);
    let records = load_file(Path::new(file))?;
    println!("✓ Loaded {} records", records.len());

    // 2. Ingest
    println!("\n💾 Ingesting for {}...", owner);
    let db = open_database(config, in_memory)?;
    let session = db.session()?;
    let hasher = config.identity_hasher();
    let report = IngestionPipeline::new(&session, &hasher)
        .ingest(&owner, &records)
        .context("Ingestion failed")?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Saved:      {}", report.accepted);
    println!("✓ Duplicates: {}", report.duplicates);

    Ok(())
}

fn run_summary(config: &AppConfig, args: &[String]) -> Result<()> {
    let owner = match args.first() {
        Some(owner) => OwnerId::parse(owner).context("Invalid owner id")?,
        None => bail!("{}", USAGE),
    };
    let year = match args.get(1) {
        Some(raw) => raw
            .parse::<i32>()
            .with_context(|| format!("Invalid year '{}'", raw))?,
        None => Utc::now().year(),
    };

    let db = open_database(config, false)?;
    let session = db.session()?;
    let engine = AnalyticsEngine::new(&session);

    println!("📊 Monthly spend for {}", owner);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for month in engine.monthly_totals(&owner, TransactionKind::Debit)? {
        println!("  {}-{:02}  {:>14.2}", month.year, month.month, month.total_spend);
    }

    let report = engine.debit_vs_credit(&owner, year)?;
    println!("\n📈 Debit vs credit, {}", report.year);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  {:>5}  {:>14}  {:>14}", "month", "debit", "credit");
    for row in &report.results {
        println!("  {:>5}  {:>14.2}  {:>14.2}", row.month, row.debit, row.credit);
    }

    Ok(())
}
