// 🏗️ Import Parsers
// Statement files (JSON / CSV) → raw transaction batches for the ingestion pipeline

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::model::{RawTransaction, TransactionKind};

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Csv,
}

impl ImportFormat {
    pub fn name(&self) -> &str {
        match self {
            ImportFormat::Json => "JSON",
            ImportFormat::Csv => "CSV",
        }
    }
}

/// Loads one statement file into raw records.
///
/// Parsers never stamp an owner or compute identities; that is the
/// ingestion pipeline's job.
pub trait StatementParser: Send + Sync {
    fn parse(&self, file_path: &Path) -> Result<Vec<RawTransaction>> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
        self.parse_reader(Box::new(file))
            .with_context(|| format!("Failed to parse {}", file_path.display()))
    }

    fn parse_reader(&self, reader: Box<dyn Read>) -> Result<Vec<RawTransaction>>;

    fn format(&self) -> ImportFormat;
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Pick the format from the file extension.
pub fn detect_format(file_path: &Path) -> Result<ImportFormat> {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "json" => Ok(ImportFormat::Json),
        "csv" => Ok(ImportFormat::Csv),
        _ => Err(anyhow!(
            "Could not detect import format from filename: {}",
            file_path.display()
        )),
    }
}

pub fn get_parser(format: ImportFormat) -> Box<dyn StatementParser> {
    match format {
        ImportFormat::Json => Box::new(JsonParser),
        ImportFormat::Csv => Box::new(CsvParser),
    }
}

/// Detect, pick and parse in one call.
pub fn load_file(file_path: &Path) -> Result<Vec<RawTransaction>> {
    let format = detect_format(file_path)?;
    let records = get_parser(format).parse(file_path)?;
    tracing::info!(
        file = %file_path.display(),
        format = format.name(),
        records = records.len(),
        "statement loaded"
    );
    Ok(records)
}

// ============================================================================
// JSON
// ============================================================================

/// A JSON array of raw records, same shape the HTTP ingest accepts.
pub struct JsonParser;

impl StatementParser for JsonParser {
    fn parse_reader(&self, reader: Box<dyn Read>) -> Result<Vec<RawTransaction>> {
        let records: Vec<RawTransaction> =
            serde_json::from_reader(reader).context("Invalid JSON transaction array")?;
        Ok(records)
    }

    fn format(&self) -> ImportFormat {
        ImportFormat::Json
    }
}

// ============================================================================
// CSV
// ============================================================================

/// Header: `date,time,value_date,details,type,amount,balance`
pub struct CsvParser;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    date: String,
    #[serde(default)]
    time: String,
    #[serde(default)]
    value_date: String,
    #[serde(default)]
    details: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    balance: String,
}

/// Statement amounts may carry thousands separators or a currency sign.
fn parse_amount(text: &str) -> Result<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' '))
        .collect();

    if cleaned.is_empty() {
        return Ok(0.0);
    }

    cleaned
        .parse::<f64>()
        .with_context(|| format!("Invalid amount '{}'", text))
}

impl StatementParser for CsvParser {
    fn parse_reader(&self, reader: Box<dyn Read>) -> Result<Vec<RawTransaction>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut transactions = Vec::new();

        for (line_num, result) in reader.deserialize::<CsvRow>().enumerate() {
            // +2: 1-indexed plus the header row
            let line = line_num + 2;
            let row = result.with_context(|| format!("Failed to parse CSV line {}", line))?;

            let kind: TransactionKind = row
                .kind
                .parse()
                .with_context(|| format!("CSV line {}", line))?;

            transactions.push(RawTransaction {
                amount: parse_amount(&row.amount).with_context(|| format!("CSV line {}", line))?,
                occurred_at: row.date,
                clock_time: row.time,
                value_date: row.value_date,
                details: row.details,
                kind,
                balance: parse_amount(&row.balance)
                    .with_context(|| format!("CSV line {}", line))?,
            });
        }

        Ok(transactions)
    }

    fn format(&self) -> ImportFormat {
        ImportFormat::Csv
    }
}
