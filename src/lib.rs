// PaymentX - Core Library
// Transaction ingestion with per-owner dedup, plus spending analytics.
// Exposes all modules for use in CLI, API server, and tests

pub mod aggregation;
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod ingestion;
pub mod model;
pub mod pagination;
pub mod parser;
pub mod query;
pub mod temporal;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use aggregation::{CalendarPeriod, GroupKey, GroupRow, Pipeline, TransactionFilter};
pub use analytics::{
    AnalyticsEngine, DebitCreditReport, HourPoint, MonthlyDebitCredit, MonthlyTotal, RangeQuery,
    RangeResult, SpendTrend, WeekdaySpend,
};
pub use config::AppConfig;
pub use db::{
    setup_database, BulkWriteOutcome, Database, Session, TransactionStore, WriteError,
    WriteErrorKind,
};
pub use error::{ErrorClass, Result, ServiceError, StoreError};
pub use identity::IdentityHasher;
pub use ingestion::{IngestReport, IngestionPipeline};
pub use model::{
    AuthContext, NewTransaction, OwnerId, RawTransaction, Transaction, TransactionKind,
};
pub use pagination::{paginate, FindOptions, Page, Paginate, SortDirection, SortField, SortSpec};
pub use parser::{detect_format, get_parser, load_file, ImportFormat, StatementParser};
pub use query::ViewParams;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
