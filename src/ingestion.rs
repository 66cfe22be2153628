// 📥 Ingestion Pipeline
// validate → normalize time → hash → stamp owner → unordered bulk insert
//
// Re-ingesting a batch is a no-op: records whose identity hash already exists
// for the owner are rejected by the store and counted as duplicates.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{BulkWriteOutcome, TransactionStore, WriteErrorKind};
use crate::error::{Result, ServiceError, StoreError};
use crate::identity::IdentityHasher;
use crate::model::{NewTransaction, OwnerId, RawTransaction};
use crate::temporal::{hour_of_day, normalize_occurred_at};

/// Result of a successful batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Newly persisted records
    pub accepted: usize,
    /// Records dropped because the owner already has the same identity hash
    pub duplicates: usize,
}

pub struct IngestionPipeline<'a, S: TransactionStore> {
    store: &'a S,
    hasher: &'a IdentityHasher,
}

impl<'a, S: TransactionStore> IngestionPipeline<'a, S> {
    pub fn new(store: &'a S, hasher: &'a IdentityHasher) -> Self {
        IngestionPipeline { store, hasher }
    }

    pub fn ingest(&self, owner: &OwnerId, raw: &[RawTransaction]) -> Result<IngestReport> {
        self.ingest_at(owner, raw, Utc::now())
    }

    /// Ingest with an explicit "now" used for records without a date.
    pub fn ingest_at(
        &self,
        owner: &OwnerId,
        raw: &[RawTransaction],
        now: DateTime<Utc>,
    ) -> Result<IngestReport> {
        let docs = raw
            .iter()
            .enumerate()
            .map(|(index, record)| self.prepare(owner, index, record, now))
            .collect::<Result<Vec<_>>>()?;

        if docs.is_empty() {
            tracing::info!(owner = %owner, "empty batch, nothing to ingest");
            return Ok(IngestReport::default());
        }

        let outcome = self.store.insert_many(&docs)?;
        let report = settle(outcome)?;

        tracing::info!(
            owner = %owner,
            submitted = docs.len(),
            accepted = report.accepted,
            duplicates = report.duplicates,
            "ingested transaction batch"
        );

        Ok(report)
    }

    /// Validate one record and tag it with its owner and identity hash.
    pub fn prepare(
        &self,
        owner: &OwnerId,
        index: usize,
        record: &RawTransaction,
        now: DateTime<Utc>,
    ) -> Result<NewTransaction> {
        let occurred_at = normalize_occurred_at(&record.occurred_at, now)
            .map_err(|e| ServiceError::client_input(format!("record {}: {}", index, e)))?;

        if !record.amount.is_finite() {
            return Err(ServiceError::client_input(format!(
                "record {}: amount must be a finite number",
                index
            )));
        }

        let clock_time = record.clock_time.trim().to_string();
        if !clock_time.is_empty() {
            hour_of_day(&clock_time)
                .map_err(|e| ServiceError::client_input(format!("record {}: {}", index, e)))?;
        }

        let identity_hash = self.hasher.compute(
            &occurred_at,
            record.amount,
            &record.details,
            &clock_time,
            owner,
        );

        Ok(NewTransaction {
            owner_id: owner.clone(),
            amount: record.amount,
            occurred_at,
            clock_time,
            value_date: record.value_date.clone(),
            details: record.details.clone(),
            kind: record.kind,
            balance: record.balance,
            identity_hash,
        })
    }
}

/// Promote an outcome to success when every rejection was a duplicate key;
/// any other rejection fails the whole batch.
pub fn settle(outcome: BulkWriteOutcome) -> Result<IngestReport> {
    if let Some(failure) = outcome.first_hard_failure() {
        let rejected = outcome
            .write_errors
            .iter()
            .filter(|e| !e.is_duplicate_key())
            .count();
        let message = match &failure.kind {
            WriteErrorKind::Other(message) => message.clone(),
            WriteErrorKind::DuplicateKey => String::from("duplicate key"),
        };
        tracing::error!(rejected, index = failure.index, %message, "bulk write failed");
        return Err(StoreError::BulkWrite {
            rejected,
            index: failure.index,
            message,
        }
        .into());
    }

    Ok(IngestReport {
        accepted: outcome.inserted_count(),
        duplicates: outcome.duplicate_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{Pipeline, TransactionFilter};
    use crate::db::{Database, WriteError, WriteErrorKind};
    use crate::model::{Transaction, TransactionKind};
    use crate::pagination::FindOptions;
    use chrono::TimeZone;
    use std::cell::RefCell;

    fn raw(date: &str, amount: f64, details: &str, clock: &str) -> RawTransaction {
        RawTransaction {
            amount,
            occurred_at: date.to_string(),
            clock_time: clock.to_string(),
            value_date: date.to_string(),
            details: details.to_string(),
            kind: TransactionKind::Debit,
            balance: 1000.0,
        }
    }

    fn owner(id: &str) -> OwnerId {
        OwnerId::parse(id).unwrap()
    }

    #[test]
    fn test_idempotency_ingest_twice() {
        let db = Database::in_memory().unwrap();
        let session = db.session().unwrap();
        let hasher = IdentityHasher::new();
        let pipeline = IngestionPipeline::new(&session, &hasher);

        let batch = vec![
            raw("2024-12-31", -45.99, "STARBUCKS #12345", "8:15 AM"),
            raw("2024-12-30", -120.50, "AMAZON PURCHASE", "7:40 PM"),
            raw("2024-12-29", 2000.00, "SALARY DEPOSIT", "12:00 AM"),
        ];

        let first = pipeline.ingest(&owner("u1"), &batch).unwrap();
        let second = pipeline.ingest(&owner("u1"), &batch).unwrap();
        let count = session.count(&TransactionFilter::for_owner(&owner("u1"))).unwrap();

        assert_eq!(first, IngestReport { accepted: 3, duplicates: 0 });
        assert_eq!(second, IngestReport { accepted: 0, duplicates: 3 });
        assert_eq!(count, 3);
    }

    #[test]
    fn test_amount_edit_is_a_new_transaction() {
        let db = Database::in_memory().unwrap();
        let session = db.session().unwrap();
        let hasher = IdentityHasher::new();
        let pipeline = IngestionPipeline::new(&session, &hasher);

        let report = pipeline
            .ingest(
                &owner("u1"),
                &[
                    raw("2024-03-05", 10.00, "LUNCH", "1:05 PM"),
                    raw("2024-03-05", 10.01, "LUNCH", "1:05 PM"),
                ],
            )
            .unwrap();
        assert_eq!(report.accepted, 2);
    }

    #[test]
    fn test_same_record_twice_in_one_batch() {
        let db = Database::in_memory().unwrap();
        let session = db.session().unwrap();
        let hasher = IdentityHasher::new();
        let pipeline = IngestionPipeline::new(&session, &hasher);

        let record = raw("2024-03-05", 10.00, "LUNCH", "1:05 PM");
        let report = pipeline
            .ingest(&owner("u1"), &[record.clone(), record])
            .unwrap();

        assert_eq!(report, IngestReport { accepted: 1, duplicates: 1 });
    }

    #[test]
    fn test_owner_is_stamped_not_trusted() {
        let db = Database::in_memory().unwrap();
        let session = db.session().unwrap();
        let hasher = IdentityHasher::new();
        let pipeline = IngestionPipeline::new(&session, &hasher);

        pipeline
            .ingest(&owner("u1"), &[raw("2024-03-05", 1.0, "A", "")])
            .unwrap();
        // Same content for another owner is a distinct event
        let other = pipeline
            .ingest(&owner("u2"), &[raw("2024-03-05", 1.0, "A", "")])
            .unwrap();
        assert_eq!(other.accepted, 1);

        let rows = session
            .find(&TransactionFilter::for_owner(&owner("u2")), &FindOptions::default())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].owner_id, owner("u2"));
    }

    #[test]
    fn test_blank_date_defaults_to_now() {
        let db = Database::in_memory().unwrap();
        let session = db.session().unwrap();
        let hasher = IdentityHasher::new();
        let pipeline = IngestionPipeline::new(&session, &hasher);
        let now = Utc.with_ymd_and_hms(2025, 2, 14, 9, 0, 0).unwrap();

        pipeline
            .ingest_at(&owner("u1"), &[raw("", 3.0, "NO DATE", "")], now)
            .unwrap();

        let rows = session
            .find(&TransactionFilter::for_owner(&owner("u1")), &FindOptions::default())
            .unwrap();
        assert_eq!(rows[0].occurred_at, now);
    }

    #[test]
    fn test_malformed_inputs_are_client_errors() {
        let db = Database::in_memory().unwrap();
        let session = db.session().unwrap();
        let hasher = IdentityHasher::new();
        let pipeline = IngestionPipeline::new(&session, &hasher);

        let bad_date = pipeline.ingest(&owner("u1"), &[raw("2024-13-01", 1.0, "A", "")]);
        assert!(matches!(bad_date, Err(ServiceError::ClientInput(_))));

        let bad_clock = pipeline.ingest(&owner("u1"), &[raw("2024-03-01", 1.0, "A", "25 o'clock")]);
        assert!(matches!(bad_clock, Err(ServiceError::ClientInput(_))));

        let bad_amount = pipeline.ingest(&owner("u1"), &[raw("2024-03-01", f64::NAN, "A", "")]);
        assert!(matches!(bad_amount, Err(ServiceError::ClientInput(_))));

        // Nothing from a rejected batch is written
        assert_eq!(session.count(&TransactionFilter::for_owner(&owner("u1"))).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_dates_reject_the_batch() {
        let db = Database::in_memory().unwrap();
        let session = db.session().unwrap();
        let hasher = IdentityHasher::new();
        let pipeline = IngestionPipeline::new(&session, &hasher);

        for bad in ["+10000-01-01", "-0001-01-01", "24-03-05", "2024-3-5"] {
            let result = pipeline.ingest(
                &owner("u1"),
                &[raw("2024-03-05", 1.0, "A", ""), raw(bad, 2.0, "B", "")],
            );
            assert!(
                matches!(result, Err(ServiceError::ClientInput(_))),
                "{} should be rejected",
                bad
            );
        }
        assert_eq!(session.count(&TransactionFilter::for_owner(&owner("u1"))).unwrap(), 0);

        // The owner's views keep working after the rejected batches
        pipeline
            .ingest(&owner("u1"), &[raw("2024-03-05", 1.0, "A", "")])
            .unwrap();
        let monthly = crate::analytics::AnalyticsEngine::new(&session)
            .monthly_totals(&owner("u1"), TransactionKind::Debit)
            .unwrap();
        assert_eq!(monthly.len(), 1);
        assert_eq!((monthly[0].year, monthly[0].month), (2024, 3));
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let db = Database::in_memory().unwrap();
        let session = db.session().unwrap();
        let hasher = IdentityHasher::new();
        let report = IngestionPipeline::new(&session, &hasher)
            .ingest(&owner("u1"), &[])
            .unwrap();
        assert_eq!(report, IngestReport::default());
    }

    #[test]
    fn test_settle_only_suppresses_duplicates() {
        let duplicates_only = BulkWriteOutcome {
            inserted_ids: vec!["a".into()],
            write_errors: vec![WriteError {
                index: 1,
                kind: WriteErrorKind::DuplicateKey,
            }],
        };
        assert_eq!(
            settle(duplicates_only).unwrap(),
            IngestReport { accepted: 1, duplicates: 1 }
        );

        let mixed = BulkWriteOutcome {
            inserted_ids: vec!["a".into()],
            write_errors: vec![
                WriteError {
                    index: 1,
                    kind: WriteErrorKind::DuplicateKey,
                },
                WriteError {
                    index: 2,
                    kind: WriteErrorKind::Other("disk I/O error".into()),
                },
            ],
        };
        match settle(mixed) {
            Err(ServiceError::Store(StoreError::BulkWrite { rejected, index, .. })) => {
                assert_eq!(rejected, 1);
                assert_eq!(index, 2);
            }
            other => panic!("expected bulk write failure, got {:?}", other),
        }
    }

    /// Store double that rejects every record with a non-duplicate failure.
    struct FailingStore {
        calls: RefCell<usize>,
    }

    impl TransactionStore for FailingStore {
        fn insert_many(
            &self,
            docs: &[NewTransaction],
        ) -> std::result::Result<BulkWriteOutcome, StoreError> {
            *self.calls.borrow_mut() += 1;
            Ok(BulkWriteOutcome {
                inserted_ids: Vec::new(),
                write_errors: (0..docs.len())
                    .map(|index| WriteError {
                        index,
                        kind: WriteErrorKind::Other("read-only database".into()),
                    })
                    .collect(),
            })
        }

        fn find(
            &self,
            _filter: &TransactionFilter,
            _options: &FindOptions,
        ) -> std::result::Result<Vec<Transaction>, StoreError> {
            Ok(Vec::new())
        }

        fn count(&self, _filter: &TransactionFilter) -> std::result::Result<u64, StoreError> {
            Ok(0)
        }

        fn aggregate(
            &self,
            _pipeline: &Pipeline,
        ) -> std::result::Result<Vec<crate::aggregation::GroupRow>, StoreError> {
            Ok(Vec::new())
        }

        fn find_by_id(
            &self,
            _owner: &OwnerId,
            _id: &str,
        ) -> std::result::Result<Option<Transaction>, StoreError> {
            Ok(None)
        }
    }

    #[test]
    fn test_hard_write_failure_fails_batch() {
        let store = FailingStore {
            calls: RefCell::new(0),
        };
        let hasher = IdentityHasher::new();
        let result = IngestionPipeline::new(&store, &hasher)
            .ingest(&owner("u1"), &[raw("2024-03-05", 1.0, "A", "")]);

        assert_eq!(*store.calls.borrow(), 1);
        let err = result.unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Service);
    }
}
