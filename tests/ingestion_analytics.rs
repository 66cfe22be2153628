use paymentx::{
    AnalyticsEngine, Database, IdentityHasher, IngestionPipeline, OwnerId, Paginate,
    RawTransaction, ServiceError, SortDirection, SortField, SortSpec, TransactionKind,
};

fn owner(id: &str) -> OwnerId {
    OwnerId::parse(id).expect("owner id")
}

fn record(date: &str, clock: &str, details: &str, kind: &str, amount: f64) -> RawTransaction {
    serde_json::from_value(serde_json::json!({
        "transaction_date": date,
        "transaction_time": clock,
        "details": details,
        "type": kind,
        "amount": amount,
        "balance": 0.0,
    }))
    .expect("raw record")
}

fn statement() -> Vec<RawTransaction> {
    vec![
        record("2024-02-10", "9:15 AM", "GROCERY", "DEBIT", 10.0),
        record("2024-02-11", "9:45 AM", "GROCERY", "DEBIT", 10.0),
        record("2024-03-01", "1:05 PM", "RENT", "DEBIT", 10.0),
        record("2024-03-02", "12:10 AM", "TAXI", "DEBIT", 20.0),
        record("2024-03-03", "7:30 PM", "DINNER", "DEBIT", 30.0),
        record("2024-03-15", "", "SALARY", "CREDIT", 2500.0),
    ]
}

#[test]
fn reingesting_a_statement_is_a_no_op() {
    let db = Database::in_memory().expect("db");
    let session = db.session().expect("session");
    let hasher = IdentityHasher::new();
    let pipeline = IngestionPipeline::new(&session, &hasher);
    let me = owner("alice");

    let first = pipeline.ingest(&me, &statement()).expect("first ingest");
    assert_eq!(first.accepted, 6);
    assert_eq!(first.duplicates, 0);

    let second = pipeline.ingest(&me, &statement()).expect("second ingest");
    assert_eq!(second.accepted, 0);
    assert_eq!(second.duplicates, 6);

    // Same content for a different owner is not a duplicate
    let other = pipeline.ingest(&owner("bob"), &statement()).expect("bob ingest");
    assert_eq!(other.accepted, 6);

    let page = AnalyticsEngine::new(&session)
        .list_transactions(
            &me,
            &Paginate::new(
                0,
                0,
                SortSpec::new().by(SortField::OccurredAt, SortDirection::Descending),
            ),
        )
        .expect("listing");
    assert_eq!(page.total, 6);
    assert_eq!(page.data.len(), 6);
    assert!(page.data.iter().all(|t| t.owner_id == me));
}

#[test]
fn overlapping_batches_only_add_new_records() {
    let db = Database::in_memory().expect("db");
    let session = db.session().expect("session");
    let hasher = IdentityHasher::new();
    let pipeline = IngestionPipeline::new(&session, &hasher);
    let me = owner("alice");

    pipeline.ingest(&me, &statement()[..3]).expect("first half");
    let report = pipeline.ingest(&me, &statement()[1..]).expect("overlap");
    assert_eq!(report.accepted, 3);
    assert_eq!(report.duplicates, 2);
}

#[test]
fn views_over_a_seeded_store() {
    let db = Database::in_memory().expect("db");
    let me = owner("alice");

    {
        let session = db.session().expect("session");
        let hasher = IdentityHasher::new();
        IngestionPipeline::new(&session, &hasher)
            .ingest(&me, &statement())
            .expect("ingest");
    }

    let session = db.session().expect("session");
    let engine = AnalyticsEngine::new(&session);

    let monthly = engine.monthly_totals(&me, TransactionKind::Debit).expect("monthly");
    let monthly: Vec<(i32, u32, f64)> = monthly
        .iter()
        .map(|m| (m.year, m.month, m.total_spend))
        .collect();
    assert_eq!(monthly, vec![(2024, 2, 20.0), (2024, 3, 60.0)]);

    let trend = engine
        .average_daily_spend(&me, 2024, 3, TransactionKind::Debit)
        .expect("average");
    assert_eq!(trend.average_daily_spend, 20.0);
    assert_eq!(trend.percentage_change, 100.0);

    let hours: Vec<u32> = engine
        .hourly_scatter(&me, TransactionKind::Debit)
        .expect("scatter")
        .iter()
        .map(|p| p.hour)
        .collect();
    assert_eq!(hours, vec![0, 9, 9, 13, 19]);

    let split = engine.debit_vs_credit(&me, 2024).expect("debit vs credit");
    assert_eq!(split.results.len(), 12);
    assert_eq!(split.results[2].debit, 60.0);
    assert_eq!(split.results[2].credit, 2500.0);

    // 2024-03-01 Friday, 03-02 Saturday, 03-03 Sunday
    let week: Vec<(u32, f64)> = engine
        .weekly_pattern(&me, 2024, 3, TransactionKind::Debit)
        .expect("pattern")
        .iter()
        .map(|w| (w.day_of_week, w.total_spend))
        .collect();
    assert_eq!(week, vec![(1, 30.0), (6, 10.0), (7, 20.0)]);

    // Nothing leaks across owners
    let stranger = owner("mallory");
    assert!(engine.monthly_totals(&stranger, TransactionKind::Debit).expect("empty").is_empty());
    let id = engine
        .transactions_in_range(&me, &Default::default())
        .expect("range")
        .data[0]
        .id
        .clone();
    assert!(engine.get_transaction(&me, &id).is_ok());
    assert!(matches!(
        engine.get_transaction(&stranger, &id),
        Err(ServiceError::NotFound(_))
    ));
}

#[test]
fn a_bad_record_rejects_the_whole_batch() {
    let db = Database::in_memory().expect("db");
    let session = db.session().expect("session");
    let hasher = IdentityHasher::new();
    let me = owner("alice");

    let mut batch = statement();
    batch.push(record("2024-02-30", "", "BAD DATE", "DEBIT", 1.0));

    let err = IngestionPipeline::new(&session, &hasher)
        .ingest(&me, &batch)
        .expect_err("invalid date");
    assert_eq!(err.class().status_code(), 400);

    let page = AnalyticsEngine::new(&session)
        .list_transactions(&me, &Paginate::new(10, 0, SortSpec::new()))
        .expect("listing");
    assert_eq!(page.total, 0);
}
