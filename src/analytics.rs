// 📊 Analytics Engine
// Read-only views over one owner's transactions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregation::{GroupKey, GroupRow, Pipeline, TransactionFilter};
use crate::db::TransactionStore;
use crate::error::{Result, ServiceError, StoreError};
use crate::model::{OwnerId, Transaction, TransactionKind};
use crate::pagination::{FindOptions, Page, Paginate, SortDirection, SortField, SortSpec};
use crate::temporal::{hour_of_day, previous_month};

// ============================================================================
// VIEW PAYLOADS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    pub year: i32,
    pub month: u32,
    pub total_spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdaySpend {
    pub year: i32,
    pub month: u32,
    /// 1 = Sunday .. 7 = Saturday
    pub day_of_week: u32,
    pub total_spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourPoint {
    pub hour: u32,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyDebitCredit {
    pub month: u32,
    pub debit: f64,
    pub credit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebitCreditReport {
    pub year: i32,
    pub results: Vec<MonthlyDebitCredit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendTrend {
    pub year: i32,
    pub month: u32,
    pub average_daily_spend: f64,
    pub percentage_change: f64,
}

/// Optional inclusive bounds on `occurred_at` plus an optional kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub kind: Option<TransactionKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeResult {
    pub total: usize,
    pub data: Vec<Transaction>,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct AnalyticsEngine<'a, S: TransactionStore> {
    store: &'a S,
}

impl<'a, S: TransactionStore> AnalyticsEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        AnalyticsEngine { store }
    }

    /// Paginated listing plus total count for the same owner filter.
    pub fn list_transactions(
        &self,
        owner: &OwnerId,
        paginate: &Paginate,
    ) -> Result<Page<Transaction>> {
        let filter = TransactionFilter::for_owner(owner);
        let data = self.store.find(&filter, &paginate.find_options())?;
        let total = self.store.count(&filter)?;

        Ok(Page {
            data,
            total,
            page: paginate.page(),
            limit: paginate.limit(),
        })
    }

    /// All of the owner's transactions inside the (optional) bounds, oldest first.
    pub fn transactions_in_range(&self, owner: &OwnerId, query: &RangeQuery) -> Result<RangeResult> {
        let filter = TransactionFilter::for_owner(owner)
            .with_kind(query.kind)
            .occurred_between(query.from, query.to);
        let options = FindOptions::sorted(
            SortSpec::new().by(SortField::OccurredAt, SortDirection::Ascending),
        );

        let data = self.store.find(&filter, &options)?;
        Ok(RangeResult {
            total: data.len(),
            data,
        })
    }

    /// Sum of amounts per calendar month, oldest month first.
    pub fn monthly_totals(&self, owner: &OwnerId, kind: TransactionKind) -> Result<Vec<MonthlyTotal>> {
        let pipeline = Pipeline::matching(TransactionFilter::for_owner(owner).with_kind(Some(kind)))
            .group_by([GroupKey::Year, GroupKey::Month])
            .sort_by(GroupKey::Year, SortDirection::Ascending)
            .sort_by(GroupKey::Month, SortDirection::Ascending);

        self.store
            .aggregate(&pipeline)?
            .into_iter()
            .map(|row| {
                Ok(MonthlyTotal {
                    year: GroupRow::require(row.year, GroupKey::Year)?,
                    month: GroupRow::require(row.month, GroupKey::Month)?,
                    total_spend: row.total,
                })
            })
            .collect()
    }

    /// Spend per day of week within one month.
    pub fn weekly_pattern(
        &self,
        owner: &OwnerId,
        year: i32,
        month: u32,
        kind: TransactionKind,
    ) -> Result<Vec<WeekdaySpend>> {
        let filter = TransactionFilter::for_owner(owner)
            .with_kind(Some(kind))
            .in_month(year, month);
        let pipeline = Pipeline::matching(filter)
            .group_by([GroupKey::Year, GroupKey::Month, GroupKey::DayOfWeek])
            .sort_by(GroupKey::DayOfWeek, SortDirection::Ascending);

        self.store
            .aggregate(&pipeline)?
            .into_iter()
            .map(|row| {
                Ok(WeekdaySpend {
                    year: GroupRow::require(row.year, GroupKey::Year)?,
                    month: GroupRow::require(row.month, GroupKey::Month)?,
                    day_of_week: GroupRow::require(row.day_of_week, GroupKey::DayOfWeek)?,
                    total_spend: row.total,
                })
            })
            .collect()
    }

    /// One `{hour, amount}` point per transaction, ordered by hour.
    ///
    /// Records without a clock time are not plotted; a stored clock time that
    /// does not parse fails the view.
    pub fn hourly_scatter(&self, owner: &OwnerId, kind: TransactionKind) -> Result<Vec<HourPoint>> {
        let filter = TransactionFilter::for_owner(owner)
            .with_kind(Some(kind))
            .with_clock_time();
        let options = FindOptions::sorted(
            SortSpec::new().by(SortField::OccurredAt, SortDirection::Ascending),
        );

        let mut points = self
            .store
            .find(&filter, &options)?
            .into_iter()
            .map(|tx| {
                let hour = hour_of_day(&tx.clock_time).map_err(|e| StoreError::CorruptRecord {
                    id: tx.id.clone(),
                    reason: e.to_string(),
                })?;
                Ok(HourPoint {
                    hour,
                    amount: tx.amount,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        points.sort_by_key(|p| p.hour);
        Ok(points)
    }

    /// Debit and credit sums for every month of `year`; always twelve rows.
    pub fn debit_vs_credit(&self, owner: &OwnerId, year: i32) -> Result<DebitCreditReport> {
        let pipeline = Pipeline::matching(TransactionFilter::for_owner(owner).in_year(year))
            .group_by([GroupKey::Month, GroupKey::Kind])
            .sort_by(GroupKey::Month, SortDirection::Ascending);

        let rows = self.store.aggregate(&pipeline)?;
        Ok(DebitCreditReport {
            year,
            results: fill_months(&rows)?,
        })
    }

    /// Average daily spend for a month and its change against the month before.
    pub fn average_daily_spend(
        &self,
        owner: &OwnerId,
        year: i32,
        month: u32,
        kind: TransactionKind,
    ) -> Result<SpendTrend> {
        let current = self.daily_average(owner, year, month, kind)?;
        let (prev_year, prev_month) = previous_month(year, month);
        let previous = self.daily_average(owner, prev_year, prev_month, kind)?;

        tracing::debug!(%owner, year, month, current, previous, "average daily spend");

        Ok(SpendTrend {
            year,
            month,
            average_daily_spend: current,
            percentage_change: percentage_change(current, previous),
        })
    }

    /// Single transaction lookup, scoped to the owner.
    pub fn get_transaction(&self, owner: &OwnerId, id: &str) -> Result<Transaction> {
        self.store
            .find_by_id(owner, id)?
            .ok_or_else(|| ServiceError::NotFound(format!("transaction {}", id)))
    }

    fn daily_average(
        &self,
        owner: &OwnerId,
        year: i32,
        month: u32,
        kind: TransactionKind,
    ) -> Result<f64> {
        let filter = TransactionFilter::for_owner(owner)
            .with_kind(Some(kind))
            .in_month(year, month);
        let pipeline =
            Pipeline::matching(filter).group_by([GroupKey::Year, GroupKey::Month, GroupKey::Day]);

        let daily: Vec<f64> = self
            .store
            .aggregate(&pipeline)?
            .into_iter()
            .map(|row| row.total)
            .collect();

        Ok(mean(&daily))
    }
}

// ============================================================================
// DERIVED METRICS
// ============================================================================

/// Arithmetic mean; an empty bucket averages to 0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `(current - previous) / previous * 100`, or 0 when there is no previous spend.
pub fn percentage_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

/// Reshape `(month, kind) → total` rows into months 1..=12, zero-filled.
pub fn fill_months(rows: &[GroupRow]) -> Result<Vec<MonthlyDebitCredit>> {
    let mut months: Vec<MonthlyDebitCredit> = (1..=12)
        .map(|month| MonthlyDebitCredit {
            month,
            debit: 0.0,
            credit: 0.0,
        })
        .collect();

    for row in rows {
        let month = GroupRow::require(row.month, GroupKey::Month)?;
        let kind = GroupRow::require(row.kind, GroupKey::Kind)?;
        let slot = months
            .get_mut((month as usize).wrapping_sub(1))
            .ok_or_else(|| StoreError::CorruptRecord {
                id: "aggregate".to_string(),
                reason: format!("month {} out of range", month),
            })?;
        match kind {
            TransactionKind::Debit => slot.debit = row.total,
            TransactionKind::Credit => slot.credit = row.total,
        }
    }

    Ok(months)
}
