// Typed aggregation stages: match → group → sort
// Each analytics view assembles one of these instead of nesting generic maps.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::model::{OwnerId, TransactionKind};
use crate::pagination::SortDirection;

// ============================================================================
// MATCH STAGE
// ============================================================================

/// Calendar period evaluated on `occurred_at` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarPeriod {
    Year(i32),
    Month(i32, u32),
}

impl CalendarPeriod {
    /// Half-open `[start, end)` bounds of the period.
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), StoreError> {
        let (start, end) = match *self {
            CalendarPeriod::Year(year) => (
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year + 1, 1, 1),
            ),
            CalendarPeriod::Month(year, month) => {
                let (next_year, next_month) = if month == 12 {
                    (year + 1, 1)
                } else {
                    (year, month + 1)
                };
                (
                    NaiveDate::from_ymd_opt(year, month, 1),
                    NaiveDate::from_ymd_opt(next_year, next_month, 1),
                )
            }
        };

        match (start.and_then(midnight), end.and_then(midnight)) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(StoreError::InvalidPipeline(format!(
                "invalid calendar period {:?}",
                self
            ))),
        }
    }
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}

/// Owner-scoped predicate shared by `find`, `count` and `aggregate`.
/// Every populated field is ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilter {
    pub owner: OwnerId,
    pub kind: Option<TransactionKind>,
    /// Inclusive lower bound
    pub occurred_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub occurred_to: Option<DateTime<Utc>>,
    pub period: Option<CalendarPeriod>,
    pub require_clock_time: bool,
}

impl TransactionFilter {
    pub fn for_owner(owner: &OwnerId) -> Self {
        TransactionFilter {
            owner: owner.clone(),
            kind: None,
            occurred_from: None,
            occurred_to: None,
            period: None,
            require_clock_time: false,
        }
    }

    pub fn with_kind(mut self, kind: Option<TransactionKind>) -> Self {
        self.kind = kind;
        self
    }

    pub fn occurred_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.occurred_from = from;
        self.occurred_to = to;
        self
    }

    pub fn in_year(mut self, year: i32) -> Self {
        self.period = Some(CalendarPeriod::Year(year));
        self
    }

    pub fn in_month(mut self, year: i32, month: u32) -> Self {
        self.period = Some(CalendarPeriod::Month(year, month));
        self
    }

    pub fn with_clock_time(mut self) -> Self {
        self.require_clock_time = true;
        self
    }
}

// ============================================================================
// GROUP + SORT STAGES
// ============================================================================

/// Bucket keys. Date parts come from `occurred_at` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Year,
    Month,
    /// Day of month, 1..=31
    Day,
    /// 1 = Sunday .. 7 = Saturday
    DayOfWeek,
    Kind,
}

/// match → group → sort. Accumulators are fixed: `SUM(amount)` and `COUNT(*)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub filter: TransactionFilter,
    pub group: Vec<GroupKey>,
    pub sort: Vec<(GroupKey, SortDirection)>,
}

impl Pipeline {
    pub fn matching(filter: TransactionFilter) -> Self {
        Pipeline {
            filter,
            group: Vec::new(),
            sort: Vec::new(),
        }
    }

    pub fn group_by(mut self, keys: impl IntoIterator<Item = GroupKey>) -> Self {
        for key in keys {
            if !self.group.contains(&key) {
                self.group.push(key);
            }
        }
        self
    }

    pub fn sort_by(mut self, key: GroupKey, direction: SortDirection) -> Self {
        self.sort.push((key, direction));
        self
    }

    /// Sorting is only meaningful over grouped keys.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (key, _) in &self.sort {
            if !self.group.contains(key) {
                return Err(StoreError::InvalidPipeline(format!(
                    "cannot sort by {:?}: not a group key",
                    key
                )));
            }
        }
        Ok(())
    }
}

/// One bucket. Only the fields named in the pipeline's group keys are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupRow {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub day_of_week: Option<u32>,
    pub kind: Option<TransactionKind>,
    pub total: f64,
    pub count: i64,
}

impl GroupRow {
    pub fn require<T>(value: Option<T>, key: GroupKey) -> Result<T, StoreError> {
        value.ok_or_else(|| StoreError::CorruptRecord {
            id: "aggregate".to_string(),
            reason: format!("missing group key {:?}", key),
        })
    }
}
