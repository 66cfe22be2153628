// Pagination Helper
// page/limit/sort parameters → bounded, ordered retrieval window

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ServiceError;

    /// Accepts `asc`/`desc` as well as the numeric `1`/`-1` convention.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Ok(SortDirection::Ascending),
            "desc" | "descending" | "-1" => Ok(SortDirection::Descending),
            other => Err(ServiceError::client_input(format!(
                "invalid sort direction '{}'",
                other
            ))),
        }
    }
}

/// Transaction fields a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    OccurredAt,
    Amount,
    Balance,
    Kind,
    Details,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::OccurredAt => "occurred_at",
            SortField::Amount => "amount",
            SortField::Balance => "balance",
            SortField::Kind => "kind",
            SortField::Details => "details",
        }
    }
}

impl FromStr for SortField {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "occurred_at" | "transaction_date" | "transactiondate" | "date" => {
                Ok(SortField::OccurredAt)
            }
            "amount" => Ok(SortField::Amount),
            "balance" => Ok(SortField::Balance),
            "type" | "kind" => Ok(SortField::Kind),
            "details" => Ok(SortField::Details),
            other => Err(ServiceError::client_input(format!(
                "cannot sort by '{}'",
                other
            ))),
        }
    }
}

/// Ordered field → direction mapping. Empty means unordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec(Vec<(SortField, SortDirection)>);

impl SortSpec {
    pub fn new() -> Self {
        SortSpec(Vec::new())
    }

    /// Add or replace the direction for `field`, keeping first-seen order.
    pub fn by(mut self, field: SortField, direction: SortDirection) -> Self {
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = direction,
            None => self.0.push((field, direction)),
        }
        self
    }

    /// Parse `field:dir,field:dir` (direction defaults to ascending).
    pub fn parse(text: &str) -> Result<Self, ServiceError> {
        let mut spec = SortSpec::new();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, direction) = match part.split_once(':') {
                Some((f, d)) => (f.parse()?, d.parse()?),
                None => (part.parse()?, SortDirection::Ascending),
            };
            spec = spec.by(field, direction);
        }
        Ok(spec)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[(SortField, SortDirection)] {
        &self.0
    }
}

/// Window handed to the store's `find`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: u64,
    /// `None` = no upper bound
    pub limit: Option<u64>,
    pub sort: SortSpec,
}

impl FindOptions {
    pub fn sorted(sort: SortSpec) -> Self {
        FindOptions {
            skip: 0,
            limit: None,
            sort,
        }
    }
}

/// Page request built from client parameters.
///
/// Negative `limit`/`page` are taken as magnitudes. `page` goes to the store
/// as a raw skip count (not multiplied by `limit`). A limit of 0 means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginate {
    limit: u64,
    page: u64,
    sort: SortSpec,
}

impl Paginate {
    pub fn new(limit: i64, page: i64, sort: SortSpec) -> Self {
        let paginate = Paginate {
            limit: limit.unsigned_abs(),
            page: page.unsigned_abs(),
            sort,
        };
        tracing::debug!(
            limit = paginate.limit,
            page = paginate.page,
            sort = ?paginate.sort,
            "pagination window"
        );
        paginate
    }

    /// Replace the ordering; an empty sort keeps the current one.
    pub fn sort_by(mut self, sort: SortSpec) -> Self {
        if !sort.is_empty() {
            self.sort = sort;
        }
        self
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            skip: self.page,
            limit: (self.limit > 0).then_some(self.limit),
            sort: self.sort.clone(),
        }
    }
}

/// `Paginate::new(..).find_options()` in one call.
pub fn paginate(limit: i64, page_index: i64, sort: SortSpec) -> FindOptions {
    Paginate::new(limit, page_index, sort).find_options()
}

/// One page of results plus the metadata needed by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}
