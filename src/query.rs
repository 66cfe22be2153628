// Query parameters → typed view inputs
// Everything arrives as text; anything malformed is a client input error.

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;

use crate::analytics::RangeQuery;
use crate::error::{Result, ServiceError};
use crate::model::{TransactionKind, UnknownKind};
use crate::pagination::{Paginate, SortDirection, SortField, SortSpec};
use crate::temporal::parse_date;

/// Raw parameters shared by every read view. Each view only looks at the
/// fields it needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(value: &Option<String>, name: &str) -> Result<Option<T>> {
    match present(value) {
        None => Ok(None),
        Some(text) => text
            .parse::<T>()
            .map(Some)
            .map_err(|_| ServiceError::client_input(format!("invalid {} '{}'", name, text))),
    }
}

impl ViewParams {
    /// Listing window. Newest first unless `sort` says otherwise.
    pub fn paginate(&self, default_limit: i64) -> Result<Paginate> {
        let page = parse_number::<i64>(&self.page, "page number")?.unwrap_or(0);
        let limit = parse_number::<i64>(&self.limit, "limit")?.unwrap_or(default_limit);
        let sort = match present(&self.sort) {
            Some(text) => SortSpec::parse(text)?,
            None => SortSpec::new(),
        };

        let newest_first = SortSpec::new().by(SortField::OccurredAt, SortDirection::Descending);
        Ok(Paginate::new(limit, page, newest_first).sort_by(sort))
    }

    /// Inclusive date bounds (midnight UTC) plus an optional kind.
    pub fn range(&self) -> Result<RangeQuery> {
        let bound = |value: &Option<String>, name: &str| -> Result<Option<DateTime<Utc>>> {
            match present(value) {
                None => Ok(None),
                Some(text) => parse_date(text)
                    .map(Some)
                    .map_err(|e| ServiceError::client_input(format!("{}: {}", name, e))),
            }
        };

        let from = bound(&self.start_date, "start_date")?;
        let to = bound(&self.end_date, "end_date")?;

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ServiceError::client_input(
                    "start_date must not be after end_date",
                ));
            }
        }

        Ok(RangeQuery {
            from,
            to,
            kind: self.kind()?,
        })
    }

    pub fn kind(&self) -> Result<Option<TransactionKind>> {
        match present(&self.kind) {
            None => Ok(None),
            Some(text) => text
                .parse()
                .map(Some)
                .map_err(|e: UnknownKind| ServiceError::client_input(e.to_string())),
        }
    }

    pub fn kind_or_debit(&self) -> Result<TransactionKind> {
        Ok(self.kind()?.unwrap_or(TransactionKind::Debit))
    }

    /// Requested year, or the year of `now`. Limited to four digits.
    pub fn year_or(&self, now: DateTime<Utc>) -> Result<i32> {
        match parse_number::<i32>(&self.year, "year")? {
            None => Ok(now.year()),
            Some(year) if (1..=9999).contains(&year) => Ok(year),
            Some(year) => Err(ServiceError::client_input(format!("invalid year '{}'", year))),
        }
    }

    /// Requested month (1..=12), or the month of `now`.
    pub fn month_or(&self, now: DateTime<Utc>) -> Result<u32> {
        match parse_number::<u32>(&self.month, "month")? {
            None => Ok(now.month()),
            Some(month) if (1..=12).contains(&month) => Ok(month),
            Some(month) => Err(ServiceError::client_input(format!(
                "invalid month '{}'",
                month
            ))),
        }
    }
}
