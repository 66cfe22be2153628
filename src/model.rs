// Transaction data model
// Raw input records → tagged records (owner + identity hash) → persisted rows

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::{Result, ServiceError};

// ============================================================================
// TRANSACTION KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transaction type '{0}', expected DEBIT or CREDIT")]
pub struct UnknownKind(pub String);

impl TransactionKind {
    pub const ALL: [TransactionKind; 2] = [TransactionKind::Debit, TransactionKind::Credit];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "DEBIT",
            TransactionKind::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBIT" => Ok(TransactionKind::Debit),
            "CREDIT" => Ok(TransactionKind::Credit),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: UnknownKind| FromSqlError::Other(Box::new(e)))
    }
}

// ============================================================================
// OWNER IDENTITY
// ============================================================================

/// Validated identifier of the user owning a set of transactions.
///
/// Produced once by the auth collaborator and passed explicitly into every
/// ingestion and analytics call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub const MAX_LEN: usize = 128;

    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(ServiceError::Unauthorized("empty owner id".into()));
        }
        if id.len() > Self::MAX_LEN {
            return Err(ServiceError::Unauthorized("owner id too long".into()));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ServiceError::Unauthorized(format!(
                "owner id '{}' contains invalid characters",
                id
            )));
        }
        Ok(OwnerId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToSql for OwnerId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for OwnerId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(|id| OwnerId(id.to_string()))
    }
}

/// What the auth collaborator hands to each entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    Authenticated(OwnerId),
    Unauthenticated,
}

impl AuthContext {
    /// Build from the subject resolved upstream. Blank means unauthenticated;
    /// a subject that is present but malformed is rejected outright.
    pub fn from_subject(subject: Option<&str>) -> Result<Self> {
        match subject.map(str::trim) {
            None | Some("") => Ok(AuthContext::Unauthenticated),
            Some(raw) => OwnerId::parse(raw).map(AuthContext::Authenticated),
        }
    }

    pub fn require_owner(&self) -> Result<&OwnerId> {
        match self {
            AuthContext::Authenticated(owner) => Ok(owner),
            AuthContext::Unauthenticated => {
                Err(ServiceError::Unauthorized("no owner identity supplied".into()))
            }
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Incoming record as supplied by a client or an import file.
///
/// Any owner field in the input is ignored; the pipeline stamps the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub amount: f64,

    /// `YYYY-MM-DD` (or RFC 3339); blank means "now"
    #[serde(default, alias = "transaction_date")]
    pub occurred_at: String,

    /// 12-hour clock, e.g. `1:05 PM`
    #[serde(default, alias = "transaction_time")]
    pub clock_time: String,

    #[serde(default)]
    pub value_date: String,

    #[serde(default)]
    pub details: String,

    #[serde(rename = "type")]
    pub kind: TransactionKind,

    #[serde(default)]
    pub balance: f64,
}

/// Record tagged by the ingestion pipeline, ready for a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub owner_id: OwnerId,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    pub clock_time: String,
    pub value_date: String,
    pub details: String,
    pub kind: TransactionKind,
    pub balance: f64,
    pub identity_hash: String,
}

/// Persisted transaction. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub owner_id: OwnerId,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    pub clock_time: String,
    pub value_date: String,
    pub details: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub balance: f64,
    pub identity_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        assert_eq!("DEBIT".parse::<TransactionKind>().unwrap(), TransactionKind::Debit);
        assert_eq!(" credit ".parse::<TransactionKind>().unwrap(), TransactionKind::Credit);
        assert!("TRANSFER".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_owner_id_validation() {
        assert_eq!(OwnerId::parse(" user-42 ").unwrap().as_str(), "user-42");
        assert!(OwnerId::parse("").is_err());
        assert!(OwnerId::parse("drop table;").is_err());
        assert!(OwnerId::parse(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_auth_context_requires_owner() {
        let anonymous = AuthContext::from_subject(None).unwrap();
        assert_eq!(anonymous, AuthContext::Unauthenticated);
        assert!(matches!(
            anonymous.require_owner(),
            Err(ServiceError::Unauthorized(_))
        ));

        let blank = AuthContext::from_subject(Some("   ")).unwrap();
        assert_eq!(blank, AuthContext::Unauthenticated);

        let known = AuthContext::from_subject(Some("owner_1")).unwrap();
        assert_eq!(known.require_owner().unwrap().as_str(), "owner_1");

        assert!(AuthContext::from_subject(Some("bad id")).is_err());
    }

    #[test]
    fn test_raw_transaction_accepts_legacy_field_names() {
        let raw: RawTransaction = serde_json::from_str(
            r#"{
                "amount": 12.5,
                "transaction_date": "2024-03-05",
                "transaction_time": "1:05 PM",
                "details": "COFFEE",
                "type": "DEBIT",
                "balance": 900.0,
                "user_id": "someone-else"
            }"#,
        )
        .unwrap();

        assert_eq!(raw.occurred_at, "2024-03-05");
        assert_eq!(raw.clock_time, "1:05 PM");
        assert_eq!(raw.kind, TransactionKind::Debit);
        assert_eq!(raw.value_date, "");
    }

    #[test]
    fn test_transaction_serializes_kind_as_type() {
        let tx = Transaction {
            id: "t1".into(),
            owner_id: OwnerId::parse("o1").unwrap(),
            amount: 10.0,
            occurred_at: DateTime::parse_from_rfc3339("2024-03-05T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            clock_time: "9:00 AM".into(),
            value_date: String::new(),
            details: "X".into(),
            kind: TransactionKind::Credit,
            balance: 0.0,
            identity_hash: "h".into(),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "CREDIT");
        assert_eq!(json["owner_id"], "o1");
    }
}
