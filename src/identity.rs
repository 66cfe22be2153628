// 🔑 Identity Hasher
// Content hash used as the per-owner dedup key for transactions.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::model::OwnerId;
use crate::temporal::render_instant;

/// ASCII unit separator; never appears in dates, amounts, clock strings or owner ids.
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// Decimal places used when rendering amounts into the digest.
pub const AMOUNT_SCALE: usize = 4;

/// Derives the identity hash of a transaction from
/// `(occurred_at, amount, details, clock_time, owner)`.
///
/// The optional salt is configuration injected at start-up. With no salt the
/// digest covers exactly the five fields.
#[derive(Debug, Clone, Default)]
pub struct IdentityHasher {
    salt: Option<String>,
}

impl IdentityHasher {
    pub fn new() -> Self {
        IdentityHasher { salt: None }
    }

    pub fn with_salt(salt: impl Into<String>) -> Self {
        IdentityHasher {
            salt: Some(salt.into()),
        }
    }

    /// Hex-encoded SHA-256 over the fixed renderings of the five fields.
    pub fn compute(
        &self,
        occurred_at: &DateTime<Utc>,
        amount: f64,
        details: &str,
        clock_time: &str,
        owner: &OwnerId,
    ) -> String {
        let mut hasher = Sha256::new();

        if let Some(salt) = &self.salt {
            hasher.update(salt.as_bytes());
            hasher.update([FIELD_SEPARATOR as u8]);
        }

        let key = [
            render_instant(occurred_at),
            render_amount(amount),
            details.to_string(),
            clock_time.to_string(),
            owner.to_string(),
        ]
        .join(&FIELD_SEPARATOR.to_string());

        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Stable fixed-point text for an amount. `-0.0` renders like `0.0`.
pub fn render_amount(amount: f64) -> String {
    let amount = if amount == 0.0 { 0.0 } else { amount };
    format!("{:.*}", AMOUNT_SCALE, amount)
}
