//! Email verification codes.
//!
//! A code is six decimal digits drawn uniformly from `100000..=999999` and is
//! valid for one hour from issue. Codes are generated once, at registration.

use rand::{rngs::OsRng, Rng};
use time::{Duration, OffsetDateTime};

pub const CODE_TTL: Duration = Duration::hours(1);
const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    pub code: String,
    pub expires_at: OffsetDateTime,
}

/// Result of comparing a submitted code against the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Accepted,
    Expired,
    Incorrect,
}

impl VerificationCode {
    pub fn generate() -> Self {
        Self::generate_at(OffsetDateTime::now_utc())
    }

    pub fn generate_at(now: OffsetDateTime) -> Self {
        let n = OsRng.gen_range(CODE_MIN..=CODE_MAX);
        Self {
            code: n.to_string(),
            expires_at: now + CODE_TTL,
        }
    }

    /// Expiry wins over correctness: nothing is accepted once `now` reaches
    /// `expires_at`.
    pub fn check(&self, submitted: &str, now: OffsetDateTime) -> CodeCheck {
        if now >= self.expires_at {
            CodeCheck::Expired
        } else if submitted == self.code {
            CodeCheck::Accepted
        } else {
            CodeCheck::Incorrect
        }
    }
}
