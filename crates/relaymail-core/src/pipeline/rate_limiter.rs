//! Rate Limiter - rolling daily send quota per account
//!
//! The "sent today" figure is derived by counting email rows created since
//! UTC midnight rather than kept in a mutable counter. Concurrent requests
//! from one account can race the check and slightly overshoot; the derived
//! count means the overshoot never compounds.

use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use relaymail_common::types::AccountId;
use relaymail_storage::repository::EmailRepository;
use tracing::debug;

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Request may proceed; remaining quota after it is sent
    Allowed { remaining: i64 },
    /// Account is at or over the daily cap
    Exhausted { limit: i64 },
    /// Request alone would cross the cap
    WouldExceed { remaining: i64, limit: i64 },
}

impl QuotaDecision {
    /// Pure decision over the counted state
    pub fn decide(sent_today: i64, requested: i64, limit: i64) -> Self {
        if sent_today >= limit {
            QuotaDecision::Exhausted { limit }
        } else if sent_today + requested > limit {
            QuotaDecision::WouldExceed {
                remaining: limit - sent_today,
                limit,
            }
        } else {
            QuotaDecision::Allowed {
                remaining: limit - sent_today - requested,
            }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }

    /// Human-readable rejection detail for the API response
    pub fn rejection_message(&self) -> Option<String> {
        match self {
            QuotaDecision::Allowed { .. } => None,
            QuotaDecision::Exhausted { limit } => Some(format!(
                "Daily send limit of {} reached; quota resets at UTC midnight",
                limit
            )),
            QuotaDecision::WouldExceed { remaining, limit } => Some(format!(
                "Request exceeds daily send limit of {}; {} sends remaining today",
                limit, remaining
            )),
        }
    }
}

/// Rate limiter enforcing a fixed daily quota per account
pub struct RateLimiter {
    emails: EmailRepository,
    daily_limit: i64,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(emails: EmailRepository, daily_limit: i64) -> Self {
        Self {
            emails,
            daily_limit,
        }
    }

    /// Decide whether `requested` more sends may proceed for the account
    pub async fn check(&self, account_id: AccountId, requested: i64) -> Result<QuotaDecision> {
        let sent_today = self
            .emails
            .count_since(account_id, start_of_utc_day(Utc::now()))
            .await?;

        let decision = QuotaDecision::decide(sent_today, requested, self.daily_limit);

        if !decision.is_allowed() {
            debug!(
                %account_id,
                sent_today,
                requested,
                limit = self.daily_limit,
                "Daily quota check rejected request"
            );
        }

        Ok(decision)
    }
}

/// UTC midnight of the day containing `now`
fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quota_boundaries() {
        // At the cap: even one more is rejected
        assert_eq!(
            QuotaDecision::decide(100, 1, 100),
            QuotaDecision::Exhausted { limit: 100 }
        );

        // 95 sent, 5 requested: exactly fills the cap
        assert_eq!(
            QuotaDecision::decide(95, 5, 100),
            QuotaDecision::Allowed { remaining: 0 }
        );

        // 95 sent, 6 requested: crosses the cap
        assert_eq!(
            QuotaDecision::decide(95, 6, 100),
            QuotaDecision::WouldExceed {
                remaining: 5,
                limit: 100
            }
        );

        // Plenty of headroom
        assert_eq!(
            QuotaDecision::decide(10, 20, 100),
            QuotaDecision::Allowed { remaining: 70 }
        );
    }

    #[test]
    fn test_rejection_messages() {
        assert!(QuotaDecision::decide(0, 1, 100).rejection_message().is_none());
        assert!(QuotaDecision::decide(100, 1, 100)
            .rejection_message()
            .unwrap()
            .contains("100"));
        assert!(QuotaDecision::decide(95, 6, 100)
            .rejection_message()
            .unwrap()
            .contains("5 sends remaining"));
    }

    #[test]
    fn test_start_of_utc_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 17, 42, 9).unwrap();
        let midnight = start_of_utc_day(now);
        assert_eq!(
            midnight,
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
    }
}
