//! Suppression Filter - drops recipients on the suppression list

use anyhow::Result;
use relaymail_storage::repository::SuppressionRepository;
use std::collections::HashSet;
use tracing::debug;

use super::recipients::PreparedEmail;

/// Result of filtering a prepared recipient set
#[derive(Debug, Clone)]
pub struct FilteredRecipients {
    pub kept: Vec<PreparedEmail>,
    pub suppressed: usize,
}

/// Suppression filter over the durable suppression list
pub struct SuppressionFilter {
    suppressions: SuppressionRepository,
}

impl SuppressionFilter {
    /// Create a new suppression filter
    pub fn new(suppressions: SuppressionRepository) -> Self {
        Self { suppressions }
    }

    /// Partition prepared emails into kept and suppressed.
    ///
    /// One batched lookup regardless of recipient count; relative order of
    /// kept recipients is unchanged.
    pub async fn filter(&self, prepared: Vec<PreparedEmail>) -> Result<FilteredRecipients> {
        if prepared.is_empty() {
            return Ok(FilteredRecipients {
                kept: prepared,
                suppressed: 0,
            });
        }

        let addresses: Vec<String> = prepared.iter().map(|p| p.to.clone()).collect();
        let suppressed: HashSet<String> = self
            .suppressions
            .find_suppressed(&addresses)
            .await?
            .into_iter()
            .collect();

        let before = prepared.len();
        let kept: Vec<PreparedEmail> = prepared
            .into_iter()
            .filter(|p| !suppressed.contains(&p.to.to_lowercase()))
            .collect();
        let dropped = before - kept.len();

        if dropped > 0 {
            debug!(suppressed = dropped, "Dropped suppressed recipients");
        }

        Ok(FilteredRecipients {
            kept,
            suppressed: dropped,
        })
    }
}
