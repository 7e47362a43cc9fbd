//! Staggered scrape scheduling.
//!
//! Turns a batch of [`ScrapingUrlConfig`]s into a list of desired
//! `next_auto_scrape_at` writes. Nothing here touches storage; the caller
//! applies the returned pairs in a single transaction.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::urls::ScrapingUrlConfig;

/// One desired timestamp write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduledScrape {
    pub id: i64,
    pub next_auto_scrape_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("schedule interval must be positive, got {seconds}s")]
    InvalidInterval { seconds: i64 },

    #[error("staggered schedule overflows the timestamp range at position {position}")]
    Overflow { position: usize },
}

/// Assigns `now + i * interval` to the i-th eligible entry, in input order.
///
/// Ineligible entries are skipped and do not consume a slot.
///
/// # Errors
///
/// - [`ScheduleError::InvalidInterval`] when `interval` is zero or negative.
/// - [`ScheduleError::Overflow`] when a slot falls outside the representable
///   timestamp range.
pub fn schedule_batch<'a, I>(
    urls: I,
    interval: TimeDelta,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduledScrape>, ScheduleError>
where
    I: IntoIterator<Item = &'a ScrapingUrlConfig>,
{
    if interval <= TimeDelta::zero() {
        return Err(ScheduleError::InvalidInterval {
            seconds: interval.num_seconds(),
        });
    }

    urls.into_iter()
        .filter(|u| u.is_eligible())
        .enumerate()
        .map(|(position, u)| {
            let offset = i32::try_from(position)
                .ok()
                .and_then(|p| interval.checked_mul(p))
                .ok_or(ScheduleError::Overflow { position })?;
            let at = now
                .checked_add_signed(offset)
                .ok_or(ScheduleError::Overflow { position })?;
            Ok(ScheduledScrape {
                id: u.id,
                next_auto_scrape_at: at,
            })
        })
        .collect()
}

/// Marks every eligible entry due at `now`, for manual "run now" triggers.
pub fn schedule_immediate<'a, I>(urls: I, now: DateTime<Utc>) -> Vec<ScheduledScrape>
where
    I: IntoIterator<Item = &'a ScrapingUrlConfig>,
{
    urls.into_iter()
        .filter(|u| u.is_eligible())
        .map(|u| ScheduledScrape {
            id: u.id,
            next_auto_scrape_at: now,
        })
        .collect()
}
