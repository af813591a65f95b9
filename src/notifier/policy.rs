//! Reminder eligibility: which registrations a tick may pick up, and when a
//! tick may run at all.

use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};

use crate::store::StartWindow;

/// Which not-yet-notified registrations are eligible on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// Events starting between now and now + lookahead.
    Windowed { lookahead: Duration },
    /// Every not-yet-notified registration.
    Broadcast,
}

impl NotifyPolicy {
    pub const DEFAULT_LOOKAHEAD_HOURS: i64 = 31;
    /// Longest accepted lookahead: one leap year.
    pub const MAX_LOOKAHEAD_HOURS: i64 = 24 * 366;

    /// Windowed policy over `hours`, or `None` outside `1..=MAX_LOOKAHEAD_HOURS`.
    pub fn windowed_hours(hours: i64) -> Option<Self> {
        if !(1..=Self::MAX_LOOKAHEAD_HOURS).contains(&hours) {
            return None;
        }
        Duration::try_hours(hours).map(|lookahead| Self::Windowed { lookahead })
    }

    /// Event start bounds for the pending-reminder query.
    pub fn window(&self, now: DateTime<Utc>) -> Option<StartWindow> {
        match self {
            Self::Windowed { lookahead } => Some(StartWindow {
                from: now,
                until: now
                    .checked_add_signed(*lookahead)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            }),
            Self::Broadcast => None,
        }
    }
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self::Windowed {
            lookahead: Duration::hours(Self::DEFAULT_LOOKAHEAD_HOURS),
        }
    }
}

/// Daily hour range in venue time, `start` inclusive and `end` exclusive.
///
/// A range with `start > end` wraps past midnight. Empty ranges
/// (`start == end`) are rejected when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

impl HourRange {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

impl FromStr for HourRange {
    type Err = String;

    /// Parse `start-end`, e.g. `17-23`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("expected start-end, got {s:?}"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .ok()
                .filter(|h| *h <= 24)
                .ok_or_else(|| format!("invalid hour {v:?}"))
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if start == end {
            return Err(format!("empty hour range {s:?}"));
        }
        Ok(Self { start, end })
    }
}

/// Predicate over "now" deciding whether a tick may send anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGate {
    /// Only on this venue-local calendar date.
    pub date: Option<NaiveDate>,
    /// Only inside this venue-local hour range.
    pub hours: Option<HourRange>,
    pub offset: FixedOffset,
}

impl TimeGate {
    /// A gate that is always open.
    pub fn open(offset: FixedOffset) -> Self {
        Self {
            date: None,
            hours: None,
            offset,
        }
    }

    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if self.date.is_some_and(|d| d != local.date_naive()) {
            return false;
        }
        if self.hours.is_some_and(|h| !h.contains(local.hour())) {
            return false;
        }
        true
    }
}
