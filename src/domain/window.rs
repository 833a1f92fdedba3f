use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Offset of the reference timezone used for "today" (UTC+8).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;

/// Build the reference offset from whole hours. Returns `None` outside the
/// range of real-world offsets.
pub fn reference_offset(hours: i32) -> Option<FixedOffset> {
    if !(-12..=14).contains(&hours) {
        return None;
    }
    FixedOffset::east_opt(hours * 3600)
}

/// The calendar day `now` falls on in the reference timezone.
pub fn reference_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Spend days are stored as `YYYY-MM-DD` text and compared as text, which
/// only orders correctly for four-digit, non-negative years.
pub fn is_storable_date(date: NaiveDate) -> bool {
    (0..=9999).contains(&date.year())
}

/// Rolling windows shown on the customer dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendWindow {
    /// Today only
    Today,
    /// From the most recent Sunday through today
    ThisWeek,
    /// Today and the six days before it
    Last7Days,
}

impl SpendWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpendWindow::Today => "today",
            SpendWindow::ThisWeek => "this_week",
            SpendWindow::Last7Days => "last_7_days",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "today" => Some(SpendWindow::Today),
            "this_week" | "week" => Some(SpendWindow::ThisWeek),
            "last_7_days" | "7d" => Some(SpendWindow::Last7Days),
            _ => None,
        }
    }

    /// Half-open date range `[start, end)` covered by this window when the
    /// reference day is `today`, which must be a storable date.
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = today + Days::new(1);
        let start = match self {
            SpendWindow::Today => today,
            SpendWindow::ThisWeek => {
                today - Days::new(u64::from(today.weekday().num_days_from_sunday()))
            }
            SpendWindow::Last7Days => today - Days::new(6),
        };
        (start, end)
    }
}

impl std::fmt::Display for SpendWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
