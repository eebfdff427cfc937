//! Filter criteria and the event filter.
//!
//! The engine accepts any magnitude bound and any age bound; the ranges
//! offered by the dashboard controls are enforced only by
//! [`FilterCriteria::from_controls`].

use serde::{Deserialize, Serialize};

use crate::models::Event;

/// Lowest magnitude the slider offers.
pub const MIN_MAGNITUDE_CONTROL: f64 = 0.0;

/// Highest magnitude the slider offers.
pub const MAX_MAGNITUDE_CONTROL: f64 = 8.0;

const HOUR_MILLIS: i64 = 3_600_000;
const DAY_MILLIS: i64 = 86_400_000;
const WEEK_MILLIS: i64 = 604_800_000;

/// Recency windows offered by the period control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeWindow {
    LastHour,
    #[default]
    LastDay,
    LastWeek,
}

impl TimeWindow {
    /// All windows, in the order the control lists them.
    pub const ALL: [Self; 3] = [Self::LastHour, Self::LastDay, Self::LastWeek];

    #[must_use]
    pub const fn as_millis(self) -> i64 {
        match self {
            Self::LastHour => HOUR_MILLIS,
            Self::LastDay => DAY_MILLIS,
            Self::LastWeek => WEEK_MILLIS,
        }
    }

    /// Look up the window for an exact millisecond value.
    #[must_use]
    pub fn from_millis(millis: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.as_millis() == millis)
    }

    /// Label shown next to the period control.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LastHour => "Last Hour",
            Self::LastDay => "Last 24 Hours",
            Self::LastWeek => "Last 7 Days",
        }
    }
}

impl std::str::FromStr for TimeWindow {
    type Err = String;

    /// Accepts a name (`hour`, `day`, `week`) or the exact millisecond value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" | "1h" => Ok(Self::LastHour),
            "day" | "24h" => Ok(Self::LastDay),
            "week" | "7d" => Ok(Self::LastWeek),
            other => other
                .parse::<i64>()
                .ok()
                .and_then(Self::from_millis)
                .ok_or_else(|| format!("unknown period: {s} (expected: hour, day, week)")),
        }
    }
}

/// User-selected filter criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Inclusive lower bound on magnitude
    pub min_magnitude: f64,
    /// Inclusive upper bound on `now - occurred_at`
    pub max_age_millis: i64,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            min_magnitude: 0.0,
            max_age_millis: DAY_MILLIS,
        }
    }
}

impl FilterCriteria {
    /// Build criteria from the dashboard controls, rejecting values the
    /// controls cannot produce.
    ///
    /// # Errors
    ///
    /// Returns a message if the magnitude is outside 0–8 or the age is not
    /// one of the offered windows.
    pub fn from_controls(min_magnitude: f64, max_age_millis: i64) -> Result<Self, String> {
        if !(MIN_MAGNITUDE_CONTROL..=MAX_MAGNITUDE_CONTROL).contains(&min_magnitude) {
            return Err(format!(
                "min_magnitude {min_magnitude} out of range [{MIN_MAGNITUDE_CONTROL}, {MAX_MAGNITUDE_CONTROL}]"
            ));
        }
        if TimeWindow::from_millis(max_age_millis).is_none() {
            return Err(format!(
                "max_age_millis {max_age_millis} must be one of {HOUR_MILLIS}, {DAY_MILLIS}, {WEEK_MILLIS}"
            ));
        }
        Ok(Self {
            min_magnitude,
            max_age_millis,
        })
    }

    /// Check if an event passes both criteria at the instant `now_millis`.
    #[must_use]
    pub fn matches(&self, event: &Event, now_millis: i64) -> bool {
        self.check_magnitude(event) && self.check_age(event, now_millis)
    }

    fn check_magnitude(&self, event: &Event) -> bool {
        event.magnitude >= self.min_magnitude
    }

    fn check_age(&self, event: &Event, now_millis: i64) -> bool {
        event.age_millis(now_millis) <= self.max_age_millis
    }

    /// The window matching `max_age_millis`, if it is one of the offered ones.
    #[must_use]
    pub fn window(&self) -> Option<TimeWindow> {
        TimeWindow::from_millis(self.max_age_millis)
    }

    /// Sentence summarizing the active filter.
    #[must_use]
    pub fn describe(&self) -> String {
        let period = self
            .window()
            .map_or_else(|| "custom period".to_string(), |w| w.label().to_lowercase());
        format!(
            "Showing earthquakes with magnitude {}+ from the {period}",
            self.min_magnitude
        )
    }
}

/// Keep the events passing `criteria`, in input order.
///
/// `now_millis` is sampled once by the caller so every event is judged
/// against the same cutoff.
#[must_use]
pub fn filter(events: &[Event], criteria: &FilterCriteria, now_millis: i64) -> Vec<Event> {
    events
        .iter()
        .filter(|e| criteria.matches(e, now_millis))
        .cloned()
        .collect()
}
