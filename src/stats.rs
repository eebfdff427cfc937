//! Summary statistics over a filtered event list.

use serde::Serialize;

use crate::filters::{self, FilterCriteria};
use crate::models::Event;

/// Aggregate statistics for a list of events.
///
/// All-zero with no strongest event when the list is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub average_magnitude: f64,
    pub max_magnitude: f64,
    pub max_magnitude_event: Option<Event>,
}

/// Summarize `events` in a single pass.
///
/// The strongest event is the first one holding the greatest magnitude.
#[must_use]
pub fn summarize(events: &[Event]) -> Statistics {
    let Some(first) = events.first() else {
        return Statistics::default();
    };

    let mut total = 0.0;
    let mut strongest = first;
    for event in events {
        total += event.magnitude;
        if event.magnitude > strongest.magnitude {
            strongest = event;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let average_magnitude = total / events.len() as f64;

    Statistics {
        count: events.len(),
        average_magnitude,
        max_magnitude: strongest.magnitude,
        max_magnitude_event: Some(strongest.clone()),
    }
}

/// Result of one derivation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Derivation {
    /// The `now` sample every event was judged against
    pub now_millis: i64,
    pub events: Vec<Event>,
    pub statistics: Statistics,
}

/// Filter `events` with `criteria` and summarize the result.
#[must_use]
pub fn derive(events: &[Event], criteria: &FilterCriteria, now_millis: i64) -> Derivation {
    let events = filters::filter(events, criteria, now_millis);
    let statistics = summarize(&events);
    Derivation {
        now_millis,
        events,
        statistics,
    }
}
