//! Output formatting for derived event lists.
//!
//! The magnitude legend is shared by the terminal renderer and the map
//! markers. The snapshot command writes either colour-coded text or JSON.

use std::io::{self, Write};

use serde::Serialize;

use crate::filters::FilterCriteria;
use crate::models::Event;
use crate::stats::{Derivation, Statistics};

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

/// Events younger than this are flagged as recent.
pub const RECENT_MILLIS: i64 = 3_600_000;

/// Smallest marker radius in pixels.
const MIN_MARKER_RADIUS: f64 = 5.0;

/// Magnitude legend bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnitudeBand {
    Micro,
    Minor,
    Weak,
    Light,
    Moderate,
    Strong,
}

impl MagnitudeBand {
    /// All bands, weakest first.
    pub const ALL: [Self; 6] = [
        Self::Micro,
        Self::Minor,
        Self::Weak,
        Self::Light,
        Self::Moderate,
        Self::Strong,
    ];

    #[must_use]
    pub fn from_magnitude(mag: f64) -> Self {
        match mag {
            m if m < 1.0 => Self::Micro,
            m if m < 2.0 => Self::Minor,
            m if m < 3.0 => Self::Weak,
            m if m < 4.0 => Self::Light,
            m if m < 5.0 => Self::Moderate,
            _ => Self::Strong,
        }
    }

    /// Range label for the legend.
    #[must_use]
    pub const fn range(self) -> &'static str {
        match self {
            Self::Micro => "< 1",
            Self::Minor => "1-2",
            Self::Weak => "2-3",
            Self::Light => "3-4",
            Self::Moderate => "4-5",
            Self::Strong => "≥ 5",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Micro => "Micro - Not felt",
            Self::Minor => "Minor - Rarely felt",
            Self::Weak => "Minor - Weak",
            Self::Light => "Light - Noticeable",
            Self::Moderate => "Moderate - Can cause damage",
            Self::Strong => "Strong+ - Significant damage",
        }
    }

    /// Marker fill colour.
    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Micro => "#00FF00",
            Self::Minor => "#ADFF2F",
            Self::Weak => "#FFFF00",
            Self::Light => "#FFA500",
            Self::Moderate => "#FF4500",
            Self::Strong => "#FF0000",
        }
    }

    const fn ansi(self) -> &'static str {
        match self {
            Self::Micro => "\x1b[92m",
            Self::Minor => "\x1b[32m",
            Self::Weak => "\x1b[93m",
            Self::Light => "\x1b[33m",
            Self::Moderate => "\x1b[91m",
            Self::Strong => "\x1b[31m",
        }
    }
}

/// Marker radius for a magnitude.
#[must_use]
pub fn marker_radius(mag: f64) -> f64 {
    (mag * 3.0).max(MIN_MARKER_RADIUS)
}

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// Single JSON document
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown format: {s} (expected: human, json)")),
        }
    }
}

/// JSON document written by the snapshot command.
#[derive(Debug, Serialize)]
struct Report<'a> {
    criteria: &'a FilterCriteria,
    statistics: &'a Statistics,
    events: &'a [Event],
}

fn format_time(event: &Event) -> String {
    event
        .occurred_at()
        .map_or_else(|| "unknown".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn place(event: &Event) -> &str {
    if event.place.is_empty() {
        "Unknown location"
    } else {
        &event.place
    }
}

/// Write events one per line, colour-coded by magnitude band.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(writer: &mut W, events: &[Event], now_millis: i64) -> io::Result<()> {
    for event in events {
        let band = MagnitudeBand::from_magnitude(event.magnitude);
        let color = band.ansi();
        let mag_type = event.magnitude_type.as_deref().unwrap_or("?");
        let recent = if event.age_millis(now_millis) < RECENT_MILLIS {
            " ●"
        } else {
            ""
        };

        writeln!(
            writer,
            "{color}{BOLD}M{mag:.1}{RESET} {DIM}{mag_type:3}{RESET} │ \
             {DIM}{depth:>5.1}km{RESET} │ \
             {time} UTC │ \
             {place}{color}{recent}{RESET}",
            mag = event.magnitude,
            depth = event.depth_km,
            time = format_time(event),
            place = place(event),
        )?;
    }
    Ok(())
}

/// Write the statistics block.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_statistics<W: Write>(writer: &mut W, stats: &Statistics) -> io::Result<()> {
    writeln!(writer, "{BOLD}Earthquake Statistics{RESET}")?;
    writeln!(writer, "  Total Earthquakes:  {}", stats.count)?;
    writeln!(writer, "  Average Magnitude:  {:.2}", stats.average_magnitude)?;
    if let Some(strongest) = &stats.max_magnitude_event {
        writeln!(
            writer,
            "  Strongest:          M{:.1} {} ({} UTC)",
            stats.max_magnitude,
            place(strongest),
            format_time(strongest)
        )?;
    }
    Ok(())
}

/// Write a derivation in the requested format.
///
/// `limit` caps the listed events; statistics always cover the whole
/// filtered list.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_derivation<W: Write>(
    writer: &mut W,
    derivation: &Derivation,
    criteria: &FilterCriteria,
    limit: usize,
    format: Format,
) -> io::Result<()> {
    let shown = &derivation.events[..derivation.events.len().min(limit)];
    match format {
        Format::Human => {
            writeln!(writer, "{DIM}{}{RESET}", criteria.describe())?;
            write_events(writer, shown, derivation.now_millis)?;
            if shown.len() < derivation.events.len() {
                writeln!(
                    writer,
                    "{DIM}… {} more{RESET}",
                    derivation.events.len() - shown.len()
                )?;
            }
            writeln!(writer)?;
            write_statistics(writer, &derivation.statistics)
        }
        Format::Json => {
            let report = Report {
                criteria,
                statistics: &derivation.statistics,
                events: shown,
            };
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{json}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::event;
    use crate::stats::derive;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_format_parse() {
        assert_eq!("human".parse::<Format>().unwrap(), Format::Human);
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert!("ndjson".parse::<Format>().is_err());
    }

    #[test]
    fn test_magnitude_bands() {
        assert_eq!(MagnitudeBand::from_magnitude(-0.5), MagnitudeBand::Micro);
        assert_eq!(MagnitudeBand::from_magnitude(1.0), MagnitudeBand::Minor);
        assert_eq!(MagnitudeBand::from_magnitude(2.99), MagnitudeBand::Weak);
        assert_eq!(MagnitudeBand::from_magnitude(4.5), MagnitudeBand::Moderate);
        assert_eq!(MagnitudeBand::from_magnitude(7.1), MagnitudeBand::Strong);
        assert_eq!(MagnitudeBand::Strong.hex(), "#FF0000");
    }

    #[test]
    fn test_marker_radius_floor() {
        assert!((marker_radius(0.4) - 5.0).abs() < f64::EPSILON);
        assert!((marker_radius(4.0) - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_human_output_lists_and_summarizes() {
        let events = vec![event("a", 2.0, 600_000, NOW), event("b", 5.5, 7_200_000, NOW)];
        let criteria = FilterCriteria::default();
        let d = derive(&events, &criteria, NOW);

        let mut buf = Vec::new();
        write_derivation(&mut buf, &d, &criteria, 1, Format::Human).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("M2.0"));
        assert_eq!(text.lines().filter(|l| l.contains('│')).count(), 1);
        assert!(text.contains("1 more"));
        assert!(text.contains("Total Earthquakes:  2"));
        assert!(text.contains("Average Magnitude:  3.75"));
        assert!(text.contains("10 km N of b"));
    }

    #[test]
    fn test_json_output() {
        let events = vec![event("a", 2.0, 600_000, NOW)];
        let criteria = FilterCriteria::default();
        let d = derive(&events, &criteria, NOW);

        let mut buf = Vec::new();
        write_derivation(&mut buf, &d, &criteria, 50, Format::Json).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        assert_eq!(json["statistics"]["count"], 1);
        assert_eq!(json["events"][0]["id"], "a");
        assert_eq!(json["criteria"]["max_age_millis"], 86_400_000);
    }
}
