//! HTML fragments for the dashboard page.
//!
//! Each panel is rendered from a [`DashboardView`] and swapped in by HTMX.
//! While an ingestion error is active both panels show the error instead
//! of the last good data. The map itself lives in the page; the map panel
//! only carries its status or the marker data.

use std::fmt::Write as _;

use serde::Serialize;

use crate::dashboard::{DashboardView, ViewStatus};
use crate::filters::{FilterCriteria, TimeWindow};
use crate::models::Event;
use crate::output::{MagnitudeBand, RECENT_MILLIS, marker_radius};
use crate::stats::Derivation;

/// One map marker, consumed by the page's Leaflet script.
#[derive(Debug, Serialize)]
struct Marker<'a> {
    id: &'a str,
    lat: f64,
    lon: f64,
    depth_km: f64,
    magnitude: f64,
    radius: f64,
    color: &'static str,
    recent: bool,
    place: &'a str,
    time: String,
    url: &'a str,
}

impl<'a> Marker<'a> {
    fn new(event: &'a Event, now_millis: i64) -> Self {
        Self {
            id: &event.id,
            lat: event.latitude,
            lon: event.longitude,
            depth_km: event.depth_km,
            magnitude: event.magnitude,
            radius: marker_radius(event.magnitude),
            color: MagnitudeBand::from_magnitude(event.magnitude).hex(),
            recent: event.age_millis(now_millis) < RECENT_MILLIS,
            place: &event.place,
            time: format_time(event),
            url: &event.detail_url,
        }
    }
}

/// Escape text for HTML element content and quoted attributes.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_time(event: &Event) -> String {
    event.occurred_at().map_or_else(
        || "Unknown".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Statistics panel body.
#[must_use]
pub fn stats_panel(view: &DashboardView) -> String {
    let derivation = match &view.status {
        ViewStatus::Loading => return r#"<p class="muted">Loading statistics...</p>"#.into(),
        ViewStatus::Error { .. } => {
            return r#"<p class="muted">Unable to load statistics</p>"#.into();
        }
        ViewStatus::Ready(d) => d,
    };
    let stats = &derivation.statistics;

    let mut html = String::from(r#"<div class="stats-content">"#);
    let _ = write!(
        html,
        r#"<div class="stat-item"><span class="stat-label">Total Earthquakes:</span><span class="stat-value">{}</span></div>
<div class="stat-item"><span class="stat-label">Average Magnitude:</span><span class="stat-value">{:.2}</span></div>"#,
        stats.count, stats.average_magnitude
    );

    if let Some(quake) = &stats.max_magnitude_event {
        let _ = write!(
            html,
            r#"<div class="stat-item"><span class="stat-label">Strongest Earthquake:</span><span class="stat-value">{:.1}</span>
<div class="max-quake-info"><p>{}</p><p>{}</p></div></div>"#,
            stats.max_magnitude,
            escape(&quake.place),
            format_time(quake)
        );
    }

    if let Some(updated) = view.last_updated {
        let _ = write!(
            html,
            r#"<p class="updated">Last updated: {}</p>"#,
            updated.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    html.push_str("</div>");
    html
}

/// Map panel body.
#[must_use]
pub fn map_panel(view: &DashboardView) -> String {
    match &view.status {
        ViewStatus::Loading => r#"<div class="loading"><div class="loading-spinner"></div><p>Loading earthquake data...</p></div>"#.into(),
        ViewStatus::Error { message } => {
            format!(r#"<div class="error">Error: {}</div>"#, escape(message))
        }
        ViewStatus::Ready(d) if d.events.is_empty() => {
            r#"<div class="no-data">No earthquake data available for the selected filters.</div>"#.into()
        }
        ViewStatus::Ready(d) => format!(
            r#"<script type="application/json" id="quake-data">{}</script>"#,
            markers_json(d)
        ),
    }
}

/// Markers as a JSON array that is safe to inline in a `<script>`.
///
/// `<`, `>` and `&` only occur inside JSON strings, where the `\uXXXX`
/// forms decode to the same text.
fn markers_json(derivation: &Derivation) -> String {
    let markers: Vec<Marker<'_>> = derivation
        .events
        .iter()
        .map(|e| Marker::new(e, derivation.now_millis))
        .collect();
    serde_json::to_string(&markers)
        .unwrap_or_else(|_| "[]".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

/// Sentence under the filter controls.
#[must_use]
pub fn filter_info(criteria: &FilterCriteria) -> String {
    format!(
        r#"<div id="filter-info" class="filter-info"><p>{}</p></div>"#,
        escape(&criteria.describe())
    )
}

/// `<option>` list for the period control.
#[must_use]
pub fn period_options(criteria: &FilterCriteria) -> String {
    let selected = criteria.window();
    TimeWindow::ALL
        .iter()
        .map(|w| {
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                w.as_millis(),
                if selected == Some(*w) { " selected" } else { "" },
                w.label()
            )
        })
        .collect()
}

/// Whole-number presets offered next to the magnitude slider.
pub const MAGNITUDE_PRESETS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

/// `<option>` list for the magnitude preset control.
///
/// A slider value between presets selects the blank "Custom" entry.
#[must_use]
pub fn magnitude_options(criteria: &FilterCriteria) -> String {
    let current = criteria.min_magnitude;
    let mut html = String::new();
    let mut matched = false;
    for preset in MAGNITUDE_PRESETS {
        let selected = (current - f64::from(preset)).abs() < f64::EPSILON;
        matched |= selected;
        let label = if preset == 0 {
            "All".to_string()
        } else {
            format!("{preset}+")
        };
        let _ = write!(
            html,
            r#"<option value="{preset}"{}>{label}</option>"#,
            if selected { " selected" } else { "" }
        );
    }
    let _ = write!(
        html,
        r#"<option value=""{} disabled>Custom</option>"#,
        if matched { "" } else { " selected" }
    );
    html
}

/// Magnitude legend rows.
#[must_use]
pub fn legend() -> String {
    MagnitudeBand::ALL
        .iter()
        .map(|band| {
            format!(
                r#"<div class="legend-item"><div class="legend-color" style="background-color: {}"></div><span class="legend-range">{}</span><span class="legend-desc">{}</span></div>"#,
                band.hex(),
                escape(band.range()),
                band.description()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::event;
    use crate::stats::derive;

    const NOW: i64 = 1_700_000_000_000;

    fn view(status: ViewStatus) -> DashboardView {
        DashboardView {
            status,
            refreshing: false,
            snapshot_len: 0,
            criteria: FilterCriteria::default(),
            last_updated: None,
        }
    }

    fn ready(events: &[Event]) -> DashboardView {
        view(ViewStatus::Ready(derive(events, &FilterCriteria::default(), NOW)))
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_loading_panels() {
        let v = view(ViewStatus::Loading);
        assert!(stats_panel(&v).contains("Loading statistics..."));
        assert!(map_panel(&v).contains("Loading earthquake data..."));
    }

    #[test]
    fn test_error_panels_hide_data() {
        let v = view(ViewStatus::Error {
            message: "feed returned HTTP error (status 500): <oops>".into(),
        });
        assert!(stats_panel(&v).contains("Unable to load statistics"));
        let map = map_panel(&v);
        assert!(map.contains("Error: feed returned HTTP error (status 500)"));
        assert!(map.contains("&lt;oops&gt;"));
    }

    #[test]
    fn test_ready_panels() {
        let v = ready(&[event("a", 2.0, 600_000, NOW), event("b", 5.5, 7_200_000, NOW)]);

        let stats = stats_panel(&v);
        assert!(stats.contains(">2<"));
        assert!(stats.contains("3.75"));
        assert!(stats.contains("5.5"));
        assert!(stats.contains("10 km N of b"));

        let map = map_panel(&v);
        assert!(map.starts_with(r#"<script type="application/json" id="quake-data">"#));
        assert!(!map.contains("quake-map"));
        assert!(map.contains(r##""color":"#FF0000""##));
        assert!(map.contains(r#""recent":true"#));
    }

    #[test]
    fn test_marker_data_is_valid_json() {
        let v = ready(&[event("a", 2.0, 600_000, NOW)]);
        let map = map_panel(&v);
        let json = map
            .trim_start_matches(r#"<script type="application/json" id="quake-data">"#)
            .trim_end_matches("</script>");

        let markers: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(markers[0]["id"], "a");
        assert_eq!(markers[0]["place"], "10 km N of a");
    }

    #[test]
    fn test_empty_selection() {
        let v = ready(&[]);
        assert!(map_panel(&v).contains("No earthquake data available"));
        let stats = stats_panel(&v);
        assert!(stats.contains(">0<"));
        assert!(!stats.contains("Strongest"));
    }

    #[test]
    fn test_script_breakout_escaped() {
        let mut quake = event("a", 3.0, 1_000, NOW);
        quake.place = "</script><script>alert(1)".into();
        let map = map_panel(&ready(&[quake]));
        assert!(!map.contains("</script><script>alert"));
    }

    #[test]
    fn test_comment_open_escaped() {
        let mut quake = event("a", 3.0, 1_000, NOW);
        quake.place = "<!--<script> & more".into();
        let map = map_panel(&ready(&[quake]));

        let body = map
            .trim_start_matches(r#"<script type="application/json" id="quake-data">"#)
            .trim_end_matches("</script>");
        assert!(!body.contains('<'));
        assert!(!body.contains('&'));

        let markers: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(markers[0]["place"], "<!--<script> & more");
    }

    #[test]
    fn test_magnitude_options() {
        let html = magnitude_options(&FilterCriteria::default());
        assert!(html.contains(r#"<option value="0" selected>All</option>"#));
        assert!(html.contains(r#"<option value="7">7+</option>"#));
        assert!(html.contains(r#"<option value="" disabled>Custom</option>"#));

        let custom = magnitude_options(&FilterCriteria {
            min_magnitude: 2.5,
            ..FilterCriteria::default()
        });
        assert!(!custom.contains(" selected>All"));
        assert!(custom.contains(r#"<option value="" selected disabled>Custom</option>"#));

        let three = magnitude_options(&FilterCriteria {
            min_magnitude: 3.0,
            ..FilterCriteria::default()
        });
        assert!(three.contains(r#"<option value="3" selected>3+</option>"#));
    }

    #[test]
    fn test_period_options_select_current() {
        let html = period_options(&FilterCriteria::default());
        assert!(html.contains(r#"<option value="86400000" selected>Last 24 Hours</option>"#));
        assert!(html.contains(r#"<option value="3600000">Last Hour</option>"#));
    }

    #[test]
    fn test_legend_lists_all_bands() {
        let html = legend();
        assert_eq!(html.matches("legend-item").count(), 6);
        assert!(html.contains("&lt; 1"));
    }
}
