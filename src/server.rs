//! Web server for the quakeview dashboard.
//!
//! Provides the browser dashboard using:
//! - Axum for HTTP server
//! - SSE (Server-Sent Events) to tell the page when to re-fetch panels
//! - HTMX for panel swaps without a client-side app
//! - Leaflet for the map

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Form, Json, Router,
    extract::State,
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::{debug, info, warn};

use crate::client::FeedClient;
use crate::config::DashboardConfig;
use crate::dashboard::{Dashboard, DashboardUpdate, DashboardView};
use crate::errors::ApiError;
use crate::filters::{FilterCriteria, TimeWindow};
use crate::prefs::PreferenceStore;
use crate::render;
use crate::scheduler::{self, Ingestor};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    dashboard: Arc<Dashboard>,
    prefs: Arc<PreferenceStore>,
    /// Flips to `true` when the server starts shutting down
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    #[must_use]
    pub fn new(
        dashboard: Arc<Dashboard>,
        prefs: Arc<PreferenceStore>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            dashboard,
            prefs,
            shutdown,
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/panels/map", get(map_panel_handler))
        .route("/panels/stats", get(stats_panel_handler))
        .route("/criteria", post(criteria_form_handler))
        .route("/stream", get(sse_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route(
            "/api/criteria",
            get(get_criteria_handler).put(put_criteria_handler),
        )
        .route("/api/preferences", get(preferences_handler))
        .route("/api/preferences/theme", put(theme_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the dashboard: load preferences, start ingestion, serve HTTP
/// until Ctrl-C, then stop the refresh timer.
pub async fn run_server(config: DashboardConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;

    let client = FeedClient::new(config.feed_url.clone()).context("failed to create feed client")?;
    let prefs = PreferenceStore::load(&config.prefs_path)
        .await
        .with_context(|| format!("failed to load {}", config.prefs_path.display()))?;
    info!(
        "preferences at {} (dark mode: {:?})",
        prefs.path().display(),
        prefs.dark_mode().await
    );

    let dashboard = Arc::new(Dashboard::new(config.criteria));
    let scheduler = scheduler::spawn(
        Ingestor::new(client, Arc::clone(&dashboard)),
        config.refresh_interval,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = create_router(AppState::new(dashboard, Arc::new(prefs), shutdown_rx));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🌍 quakeview dashboard at http://{addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
            // Ends open SSE streams so connections can drain.
            let _ = shutdown_tx.send(true);
        })
        .await;

    scheduler.shutdown().await;
    served.context("server error")
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Main page handler - serves the dashboard with the current criteria.
async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let criteria = state.dashboard.criteria().await;
    let dark_mode = match state.prefs.dark_mode().await {
        Some(true) => "true",
        Some(false) => "false",
        None => "null",
    };

    Html(
        INDEX_HTML
            .replace("{{MIN_MAGNITUDE}}", &format!("{:.1}", criteria.min_magnitude))
            .replace("{{MAGNITUDE_OPTIONS}}", &render::magnitude_options(&criteria))
            .replace("{{PERIOD_OPTIONS}}", &render::period_options(&criteria))
            .replace("{{FILTER_INFO}}", &render::filter_info(&criteria))
            .replace("{{LEGEND}}", &render::legend())
            .replace("{{DARK_MODE}}", dark_mode)
            .replace("{{VERSION}}", env!("CARGO_PKG_VERSION")),
    )
}

async fn map_panel_handler(State(state): State<AppState>) -> Html<String> {
    Html(render::map_panel(&state.dashboard.view().await))
}

async fn stats_panel_handler(State(state): State<AppState>) -> Html<String> {
    Html(render::stats_panel(&state.dashboard.view().await))
}

/// Form posted by the filter controls.
#[derive(Debug, Deserialize)]
struct CriteriaForm {
    min_magnitude: f64,
    period: String,
}

/// Filter controls changed: store the criteria and return the new summary line.
async fn criteria_form_handler(
    State(state): State<AppState>,
    Form(form): Form<CriteriaForm>,
) -> Result<Html<String>, ApiError> {
    let window: TimeWindow = form.period.parse().map_err(ApiError::InvalidCriteria)?;
    let criteria = FilterCriteria::from_controls(form.min_magnitude, window.as_millis())
        .map_err(ApiError::InvalidCriteria)?;

    state.dashboard.set_criteria(criteria).await;
    Ok(Html(render::filter_info(&criteria)))
}

/// SSE stream handler: one `refresh` event per dashboard change.
///
/// A client that fell behind the broadcast buffer gets a single `refresh`
/// in place of the updates it skipped.
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let updates = BroadcastStream::new(state.dashboard.subscribe()).map(|result| match result {
        Ok(update) => Some(update),
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            debug!("sse client lagged, {missed} updates skipped");
            Some(DashboardUpdate::Refreshed)
        }
    });
    let closing = WatchStream::new(state.shutdown.clone())
        .filter_map(|stopping| if stopping { Some(None) } else { None });

    let stream = updates
        .merge(closing)
        .take_while(Option::is_some)
        .filter_map(|update| {
            update.map(|u| Ok(Event::default().event("refresh").data(u.as_str())))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn dashboard_handler(State(state): State<AppState>) -> Json<DashboardView> {
    Json(state.dashboard.view().await)
}

async fn get_criteria_handler(State(state): State<AppState>) -> Json<FilterCriteria> {
    Json(state.dashboard.criteria().await)
}

async fn put_criteria_handler(
    State(state): State<AppState>,
    Json(body): Json<FilterCriteria>,
) -> Result<Json<FilterCriteria>, ApiError> {
    let criteria = FilterCriteria::from_controls(body.min_magnitude, body.max_age_millis)
        .map_err(ApiError::InvalidCriteria)?;
    state.dashboard.set_criteria(criteria).await;
    Ok(Json(criteria))
}

/// Theme preference as seen by the page; `null` means "follow the system".
#[derive(Debug, Serialize, Deserialize)]
struct ThemePreference {
    dark_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ThemeUpdate {
    dark_mode: bool,
}

async fn preferences_handler(State(state): State<AppState>) -> Json<ThemePreference> {
    Json(ThemePreference {
        dark_mode: state.prefs.dark_mode().await,
    })
}

async fn theme_handler(
    State(state): State<AppState>,
    Json(body): Json<ThemeUpdate>,
) -> Result<Json<ThemePreference>, ApiError> {
    state.prefs.set_dark_mode(body.dark_mode).await?;
    Ok(Json(ThemePreference {
        dark_mode: Some(body.dark_mode),
    }))
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Earthquake Visualizer</title>

    <!-- HTMX + SSE -->
    <script src="https://unpkg.com/htmx.org@1.9.10"></script>
    <script src="https://unpkg.com/htmx.org@1.9.10/dist/ext/sse.js"></script>

    <!-- Leaflet -->
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>

    <script>
        (function () {
            var stored = {{DARK_MODE}};
            var dark = stored === null
                ? window.matchMedia('(prefers-color-scheme: dark)').matches
                : stored;
            document.documentElement.classList.toggle('dark-mode', dark);
        })();
    </script>

    <style>
        :root {
            --bg: #f5f7fa;
            --panel: #ffffff;
            --text: #1f2933;
            --muted: #6b7280;
            --border: #e2e8f0;
            --accent: #2563eb;
            --danger: #dc2626;
        }

        html.dark-mode {
            --bg: #0f1115;
            --panel: #1a1d23;
            --text: #f3f4f6;
            --muted: #9ca3af;
            --border: #2d3139;
            --accent: #60a5fa;
            --danger: #f87171;
        }

        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
            background: var(--bg);
            color: var(--text);
            line-height: 1.5;
        }

        .app-header { background: var(--panel); border-bottom: 1px solid var(--border); padding: 1rem 2rem; }
        .header-content { display: flex; justify-content: space-between; align-items: center; }
        .app-header p { color: var(--muted); font-size: 0.9rem; }

        .dark-mode-toggle {
            background: none; border: 1px solid var(--border); border-radius: 8px;
            color: var(--text); cursor: pointer; padding: 0.4rem 0.5rem; line-height: 0;
        }
        .dark-mode-toggle .icon-sun { display: none; }
        html.dark-mode .dark-mode-toggle .icon-sun { display: inline; }
        html.dark-mode .dark-mode-toggle .icon-moon { display: none; }

        .dashboard { display: grid; grid-template-columns: 320px 1fr; gap: 1.5rem; padding: 1.5rem 2rem; }
        .sidebar > div, .map-panel { background: var(--panel); border: 1px solid var(--border); border-radius: 10px; padding: 1rem; }
        .sidebar > div + div { margin-top: 1rem; }
        h3 { font-size: 1rem; margin-bottom: 0.75rem; }

        .filter-group { margin-bottom: 1rem; }
        .filter-group label { display: block; font-size: 0.85rem; margin-bottom: 0.35rem; }
        .filter-value { font-weight: 600; color: var(--accent); }
        .magnitude-slider { width: 100%; }
        .slider-container { margin-bottom: 0.5rem; }
        .slider-labels { display: flex; justify-content: space-between; font-size: 0.7rem; color: var(--muted); }
        .filter-select { width: 100%; padding: 0.35rem; background: var(--panel); color: var(--text); border: 1px solid var(--border); border-radius: 6px; }
        .filter-info, .muted, .updated { color: var(--muted); font-size: 0.8rem; }

        .legend-item { display: flex; align-items: center; gap: 0.5rem; font-size: 0.8rem; margin: 0.25rem 0; }
        .legend-color { width: 14px; height: 14px; border-radius: 50%; border: 1px solid #000; }
        .legend-range { font-weight: 600; min-width: 2.5rem; }
        .legend-desc { color: var(--muted); }

        .stat-item { display: flex; flex-wrap: wrap; justify-content: space-between; margin: 0.35rem 0; font-size: 0.9rem; }
        .stat-value { font-weight: 700; }
        .max-quake-info { width: 100%; color: var(--muted); font-size: 0.8rem; }

        .map-panel { min-height: 80vh; }
        #quake-map { height: 78vh; width: 100%; border-radius: 8px; }
        [hidden] { display: none !important; }
        .loading, .no-data, .error { display: flex; flex-direction: column; align-items: center; justify-content: center; min-height: 60vh; color: var(--muted); }
        .error { color: var(--danger); font-weight: 600; }
        .loading-spinner {
            width: 40px; height: 40px; border: 4px solid var(--border); border-top-color: var(--accent);
            border-radius: 50%; animation: spin 1s linear infinite; margin-bottom: 1rem;
        }
        @keyframes spin { to { transform: rotate(360deg); } }

        .pulse-marker { animation: pulse 1.5s ease-in-out infinite; }
        @keyframes pulse { 0%, 100% { stroke-opacity: 1; } 50% { stroke-opacity: 0.2; } }

        .app-footer { text-align: center; color: var(--muted); font-size: 0.8rem; padding: 1rem; }
        .app-footer a { color: var(--accent); }

        @media (max-width: 900px) {
            .dashboard { grid-template-columns: 1fr; padding: 1rem; }
        }
    </style>
</head>
<body>
    <header class="app-header">
        <div class="header-content">
            <div>
                <h1>Earthquake Visualizer</h1>
                <p>Real-time visualization of global seismic activity</p>
            </div>
            <button class="dark-mode-toggle" id="dark-mode-toggle" onclick="toggleDarkMode()"
                    aria-label="Switch to dark mode" title="Switch to dark mode">
                <svg class="icon-sun" xmlns="http://www.w3.org/2000/svg" width="20" height="20" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round">
                    <circle cx="12" cy="12" r="5"></circle>
                    <line x1="12" y1="1" x2="12" y2="3"></line><line x1="12" y1="21" x2="12" y2="23"></line>
                    <line x1="4.22" y1="4.22" x2="5.64" y2="5.64"></line><line x1="18.36" y1="18.36" x2="19.78" y2="19.78"></line>
                    <line x1="1" y1="12" x2="3" y2="12"></line><line x1="21" y1="12" x2="23" y2="12"></line>
                    <line x1="4.22" y1="19.78" x2="5.64" y2="18.36"></line><line x1="18.36" y1="5.64" x2="19.78" y2="4.22"></line>
                </svg>
                <svg class="icon-moon" xmlns="http://www.w3.org/2000/svg" width="20" height="20" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round">
                    <path d="M21 12.79A9 9 0 1 1 11.21 3 7 7 0 0 0 21 12.79z"></path>
                </svg>
            </button>
        </div>
    </header>

    <main class="dashboard" hx-ext="sse" sse-connect="/stream">
        <div class="sidebar">
            <div class="filters">
                <h3>Filter Earthquakes</h3>
                <form hx-post="/criteria" hx-trigger="change" hx-target="#filter-info" hx-swap="outerHTML">
                    <div class="filter-group">
                        <label for="magnitude-slider">
                            Minimum Magnitude: <span class="filter-value" id="magnitude-value">{{MIN_MAGNITUDE}}</span>
                        </label>
                        <div class="slider-container">
                            <input type="range" id="magnitude-slider" name="min_magnitude"
                                   min="0" max="8" step="0.1" value="{{MIN_MAGNITUDE}}"
                                   class="magnitude-slider" oninput="syncMagnitude(this.value)">
                            <div class="slider-labels"><span>0</span><span>2</span><span>4</span><span>6</span><span>8</span></div>
                        </div>
                        <select id="magnitude-filter" class="filter-select" aria-label="Magnitude preset"
                                onchange="syncMagnitude(this.value)">
                            {{MAGNITUDE_OPTIONS}}
                        </select>
                    </div>
                    <div class="filter-group">
                        <label for="time-filter">Time Period</label>
                        <select id="time-filter" name="period" class="filter-select">
                            {{PERIOD_OPTIONS}}
                        </select>
                    </div>
                </form>
                {{FILTER_INFO}}
            </div>

            <div class="legend">
                <h3>Magnitude Scale</h3>
                <p class="muted">Color-coded by earthquake intensity</p>
                {{LEGEND}}
                <p class="muted">Recent earthquakes (&lt; 1 hour) pulse on the map</p>
            </div>

            <div class="stats-panel">
                <h3>Earthquake Statistics</h3>
                <div id="stats-body" hx-get="/panels/stats" hx-trigger="load, sse:refresh">
                    <p class="muted">Loading statistics...</p>
                </div>
            </div>
        </div>

        <div class="map-panel">
            <div id="map-status" hx-get="/panels/map" hx-trigger="load, sse:refresh">
                <div class="loading"><div class="loading-spinner"></div><p>Loading earthquake data...</p></div>
            </div>
            <div class="map-container"><div id="quake-map" hidden></div></div>
        </div>
    </main>

    <footer class="app-footer">
        <p>Data source: <a href="https://earthquake.usgs.gov/" target="_blank" rel="noopener noreferrer">USGS Earthquake Hazards Program</a> · quakeview v{{VERSION}}</p>
    </footer>

    <script>
        var quakeMap = null;
        var quakeLayer = null;
        var openQuakeId = null;

        // The map is built once; refreshes only replace the marker layer,
        // so zoom, pan and the chosen base layer survive.
        function ensureMap() {
            if (quakeMap) { return quakeMap; }
            quakeMap = L.map('quake-map', { center: [20, 0], zoom: 2 });

            var streets = L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
                attribution: '&copy; OpenStreetMap contributors'
            }).addTo(quakeMap);
            var satellite = L.tileLayer('https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}', {
                attribution: '&copy; Esri'
            });
            var terrain = L.tileLayer('https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png', {
                attribution: '&copy; OpenTopoMap contributors'
            });
            L.control.layers({ 'OpenStreetMap': streets, 'Satellite': satellite, 'Terrain': terrain }).addTo(quakeMap);

            quakeLayer = L.layerGroup().addTo(quakeMap);
            return quakeMap;
        }

        function quakePopup(q) {
            var popup = document.createElement('div');
            var title = document.createElement('h3');
            title.style.color = q.color;
            title.textContent = 'Magnitude: ' + q.magnitude.toFixed(1);
            popup.appendChild(title);
            [['Location', q.place], ['Time', q.time], ['Depth', q.depth_km.toFixed(1) + ' km'],
             ['Coordinates', q.lat.toFixed(4) + ', ' + q.lon.toFixed(4)]].forEach(function (row) {
                var p = document.createElement('p');
                p.textContent = row[0] + ': ' + row[1];
                popup.appendChild(p);
            });
            if (q.url) {
                var link = document.createElement('a');
                link.href = q.url;
                link.target = '_blank';
                link.rel = 'noopener noreferrer';
                link.textContent = 'View USGS Details';
                popup.appendChild(link);
            }
            return popup;
        }

        function quakeTooltip(q) {
            var tip = document.createElement('div');
            var strong = document.createElement('strong');
            strong.textContent = 'Magnitude: ' + q.magnitude.toFixed(1);
            tip.appendChild(strong);
            tip.appendChild(document.createElement('br'));
            tip.appendChild(document.createTextNode(q.place));
            return tip;
        }

        function renderQuakes(quakes) {
            document.getElementById('quake-map').hidden = false;
            ensureMap().invalidateSize();

            var reopen = openQuakeId;
            quakeLayer.clearLayers();
            openQuakeId = null;

            quakes.forEach(function (q) {
                var marker = L.circleMarker([q.lat, q.lon], {
                    radius: q.radius,
                    fillColor: q.color,
                    color: '#000',
                    weight: 1,
                    opacity: 1,
                    fillOpacity: q.recent ? 0.9 : 0.7,
                    className: q.recent ? 'pulse-marker' : ''
                })
                    .bindTooltip(quakeTooltip(q), { direction: 'top' })
                    .bindPopup(quakePopup(q))
                    .on('popupopen', function () { openQuakeId = q.id; })
                    .on('popupclose', function () { if (openQuakeId === q.id) { openQuakeId = null; } })
                    .addTo(quakeLayer);
                if (q.id === reopen) { marker.openPopup(); }
            });
        }

        function hideMap() {
            if (quakeLayer) { quakeLayer.clearLayers(); }
            openQuakeId = null;
            document.getElementById('quake-map').hidden = true;
        }

        document.addEventListener('htmx:afterSwap', function (evt) {
            if (evt.detail.target.id !== 'map-status') { return; }
            var data = document.getElementById('quake-data');
            if (data) {
                renderQuakes(JSON.parse(data.textContent));
            } else {
                hideMap();
            }
        });

        // Keeps the slider, its label and the preset select showing the same value.
        function syncMagnitude(value) {
            var mag = Number(value);
            document.getElementById('magnitude-slider').value = mag;
            document.getElementById('magnitude-value').textContent = mag.toFixed(1);
            var preset = document.getElementById('magnitude-filter');
            var match = Array.prototype.find.call(preset.options, function (o) {
                return o.value !== '' && Number(o.value) === mag;
            });
            preset.value = match ? match.value : '';
        }

        function syncThemeToggle() {
            var dark = document.documentElement.classList.contains('dark-mode');
            var label = dark ? 'Switch to light mode' : 'Switch to dark mode';
            var button = document.getElementById('dark-mode-toggle');
            button.setAttribute('aria-label', label);
            button.title = label;
        }

        function toggleDarkMode() {
            var dark = !document.documentElement.classList.contains('dark-mode');
            document.documentElement.classList.toggle('dark-mode', dark);
            syncThemeToggle();
            fetch('/api/preferences/theme', {
                method: 'PUT',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ dark_mode: dark })
            });
        }

        syncThemeToggle();
    </script>
</body>
</html>
"##;
