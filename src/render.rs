//! Rendering collaborators: opaque HTML fragments for line charts,
//! comparison charts, and interactive maps. The core treats these as black
//! boxes; they never fail, they just degrade to placeholder markup.
//!
//! Charts assume Plotly and maps assume Leaflet are loaded by the
//! surrounding page (see [`standalone_page`]).

use crate::interpreter::Variable;
use chrono::{TimeZone, Utc};
use polars::prelude::*;
use serde_json::json;
use uuid::Uuid;

const EMPTY_TIMESERIES: &str = "<div><em>No timeseries data available for plotting.</em></div>";
const EMPTY_VALID: &str = "<div><em>No valid data to plot.</em></div>";
const EMPTY_COMPARISON: &str = "<div><em>No data available for comparison plot.</em></div>";
const EMPTY_VARIABLES: &str = "<div><em>Requested variables not found in dataset.</em></div>";
const EMPTY_MAP: &str = "<div><em>No float location data available for map.</em></div>";

/// Line+marker time-series chart for one variable.
pub fn make_plot(df: &DataFrame, variable: &str) -> String {
    if df.height() == 0 {
        return EMPTY_TIMESERIES.to_string();
    }
    let (times, values) = match (millis_values(df, "time"), f64_values(df, variable)) {
        (Some(t), Some(v)) => (t, v),
        _ => return EMPTY_TIMESERIES.to_string(),
    };

    let points = paired_points(&times, &values);
    if points.is_empty() {
        return EMPTY_VALID.to_string();
    }

    let x: Vec<String> = points.iter().map(|(t, _)| format_time(*t)).collect();
    let y: Vec<f64> = points.iter().map(|(_, v)| *v).collect();

    let data = json!([{
        "x": x,
        "y": y,
        "type": "scatter",
        "mode": "lines+markers",
        "name": capitalize(variable),
        "line": {"width": 2, "color": "blue"},
        "marker": {"size": 6, "color": "red"}
    }]);
    let layout = json!({
        "title": format!("{} trend", capitalize(variable)),
        "height": 360,
        "margin": {"l": 10, "r": 10, "t": 40, "b": 10},
        "xaxis": {"title": "Time"},
        "yaxis": {"title": capitalize(variable)},
        "template": "plotly_white"
    });
    plotly_fragment(&data, &layout)
}

/// Multi-trace chart comparing variables over time, one styled trace per
/// variable that actually exists in the table.
pub fn make_comparison_plot(df: &DataFrame, variables: &[Variable]) -> String {
    if df.height() == 0 {
        return EMPTY_COMPARISON.to_string();
    }
    let Some(times) = millis_values(df, "time") else {
        return "<div><em>No time column found for plotting.</em></div>".to_string();
    };

    let mut traces = Vec::new();
    for variable in variables {
        let Some(values) = f64_values(df, variable.column_name()) else {
            continue;
        };
        let points = paired_points(&times, &values);
        if points.is_empty() {
            continue;
        }
        let (color, dash, symbol) = trace_style(variable);
        let x: Vec<String> = points.iter().map(|(t, _)| format_time(*t)).collect();
        let y: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        traces.push(json!({
            "x": x,
            "y": y,
            "type": "scatter",
            "mode": "lines+markers",
            "name": capitalize(variable.column_name()),
            "line": {"width": 2, "dash": dash, "color": color},
            "marker": {"size": 7, "symbol": symbol, "color": color}
        }));
    }

    if traces.is_empty() {
        return EMPTY_VARIABLES.to_string();
    }

    let layout = json!({
        "title": "Comparison of variables over time",
        "height": 450,
        "margin": {"l": 10, "r": 10, "t": 40, "b": 10},
        "xaxis": {"title": "Time"},
        "yaxis": {"title": "Value"},
        "template": "plotly_white",
        "legend": {"orientation": "h", "y": 1.1, "x": 0.5, "xanchor": "center"}
    });
    plotly_fragment(&serde_json::Value::Array(traces), &layout)
}

const MAP_TEMPLATE: &str = r#"<div id="__MAP_ID__" style="height:420px;"></div>
<script>
  (function(){
    var geo = __GEOJSON__;
    var map = L.map('__MAP_ID__').setView([__CENTER_LAT__, __CENTER_LON__], 3);
    L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
        maxZoom: 18,
        attribution: '&copy; OpenStreetMap contributors'
    }).addTo(map);

    function onEachFeature(feature, layer) {
        var props = feature.properties || {};
        var html = "";
        if (props.float_id) html += "<b>Float:</b> " + props.float_id + "<br/>";
        if (props.time) html += "<b>Time:</b> " + props.time + "<br/>";
        if (props.temperature) html += "<b>Temp:</b> " + props.temperature + " &deg;C<br/>";
        if (props.salinity) html += "<b>Salinity:</b> " + props.salinity + " PSU<br/>";
        layer.bindPopup(html);
    }

    L.geoJSON(geo, {
        onEachFeature: onEachFeature,
        pointToLayer: function(feature, latlng) {
            return L.circleMarker(latlng, {radius: 6});
        }
    }).addTo(map);
  })();
</script>"#;

/// Leaflet map of float positions. Rows without parseable geometry are
/// dropped here, not earlier.
pub fn make_map(df: &DataFrame) -> String {
    if df.height() == 0 {
        return EMPTY_MAP.to_string();
    }
    let (lons, lats) = match (f64_values(df, "lon"), f64_values(df, "lat")) {
        (Some(lons), Some(lats)) => (lons, lats),
        _ => return EMPTY_MAP.to_string(),
    };

    let float_ids = string_values(df, "float_id");
    let times = string_values(df, "time");
    let temperatures = f64_values(df, "temperature");
    let salinities = f64_values(df, "salinity");

    let mut features = Vec::new();
    for i in 0..df.height() {
        let (Some(lon), Some(lat)) = (lons[i], lats[i]) else {
            continue;
        };
        let mut props = serde_json::Map::new();
        if let Some(id) = float_ids.as_ref().and_then(|v| v[i].clone()) {
            props.insert("float_id".to_string(), json!(id));
        }
        if let Some(time) = times.as_ref().and_then(|v| v[i].clone()) {
            props.insert("time".to_string(), json!(time));
        }
        if let Some(temp) = temperatures.as_ref().and_then(|v| v[i]) {
            props.insert("temperature".to_string(), json!(temp));
        }
        if let Some(sal) = salinities.as_ref().and_then(|v| v[i]) {
            props.insert("salinity".to_string(), json!(sal));
        }
        features.push(json!({
            "type": "Feature",
            "properties": props,
            "geometry": {"type": "Point", "coordinates": [lon, lat]}
        }));
    }

    if features.is_empty() {
        return EMPTY_MAP.to_string();
    }

    let center_lat = features
        .iter()
        .filter_map(|f| f["geometry"]["coordinates"][1].as_f64())
        .sum::<f64>()
        / features.len() as f64;
    let center_lon = features
        .iter()
        .filter_map(|f| f["geometry"]["coordinates"][0].as_f64())
        .sum::<f64>()
        / features.len() as f64;

    let geojson = json!({"type": "FeatureCollection", "features": features});
    MAP_TEMPLATE
        .replace("__MAP_ID__", &format!("map-{}", Uuid::new_v4()))
        .replace("__GEOJSON__", &geojson.to_string())
        .replace("__CENTER_LAT__", &format!("{:.4}", center_lat))
        .replace("__CENTER_LON__", &format!("{:.4}", center_lon))
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8"/>
  <title>__TITLE__</title>
  <script src="https://cdn.plot.ly/plotly-2.32.0.min.js"></script>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css"/>
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
  <style>body { font-family: sans-serif; margin: 2em; } .summary { margin-bottom: 1.5em; }</style>
</head>
<body>
  <h2>__TITLE__</h2>
  <p class="summary">__SUMMARY__</p>
  __PLOT__
  __MAP__
</body>
</html>"#;

/// Wrap fragments into a self-contained page with the chart/map libraries
/// loaded from their CDNs.
pub fn standalone_page(title: &str, summary: &str, plot_html: &str, map_html: &str) -> String {
    PAGE_TEMPLATE
        .replace("__TITLE__", title)
        .replace("__SUMMARY__", summary)
        .replace("__PLOT__", plot_html)
        .replace("__MAP__", map_html)
}

fn plotly_fragment(data: &serde_json::Value, layout: &serde_json::Value) -> String {
    let div_id = format!("plot-{}", Uuid::new_v4());
    format!(
        "<div id=\"{id}\" class=\"insight-plot\"></div>\n<script>\n  Plotly.newPlot(\"{id}\", {data}, {layout}, {{\"displayModeBar\": false}});\n</script>",
        id = div_id,
        data = data,
        layout = layout
    )
}

/// Zip time/value columns into non-null pairs sorted by time.
fn paired_points(times: &[Option<i64>], values: &[Option<f64>]) -> Vec<(i64, f64)> {
    let mut points: Vec<(i64, f64)> = times
        .iter()
        .zip(values.iter())
        .filter_map(|(t, v)| Some(((*t)?, (*v)?)))
        .collect();
    points.sort_by_key(|(t, _)| *t);
    points
}

fn format_time(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn trace_style(variable: &Variable) -> (&'static str, &'static str, &'static str) {
    match variable {
        Variable::Temperature => ("blue", "solid", "circle"),
        Variable::Salinity => ("green", "dash", "square"),
        Variable::Current => ("orange", "dot", "triangle-up"),
    }
}

fn f64_values(df: &DataFrame, name: &str) -> Option<Vec<Option<f64>>> {
    let series = df.column(name).ok()?.cast(&DataType::Float64).ok()?;
    let ca = series.f64().ok()?;
    Some(ca.into_iter().collect())
}

fn millis_values(df: &DataFrame, name: &str) -> Option<Vec<Option<i64>>> {
    let series = df.column(name).ok()?.cast(&DataType::Int64).ok()?;
    let ca = series.i64().ok()?;
    Some(ca.into_iter().collect())
}

fn string_values(df: &DataFrame, name: &str) -> Option<Vec<Option<String>>> {
    let series = df.column(name).ok()?.cast(&DataType::String).ok()?;
    let ca = series.str().ok()?;
    Some(ca.into_iter().map(|opt| opt.map(|s| s.to_string())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::normalize_observations;

    fn frame() -> DataFrame {
        let df = df!(
            "float_id" => &["2902746", "2902747"],
            "lon" => &[Some(75.0), None],
            "lat" => &[Some(15.0), Some(16.0)],
            "time" => &["2024-05-02", "2024-05-01"],
            "temperature" => &[28.1, 27.4],
            "salinity" => &[35.2, 35.0]
        )
        .unwrap();
        normalize_observations(df).unwrap()
    }

    #[test]
    fn plot_sorts_by_time() {
        let html = make_plot(&frame(), "temperature");
        assert!(html.contains("Plotly.newPlot"));
        let first = html.find("2024-05-01").unwrap();
        let second = html.find("2024-05-02").unwrap();
        assert!(first < second);
    }

    #[test]
    fn plot_on_missing_variable_degrades() {
        assert_eq!(make_plot(&frame(), "current"), EMPTY_TIMESERIES);
        assert_eq!(make_plot(&DataFrame::empty(), "temperature"), EMPTY_TIMESERIES);
    }

    #[test]
    fn comparison_plot_emits_one_trace_per_known_variable() {
        let html = make_comparison_plot(
            &frame(),
            &[Variable::Temperature, Variable::Salinity, Variable::Current],
        );
        assert!(html.contains("Temperature"));
        assert!(html.contains("Salinity"));
        assert!(!html.contains("triangle-up"));
    }

    #[test]
    fn map_drops_rows_without_geometry() {
        let html = make_map(&frame());
        // Only the row with both lon and lat becomes a feature.
        assert!(html.contains("2902746"));
        assert!(!html.contains("2902747"));
    }

    #[test]
    fn map_with_no_geometry_degrades() {
        let df = df!("temperature" => &[1.0]).unwrap();
        assert_eq!(make_map(&df), EMPTY_MAP);
    }
}
