use chrono::{TimeZone, Utc};
use ocean_insights::engine::InsightEngine;
use ocean_insights::interpreter::{heuristic_parse, QueryInterpreter};
use ocean_insights::query_log::QueryLog;
use ocean_insights::resolver::{DataResolver, DemoCsvProvider, EmptyProvider, ObservationProvider};
use ocean_insights::response::NO_DATA_MESSAGE;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

const SAMPLE_CSV: &str = "\
float_id,time,lon,lat,temperature,salinity
2902746,2024-03-15 10:30:00,61.2,14.5,27.0,35.9
2902746,2024-09-02 04:12:00,62.0,15.1,29.0,36.1
2902747,2025-01-20 18:45:00,64.8,18.3,,36.4
2902750,2025-11-05 12:00:00,75.3,12.8,28.4,34.9
2902750,2026-03-10 06:30:00,76.1,13.5,28.9,35.0
1901852,2024-06-11 09:00:00,120.5,-5.2,31.0,34.0
";

fn write_sample_csv(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "ocean-insights-test-{}-{}.csv",
        name,
        std::process::id()
    ));
    fs::write(&path, SAMPLE_CSV).unwrap();
    path
}

fn offline_resolver(csv: PathBuf) -> DataResolver {
    DataResolver::new(vec![
        Box::new(DemoCsvProvider::new(csv)),
        Box::new(EmptyProvider),
    ])
}

fn offline_engine(csv: PathBuf, log: Arc<QueryLog>) -> InsightEngine {
    InsightEngine::new(QueryInterpreter::offline(), offline_resolver(csv), Some(log))
}

#[tokio::test]
async fn summary_mean_matches_hand_computed_mean() {
    let csv = write_sample_csv("mean");
    let log = Arc::new(QueryLog::open_in_memory().unwrap());
    let engine = offline_engine(csv, log);

    // Absolute window keeps the test independent of the current date.
    // Arabian sea rows: 27.0, 29.0 and one null; mean of (27 + 29) / 2.
    let answer = engine
        .answer("average temperature in arabian sea 2020 to 2030")
        .await
        .unwrap();

    assert_eq!(
        answer.response.summary,
        "Average temperature: 28.00 (from 2 data points)."
    );
    assert_eq!(answer.rows, 3);
    assert!(answer.response.plot_html.is_empty());
    assert!(answer.response.map_html.is_empty());
}

#[tokio::test]
async fn comparison_query_builds_comparison_chart() {
    let csv = write_sample_csv("comparison");
    let log = Arc::new(QueryLog::open_in_memory().unwrap());
    let engine = offline_engine(csv, log);

    let answer = engine
        .answer("compare temperature and salinity in arabian sea 2020 to 2030")
        .await
        .unwrap();

    assert_eq!(answer.response.summary, "Comparison of temperature, salinity.");
    assert!(answer.response.plot_html.contains("Plotly.newPlot"));
    assert!(answer.response.map_html.is_empty());
}

#[tokio::test]
async fn map_query_builds_map_only() {
    let csv = write_sample_csv("map");
    let log = Arc::new(QueryLog::open_in_memory().unwrap());
    let engine = offline_engine(csv, log);

    let answer = engine
        .answer("map of float locations near india 2020 to 2030")
        .await
        .unwrap();

    assert_eq!(answer.response.summary, "Showing float locations on the map.");
    assert!(answer.response.plot_html.is_empty());
    assert!(answer.response.map_html.contains("L.geoJSON"));
    // Only the two near-india floats are plotted.
    assert!(answer.response.map_html.contains("2902750"));
    assert!(!answer.response.map_html.contains("1901852"));
}

#[tokio::test]
async fn unreachable_sources_degrade_to_no_data() {
    let log = Arc::new(QueryLog::open_in_memory().unwrap());
    let engine = offline_engine(PathBuf::from("/nonexistent/argo.csv"), Arc::clone(&log));

    let answer = engine.answer("salinity trend in pacific").await.unwrap();

    assert_eq!(answer.rows, 0);
    assert_eq!(answer.response.summary, NO_DATA_MESSAGE);
    assert!(answer.response.plot_html.is_empty());
    assert!(answer.response.map_html.is_empty());

    // The request is still logged.
    let entries = log.recent(10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].query, "salinity trend in pacific");
    assert_eq!(entries[0].response, NO_DATA_MESSAGE);
}

#[tokio::test]
async fn every_answer_is_logged() {
    let csv = write_sample_csv("log");
    let log = Arc::new(QueryLog::open_in_memory().unwrap());
    let engine = offline_engine(csv, Arc::clone(&log));

    engine
        .answer("average temperature in arabian sea 2020 to 2030")
        .await
        .unwrap();
    engine.answer("map near india 2020 to 2030").await.unwrap();

    let entries = log.recent(10).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| !e.response.is_empty()));
}

#[tokio::test]
async fn resolution_is_deterministic_on_the_static_tier() {
    let csv = write_sample_csv("idempotent");
    let resolver = offline_resolver(csv);
    let params = heuristic_parse("salinity near india 2020 to 2030");
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();

    let first = resolver.resolve_at(&params, now).await;
    let second = resolver.resolve_at(&params, now).await;

    assert!(first.height() > 0);
    assert!(first.equals_missing(&second));
}

#[tokio::test]
async fn provider_fetch_keeps_all_rows_until_filtering() {
    let csv = write_sample_csv("raw");
    let provider = DemoCsvProvider::new(csv);
    let params = heuristic_parse("temperature in arabian sea");
    let window = ocean_insights::resolver::resolve_window(&params, Utc::now());

    let df = provider.fetch(&params, &window).await.unwrap();
    assert_eq!(df.height(), 6);
}
