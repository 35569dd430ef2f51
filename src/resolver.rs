//! Observation resolution: structured parameters in, normalized table out.
//!
//! Providers are tried in a fixed order (live ERDDAP fetch, bundled CSV,
//! terminal empty). A tier that errors or yields no rows after filtering
//! hands over to the next one; `resolve` itself never fails.

use crate::config::AppConfig;
use crate::error::{OceanError, Result};
use crate::interpreter::{PeriodUnit, QueryParameters};
use crate::regions::BoundingBox;
use async_trait::async_trait;
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Column aliases tolerated from upstream sources, mapped to canonical
/// names. An alias is applied only when the canonical column is absent.
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("longitude", "lon"),
    ("LONGITUDE", "lon"),
    ("latitude", "lat"),
    ("LATITUDE", "lat"),
    ("JULD", "time"),
    ("platform_number", "float_id"),
    ("PLATFORM_NUMBER", "float_id"),
    ("TEMP", "temperature"),
    ("temp", "temperature"),
    ("PSAL", "salinity"),
    ("psal", "salinity"),
    ("sal", "salinity"),
];

/// Time filter derived from the query parameters. The absolute year pair
/// wins over the relative window when both are present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeWindow {
    /// Keep rows with `time >= start`.
    Since { start: NaiveDateTime },
    /// Keep rows with `start <= time <= end`.
    Absolute {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl TimeWindow {
    pub fn start(&self) -> NaiveDateTime {
        match self {
            TimeWindow::Since { start } => *start,
            TimeWindow::Absolute { start, .. } => *start,
        }
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        match self {
            TimeWindow::Since { .. } => None,
            TimeWindow::Absolute { end, .. } => Some(*end),
        }
    }
}

/// Derive the effective time window, defaulting to the last 5 years when
/// the relative fields are unusable.
pub fn resolve_window(params: &QueryParameters, now: DateTime<Utc>) -> TimeWindow {
    if let (Some(start_year), Some(end_year)) = (params.start_year, params.end_year) {
        let start =
            NaiveDate::from_ymd_opt(start_year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
        let end =
            NaiveDate::from_ymd_opt(end_year, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 59));
        if let (Some(start), Some(end)) = (start, end) {
            return TimeWindow::Absolute { start, end };
        }
    }

    let months = match (params.period_num, params.period_unit) {
        (Some(num), Some(PeriodUnit::Months)) => num,
        (Some(num), _) => num.saturating_mul(12),
        _ => 60,
    };
    let start = now
        .checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .naive_utc();
    TimeWindow::Since { start }
}

/// Capability for one data source tier.
#[async_trait]
pub trait ObservationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, params: &QueryParameters, window: &TimeWindow) -> Result<DataFrame>;
}

pub struct DataResolver {
    providers: Vec<Box<dyn ObservationProvider>>,
}

impl DataResolver {
    pub fn new(providers: Vec<Box<dyn ObservationProvider>>) -> Self {
        Self { providers }
    }

    /// Standard tier order: live fetch (if enabled), bundled CSV, empty.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut providers: Vec<Box<dyn ObservationProvider>> = Vec::new();
        if config.live_fetch_enabled {
            providers.push(Box::new(ErddapProvider::from_config(config)));
        }
        providers.push(Box::new(DemoCsvProvider::new(config.demo_data_path.clone())));
        providers.push(Box::new(EmptyProvider));
        Self { providers }
    }

    /// Total: every tier failure degrades to the next tier, and the chain
    /// bottoms out at an empty table.
    pub async fn resolve(&self, params: &QueryParameters) -> DataFrame {
        self.resolve_at(params, Utc::now()).await
    }

    /// Same as [`resolve`](Self::resolve) with an injectable "now" so the
    /// relative window is deterministic under test.
    pub async fn resolve_at(&self, params: &QueryParameters, now: DateTime<Utc>) -> DataFrame {
        let window = resolve_window(params, now);
        for provider in &self.providers {
            match self.try_provider(provider.as_ref(), params, &window).await {
                Ok(df) if df.height() > 0 => {
                    debug!("{} yielded {} rows", provider.name(), df.height());
                    return df;
                }
                Ok(_) => {
                    debug!("{} yielded no rows, trying next tier", provider.name());
                }
                Err(e) => {
                    warn!("{} unavailable ({}), trying next tier", provider.name(), e);
                }
            }
        }
        DataFrame::empty()
    }

    async fn try_provider(
        &self,
        provider: &dyn ObservationProvider,
        params: &QueryParameters,
        window: &TimeWindow,
    ) -> Result<DataFrame> {
        let df = provider.fetch(params, window).await?;
        let df = normalize_observations(df)?;
        let df = filter_bbox(df, &params.bbox)?;
        filter_time(df, window)
    }
}

/// Rename tolerated column variants to canonical names and coerce the time
/// column to millisecond datetimes. Rows are not dropped here.
pub fn normalize_observations(mut df: DataFrame) -> Result<DataFrame> {
    if df.width() == 0 {
        return Ok(df);
    }

    for (alias, canonical) in COLUMN_ALIASES {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if names.iter().any(|n| n == alias) && !names.iter().any(|n| n == canonical) {
            df.rename(alias, canonical)
                .map_err(|e| OceanError::Data(format!("Failed to rename {}: {}", alias, e)))?;
        }
    }

    let has_time = df.get_column_names().iter().any(|n| *n == "time");
    if has_time {
        let coerced = coerce_time(
            df.column("time")
                .map_err(|e| OceanError::Polars(e.to_string()))?,
        )?;
        df.with_column(coerced)
            .map_err(|e| OceanError::Polars(e.to_string()))?;
    }

    Ok(df)
}

/// Coerce a time column of any supported dtype to Datetime(ms). String
/// entries that fail to parse become null.
fn coerce_time(series: &Series) -> Result<Series> {
    let target = DataType::Datetime(TimeUnit::Milliseconds, None);
    match series.dtype() {
        DataType::Datetime(_, _) | DataType::Date => series
            .cast(&target)
            .map_err(|e| OceanError::Data(format!("Failed to cast time column: {}", e))),
        DataType::String => {
            let ca = series
                .str()
                .map_err(|e| OceanError::Polars(e.to_string()))?;
            let millis: Vec<Option<i64>> = ca
                .into_iter()
                .map(|opt| opt.and_then(parse_timestamp_millis))
                .collect();
            Series::new("time", millis)
                .cast(&target)
                .map_err(|e| OceanError::Data(format!("Failed to build time column: {}", e)))
        }
        _ => series
            .cast(&DataType::Int64)
            .and_then(|s| s.cast(&target))
            .map_err(|e| OceanError::Data(format!("Unsupported time column: {}", e))),
    }
}

fn parse_timestamp_millis(raw: &str) -> Option<i64> {
    let text = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
    }
    None
}

/// Bounding-box filter, inclusive on all four bounds. Rows with null
/// coordinates cannot satisfy the bounds and fall out here, same as every
/// upstream source treats them.
pub fn filter_bbox(df: DataFrame, bbox: &BoundingBox) -> Result<DataFrame> {
    if df.height() == 0 {
        return Ok(df);
    }
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    if !names.iter().any(|n| n == "lon") || !names.iter().any(|n| n == "lat") {
        return Err(OceanError::Data(
            "Observation table has no lon/lat columns".to_string(),
        ));
    }

    df.lazy()
        .filter(
            col("lon")
                .gt_eq(lit(bbox.lon_min))
                .and(col("lon").lt_eq(lit(bbox.lon_max)))
                .and(col("lat").gt_eq(lit(bbox.lat_min)))
                .and(col("lat").lt_eq(lit(bbox.lat_max))),
        )
        .collect()
        .map_err(|e| OceanError::Polars(e.to_string()))
}

/// Time filter. A table without a time column passes through untouched;
/// rows with a null time are dropped once a window applies, since the
/// comparison cannot succeed for them.
pub fn filter_time(df: DataFrame, window: &TimeWindow) -> Result<DataFrame> {
    if df.height() == 0 {
        return Ok(df);
    }
    if !df.get_column_names().iter().any(|n| *n == "time") {
        return Ok(df);
    }

    let start_ms = window.start().and_utc().timestamp_millis();
    let mut predicate = col("time")
        .cast(DataType::Int64)
        .gt_eq(lit(start_ms));
    if let Some(end) = window.end() {
        let end_ms = end.and_utc().timestamp_millis();
        predicate = predicate.and(col("time").cast(DataType::Int64).lt_eq(lit(end_ms)));
    }

    df.lazy()
        .filter(predicate)
        .collect()
        .map_err(|e| OceanError::Polars(e.to_string()))
}

/// Live tier: ERDDAP tabledap fetch over the bbox, a fixed depth range,
/// and the absolute date range derived from the query window.
pub struct ErddapProvider {
    base_url: String,
    depth_min: f64,
    depth_max: f64,
    timeout: Duration,
}

impl ErddapProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            depth_min: 0.0,
            depth_max: 2000.0,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.erddap_base_url.clone(),
            depth_min: config.depth_min,
            depth_max: config.depth_max,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn request_url(&self, bbox: &BoundingBox, window: &TimeWindow, now: NaiveDateTime) -> String {
        // tabledap constraint syntax; ">" has to travel percent-encoded.
        let start = window.start().format("%Y-%m-%dT%H:%M:%SZ");
        let end = window.end().unwrap_or(now).format("%Y-%m-%dT%H:%M:%SZ");
        format!(
            "{}.json?platform_number,time,latitude,longitude,temp,psal\
             &longitude%3E={}&longitude%3C={}&latitude%3E={}&latitude%3C={}\
             &pres%3E={}&pres%3C={}&time%3E={}&time%3C={}",
            self.base_url,
            bbox.lon_min,
            bbox.lon_max,
            bbox.lat_min,
            bbox.lat_max,
            self.depth_min,
            self.depth_max,
            start,
            end
        )
    }
}

#[derive(Debug, Deserialize)]
struct ErddapResponse {
    table: ErddapTable,
}

#[derive(Debug, Deserialize)]
struct ErddapTable {
    #[serde(rename = "columnNames")]
    column_names: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

fn table_to_frame(table: ErddapTable) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(table.column_names.len());
    for (idx, name) in table.column_names.iter().enumerate() {
        let values: Vec<&serde_json::Value> = table
            .rows
            .iter()
            .map(|row| row.get(idx).unwrap_or(&serde_json::Value::Null))
            .collect();
        let numeric = values.iter().any(|v| v.is_number())
            && values.iter().all(|v| v.is_null() || v.is_number());
        let series = if numeric {
            let vals: Vec<Option<f64>> = values.iter().map(|v| v.as_f64()).collect();
            Series::new(name, vals)
        } else {
            let vals: Vec<Option<String>> = values
                .iter()
                .map(|v| match v {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect();
            Series::new(name, vals)
        };
        columns.push(series);
    }
    DataFrame::new(columns).map_err(|e| OceanError::Data(format!("Bad ERDDAP table: {}", e)))
}

#[async_trait]
impl ObservationProvider for ErddapProvider {
    fn name(&self) -> &'static str {
        "erddap"
    }

    async fn fetch(&self, params: &QueryParameters, window: &TimeWindow) -> Result<DataFrame> {
        let url = self.request_url(&params.bbox, window, Utc::now().naive_utc());
        debug!("Fetching live observations: {}", url);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| OceanError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| OceanError::Fetch(format!("ERDDAP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(OceanError::Fetch(format!(
                "ERDDAP returned HTTP {}",
                response.status()
            )));
        }

        let body: ErddapResponse = response
            .json()
            .await
            .map_err(|e| OceanError::Fetch(format!("Bad ERDDAP response: {}", e)))?;

        table_to_frame(body.table)
    }
}

/// Static tier: bundled reference CSV.
pub struct DemoCsvProvider {
    path: PathBuf,
}

impl DemoCsvProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ObservationProvider for DemoCsvProvider {
    fn name(&self) -> &'static str {
        "demo-csv"
    }

    async fn fetch(&self, _params: &QueryParameters, _window: &TimeWindow) -> Result<DataFrame> {
        if !self.path.exists() {
            return Err(OceanError::Data(format!(
                "Demo dataset not found: {}",
                self.path.display()
            )));
        }
        CsvReadOptions::default()
            .with_has_header(true)
            .with_parse_options(CsvParseOptions::default().with_try_parse_dates(true))
            .try_into_reader_with_file_path(Some(self.path.clone()))
            .map_err(|e| OceanError::Data(format!("Failed to open demo dataset: {}", e)))?
            .finish()
            .map_err(|e| OceanError::Data(format!("Failed to read demo dataset: {}", e)))
    }
}

/// Terminal tier; always succeeds with zero rows.
pub struct EmptyProvider;

#[async_trait]
impl ObservationProvider for EmptyProvider {
    fn name(&self) -> &'static str {
        "empty"
    }

    async fn fetch(&self, _params: &QueryParameters, _window: &TimeWindow) -> Result<DataFrame> {
        Ok(DataFrame::empty())
    }
}
