//! Response building: normalized table + parameters in, summary text and
//! rendering fragments out.

use crate::interpreter::{QueryParameters, QueryType, Variable};
use crate::render;
use itertools::Itertools;
use polars::prelude::*;
use serde::Serialize;

pub const NO_DATA_MESSAGE: &str = "No data found for the requested region/time.";

#[derive(Debug, Clone, Serialize)]
pub struct InsightResponse {
    pub summary: String,
    pub plot_html: String,
    pub map_html: String,
}

impl InsightResponse {
    fn text_only(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            plot_html: String::new(),
            map_html: String::new(),
        }
    }
}

/// Branch on query type, in fixed priority order. An empty table
/// short-circuits to the no-data message whatever the type.
pub fn build_response(df: &DataFrame, params: &QueryParameters) -> InsightResponse {
    if df.height() == 0 {
        return InsightResponse::text_only(NO_DATA_MESSAGE);
    }

    match params.query_type {
        QueryType::Comparison if params.variables.len() >= 2 => {
            let names = params
                .variables
                .iter()
                .map(|v| v.column_name())
                .join(", ");
            InsightResponse {
                summary: format!("Comparison of {}.", names),
                plot_html: render::make_comparison_plot(df, &params.variables),
                map_html: String::new(),
            }
        }
        QueryType::Map => InsightResponse {
            summary: "Showing float locations on the map.".to_string(),
            plot_html: String::new(),
            map_html: render::make_map(df),
        },
        QueryType::Summary => {
            let summary = params
                .variables
                .first()
                .map(|v| mean_summary(df, *v))
                .unwrap_or_else(|| NO_DATA_MESSAGE.to_string());
            InsightResponse::text_only(summary)
        }
        // Trend, or a comparison that arrived with a single variable.
        _ => match params.variables.first() {
            Some(variable) => InsightResponse {
                summary: mean_summary(df, *variable),
                plot_html: render::make_plot(df, variable.column_name()),
                map_html: render::make_map(df),
            },
            None => InsightResponse::text_only(NO_DATA_MESSAGE),
        },
    }
}

/// Mean of the first requested variable over its non-null rows. An absent
/// column keeps the generic no-data message.
fn mean_summary(df: &DataFrame, variable: Variable) -> String {
    let Ok(series) = df.column(variable.column_name()) else {
        return NO_DATA_MESSAGE.to_string();
    };
    let used = series.len() - series.null_count();
    match series.mean() {
        Some(mean) if used > 0 => format!(
            "Average {}: {:.2} (from {} data points).",
            variable.column_name(),
            mean,
            used
        ),
        _ => NO_DATA_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::heuristic_parse;
    use crate::resolver::normalize_observations;

    fn frame() -> DataFrame {
        let df = df!(
            "float_id" => &["2902746", "2902747", "2902748"],
            "lon" => &[60.0, 61.0, 62.0],
            "lat" => &[10.0, 11.0, 12.0],
            "time" => &["2024-05-01", "2024-05-02", "2024-05-03"],
            "temperature" => &[Some(10.0), Some(20.0), None],
            "salinity" => &[35.1, 35.3, 35.5]
        )
        .unwrap();
        normalize_observations(df).unwrap()
    }

    #[test]
    fn empty_table_short_circuits() {
        let params = heuristic_parse("show temperature on a map");
        let response = build_response(&DataFrame::empty(), &params);
        assert_eq!(response.summary, NO_DATA_MESSAGE);
        assert!(response.plot_html.is_empty());
        assert!(response.map_html.is_empty());
    }

    #[test]
    fn summary_reports_mean_over_non_null_rows() {
        let params = heuristic_parse("average temperature in arabian sea");
        let response = build_response(&frame(), &params);
        assert_eq!(
            response.summary,
            "Average temperature: 15.00 (from 2 data points)."
        );
        assert!(response.plot_html.is_empty());
        assert!(response.map_html.is_empty());
    }

    #[test]
    fn missing_variable_keeps_no_data_text() {
        let params = heuristic_parse("average current speed");
        let response = build_response(&frame(), &params);
        assert_eq!(response.summary, NO_DATA_MESSAGE);
    }

    #[test]
    fn comparison_names_both_variables() {
        let params = heuristic_parse("compare temperature and salinity");
        let response = build_response(&frame(), &params);
        assert_eq!(response.summary, "Comparison of temperature, salinity.");
        assert!(response.plot_html.contains("Plotly.newPlot"));
        assert!(response.map_html.is_empty());
    }

    #[test]
    fn map_query_builds_map_only() {
        let params = heuristic_parse("float locations in indian ocean");
        let response = build_response(&frame(), &params);
        assert_eq!(response.summary, "Showing float locations on the map.");
        assert!(response.plot_html.is_empty());
        assert!(response.map_html.contains("L.geoJSON"));
    }

    #[test]
    fn trend_builds_plot_and_map() {
        let params = heuristic_parse("temperature trend near india");
        let response = build_response(&frame(), &params);
        assert!(response.summary.starts_with("Average temperature:"));
        assert!(response.plot_html.contains("Plotly.newPlot"));
        assert!(response.map_html.contains("L.geoJSON"));
    }
}
