//! Query interpretation: free text in, structured [`QueryParameters`] out.
//!
//! Two strategies sit behind [`QueryInterpreter`]:
//! 1. an optional structured parser (an LLM, see `llm.rs`) whose output,
//!    when present and well-formed, takes precedence;
//! 2. a deterministic heuristic parser that is always available.
//!
//! `interpret` is total: whatever the parser does, the caller gets back a
//! usable parameter set.

use crate::error::Result;
use crate::regions::{default_bbox, detect_region, region_bbox, BoundingBox, DEFAULT_REGION};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

lazy_static! {
    static ref RELATIVE_WINDOW: Regex =
        Regex::new(r"last (\d+) (year|years|month|months)").unwrap();
    static ref ABSOLUTE_WINDOW: Regex =
        Regex::new(r"(\d{4})\s*(?:to|[-\u{2013}])\s*(\d{4})").unwrap();
}

/// Measured quantities a query can ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variable {
    Temperature,
    Salinity,
    Current,
}

impl Variable {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "temperature" => Some(Variable::Temperature),
            "salinity" => Some(Variable::Salinity),
            "current" => Some(Variable::Current),
            _ => None,
        }
    }

    /// Canonical column name in the observation table.
    pub fn column_name(&self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::Salinity => "salinity",
            Variable::Current => "current",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Trend,
    Map,
    Summary,
    Comparison,
}

impl QueryType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "trend" => Some(QueryType::Trend),
            "map" => Some(QueryType::Map),
            "summary" => Some(QueryType::Summary),
            "comparison" => Some(QueryType::Comparison),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Years,
    Months,
}

impl PeriodUnit {
    pub fn from_name(name: &str) -> Option<Self> {
        let unit = name.trim().to_lowercase();
        if unit.starts_with("year") {
            Some(PeriodUnit::Years)
        } else if unit.starts_with("month") {
            Some(PeriodUnit::Months)
        } else {
            None
        }
    }
}

/// Fully resolved query parameters. Built once per request; the region to
/// bbox resolution happens here and never again downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryParameters {
    pub variables: Vec<Variable>,
    pub region: String,
    pub bbox: BoundingBox,
    pub query_type: QueryType,
    pub period_num: Option<u32>,
    pub period_unit: Option<PeriodUnit>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

/// Loose schema a structured parser replies with. Everything is optional;
/// [`ParsedQuery::into_params`] decides whether the reply is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedQuery {
    #[serde(default)]
    pub variables: Option<Vec<String>>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub query_type: Option<String>,
    #[serde(default)]
    pub period_num: Option<u32>,
    #[serde(default)]
    pub period_unit: Option<String>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
}

impl ParsedQuery {
    /// Convert to resolved parameters. Returns None when the reply does not
    /// match the schema: no recognizable variables, or no recognizable
    /// query type. Unknown regions fall back to the default bbox but keep
    /// the name the parser gave us.
    pub fn into_params(self) -> Option<QueryParameters> {
        let variables: Vec<Variable> = self
            .variables?
            .iter()
            .filter_map(|name| Variable::from_name(name))
            .collect();
        if variables.is_empty() {
            return None;
        }

        let query_type = QueryType::from_name(self.query_type.as_deref()?)?;

        let region = self
            .region
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let bbox = region_bbox(&region).unwrap_or_else(default_bbox);

        let period_unit = self.period_unit.as_deref().and_then(PeriodUnit::from_name);

        Some(QueryParameters {
            variables,
            region,
            bbox,
            query_type,
            period_num: self.period_num,
            period_unit,
            start_year: self.start_year,
            end_year: self.end_year,
        })
    }
}

/// Capability for turning free text into a [`ParsedQuery`]. Implementations
/// may be unavailable or unreliable; `Ok(None)` means "no usable answer".
#[async_trait]
pub trait QueryParser: Send + Sync {
    async fn parse(&self, query: &str) -> Result<Option<ParsedQuery>>;
}

/// No-op parser. The interpreter is fully functional with this.
pub struct NullParser;

#[async_trait]
impl QueryParser for NullParser {
    async fn parse(&self, _query: &str) -> Result<Option<ParsedQuery>> {
        Ok(None)
    }
}

pub struct QueryInterpreter {
    parser: Arc<dyn QueryParser>,
}

impl QueryInterpreter {
    pub fn new(parser: Arc<dyn QueryParser>) -> Self {
        Self { parser }
    }

    /// Interpreter without a structured parser; heuristics only.
    pub fn offline() -> Self {
        Self::new(Arc::new(NullParser))
    }

    /// Total: parser failures and malformed replies degrade to heuristics.
    pub async fn interpret(&self, query: &str) -> QueryParameters {
        match self.parser.parse(query).await {
            Ok(Some(parsed)) => {
                if let Some(params) = parsed.into_params() {
                    debug!("Structured parser handled query: {:?}", params.query_type);
                    return params;
                }
                warn!("Structured parser reply did not match schema, using heuristics");
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Structured parser unavailable: {}", e);
            }
        }
        heuristic_parse(query)
    }
}

/// Deterministic heuristic parser. Each detection step is a pure function
/// of the lowercased query; steps run in fixed order.
pub fn heuristic_parse(query: &str) -> QueryParameters {
    let ql = query.to_lowercase();

    // Variable detection. "current" beats "salin", comparison beats both.
    let mut variables = vec![Variable::Temperature];
    let mut query_type = QueryType::Trend;
    if ql.contains("salin") {
        variables = vec![Variable::Salinity];
    }
    if ql.contains("current") {
        variables = vec![Variable::Current];
    }
    if ql.contains("compare") || (ql.contains("temperature") && ql.contains("salinity")) {
        variables = vec![Variable::Temperature, Variable::Salinity];
        query_type = QueryType::Comparison;
    }

    let region = detect_region(&ql).unwrap_or(DEFAULT_REGION).to_string();
    let bbox = region_bbox(&region).unwrap_or_else(default_bbox);

    // Query-type keywords override whatever variable detection picked.
    if ql.contains("map") || ql.contains("location") {
        query_type = QueryType::Map;
    } else if ql.contains("summary") || ql.contains("average") {
        query_type = QueryType::Summary;
    }

    // Relative window, defaulting to the last 5 years.
    let mut period_num = Some(5);
    let mut period_unit = Some(PeriodUnit::Years);
    if let Some(caps) = RELATIVE_WINDOW.captures(&ql) {
        if let Ok(num) = caps[1].parse::<u32>() {
            period_num = Some(num);
            if let Some(unit) = PeriodUnit::from_name(&caps[2]) {
                period_unit = Some(unit);
            }
        }
    }

    // Absolute window like "2010 to 2020". Set independently of the
    // relative window; the resolver gives the absolute pair precedence.
    let mut start_year = None;
    let mut end_year = None;
    if let Some(caps) = ABSOLUTE_WINDOW.captures(&ql) {
        start_year = caps[1].parse::<i32>().ok();
        end_year = caps[2].parse::<i32>().ok();
    }

    QueryParameters {
        variables,
        region,
        bbox,
        query_type,
        period_num,
        period_unit,
        start_year,
        end_year,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salinity_trend_near_india() {
        let params = heuristic_parse("show me salinity trend near india last 2 years");
        assert_eq!(params.variables, vec![Variable::Salinity]);
        assert_eq!(params.region, "near india");
        assert_eq!(params.query_type, QueryType::Trend);
        assert_eq!(params.period_num, Some(2));
        assert_eq!(params.period_unit, Some(PeriodUnit::Years));
    }

    #[test]
    fn comparison_in_arabian_sea() {
        let params = heuristic_parse("compare temperature and salinity in arabian sea");
        assert_eq!(
            params.variables,
            vec![Variable::Temperature, Variable::Salinity]
        );
        assert_eq!(params.region, "arabian sea");
        assert_eq!(params.query_type, QueryType::Comparison);
    }

    #[test]
    fn average_defaults_to_summary() {
        let params = heuristic_parse("average temperature in pacific");
        assert_eq!(params.variables, vec![Variable::Temperature]);
        assert_eq!(params.region, "pacific");
        assert_eq!(params.query_type, QueryType::Summary);
    }

    #[test]
    fn map_keyword_overrides_comparison() {
        let params = heuristic_parse("compare temperature and salinity on a map");
        assert_eq!(params.query_type, QueryType::Map);
        assert_eq!(params.variables.len(), 2);
    }

    #[test]
    fn both_windows_are_captured() {
        let params = heuristic_parse("salinity last 3 months 2010 to 2020");
        assert_eq!(params.period_num, Some(3));
        assert_eq!(params.period_unit, Some(PeriodUnit::Months));
        assert_eq!(params.start_year, Some(2010));
        assert_eq!(params.end_year, Some(2020));
    }

    #[test]
    fn absolute_window_with_dash() {
        let params = heuristic_parse("temperature 2015-2018 in indian ocean");
        assert_eq!(params.start_year, Some(2015));
        assert_eq!(params.end_year, Some(2018));
        assert_eq!(params.region, "indian ocean");
    }

    #[test]
    fn arbitrary_text_gets_defaults() {
        let params = heuristic_parse("what is the meaning of life?");
        assert_eq!(params.variables, vec![Variable::Temperature]);
        assert_eq!(params.region, "pacific");
        assert_eq!(params.query_type, QueryType::Trend);
        assert_eq!(params.period_num, Some(5));
    }

    #[test]
    fn malformed_structured_reply_is_rejected() {
        let reply = ParsedQuery {
            variables: Some(vec!["vorticity".to_string()]),
            query_type: Some("trend".to_string()),
            ..Default::default()
        };
        assert!(reply.into_params().is_none());

        let reply = ParsedQuery {
            variables: Some(vec!["salinity".to_string()]),
            query_type: None,
            ..Default::default()
        };
        assert!(reply.into_params().is_none());
    }

    #[test]
    fn structured_reply_keeps_unknown_region_name() {
        let reply = ParsedQuery {
            variables: Some(vec!["temperature".to_string()]),
            region: Some("Bay of Bengal".to_string()),
            query_type: Some("summary".to_string()),
            ..Default::default()
        };
        let params = reply.into_params().unwrap();
        assert_eq!(params.region, "bay of bengal");
        assert_eq!(params.bbox, crate::regions::default_bbox());
    }

    #[tokio::test]
    async fn interpret_is_total_with_null_parser() {
        let interpreter = QueryInterpreter::offline();
        let params = interpreter.interpret("").await;
        assert!(!params.variables.is_empty());
    }
}
