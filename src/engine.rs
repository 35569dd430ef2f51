//! End-to-end wiring: free text in, summary + fragments out, one log row
//! per request. Interpretation and resolution are total; the log append is
//! the only step that can surface an error.

use crate::config::AppConfig;
use crate::error::Result;
use crate::interpreter::{NullParser, QueryInterpreter, QueryParameters, QueryParser};
use crate::llm::LlmClient;
use crate::query_log::QueryLog;
use crate::resolver::DataResolver;
use crate::response::{build_response, InsightResponse};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct InsightAnswer {
    pub params: QueryParameters,
    pub rows: usize,
    #[serde(flatten)]
    pub response: InsightResponse,
}

pub struct InsightEngine {
    interpreter: QueryInterpreter,
    resolver: DataResolver,
    log: Option<Arc<QueryLog>>,
}

impl InsightEngine {
    pub fn new(
        interpreter: QueryInterpreter,
        resolver: DataResolver,
        log: Option<Arc<QueryLog>>,
    ) -> Self {
        Self {
            interpreter,
            resolver,
            log,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let parser: Arc<dyn QueryParser> = match LlmClient::from_config(config) {
            Some(client) => Arc::new(client),
            None => Arc::new(NullParser),
        };
        let log = QueryLog::open(&config.log_db_path)?;
        Ok(Self {
            interpreter: QueryInterpreter::new(parser),
            resolver: DataResolver::from_config(config),
            log: Some(Arc::new(log)),
        })
    }

    pub fn query_log(&self) -> Option<Arc<QueryLog>> {
        self.log.clone()
    }

    pub async fn answer(&self, query: &str) -> Result<InsightAnswer> {
        // Step 1: interpret the question
        let params = self.interpreter.interpret(query).await;
        info!(
            "Interpreted query: type={:?} region={} variables={:?}",
            params.query_type, params.region, params.variables
        );

        // Step 2: resolve observations
        let df = self.resolver.resolve(&params).await;
        info!("Resolved {} observation rows", df.height());

        // Step 3: build the response
        let response = build_response(&df, &params);

        // Step 4: log the request
        if let Some(log) = &self.log {
            log.append(query, &response.summary)?;
        }

        Ok(InsightAnswer {
            params,
            rows: df.height(),
            response,
        })
    }
}
