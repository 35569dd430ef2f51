//! LLM-backed query parser. Optional and unreliable by design: any HTTP,
//! schema, or JSON problem turns into "no usable answer" and the
//! interpreter falls back to heuristics.

use crate::config::AppConfig;
use crate::error::{OceanError, Result};
use crate::interpreter::{ParsedQuery, QueryParser};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

lazy_static! {
    // LLMs wrap JSON in prose more often than not; grab the first object.
    static ref JSON_BLOCK: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(20),
        }
    }

    /// Build a client from config. None when no API key is configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        config.openai_api_key.as_ref().map(|key| {
            let mut client = Self::new(key.clone());
            client.timeout = Duration::from_secs(config.request_timeout_secs);
            client
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| OceanError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "You are a precise JSON-only responder. Always return valid JSON, no other text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
            "max_tokens": 300
        });

        let response = client
            .post(&format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OceanError::Llm(format!("LLM API call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OceanError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| OceanError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }

    fn build_prompt(query: &str) -> String {
        format!(
            r#"Parse this ocean measurement query into a JSON object with keys:
- variables: list like ["temperature"] or ["temperature","salinity"] (allowed: temperature, salinity, current)
- region: free text region name
- query_type: "trend" | "map" | "summary" | "comparison"
- period_num, period_unit: optional relative window (unit "years" or "months")
- start_year, end_year: optional absolute year window

Query: "{}"

Only return the JSON, no other text."#,
            query
        )
    }
}

#[async_trait]
impl QueryParser for LlmClient {
    async fn parse(&self, query: &str) -> Result<Option<ParsedQuery>> {
        let raw = self.call_llm(&Self::build_prompt(query)).await?;

        let Some(block) = JSON_BLOCK.find(&raw) else {
            warn!("LLM reply contained no JSON object");
            return Ok(None);
        };

        match serde_json::from_str::<ParsedQuery>(block.as_str()) {
            Ok(parsed) => {
                debug!("LLM parsed query: {:?}", parsed);
                Ok(Some(parsed))
            }
            Err(e) => {
                warn!("LLM reply was not valid schema JSON: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_block_extraction_survives_prose() {
        let raw = "Sure! Here is the JSON:\n{\"variables\": [\"salinity\"],\n\"query_type\": \"trend\"}\nHope that helps.";
        let block = JSON_BLOCK.find(raw).unwrap();
        let parsed: ParsedQuery = serde_json::from_str(block.as_str()).unwrap();
        assert_eq!(parsed.variables, Some(vec!["salinity".to_string()]));
        assert_eq!(parsed.query_type, Some("trend".to_string()));
    }
}
