//! Risk-analysis enrichment collaborator
//!
//! Consumed strictly under a bounded timeout by the alert engine; a failure
//! or timeout degrades to [`RiskAnalysis::unknown`] and never blocks or
//! suppresses an alert.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EnrichmentConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

/// Enrichment payload attached to an alert notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub creator_rug_count: u32,
    #[serde(default)]
    pub top_holder_pct: f64,
    #[serde(default)]
    pub summary: String,
}

impl RiskAnalysis {
    /// Neutral fallback used when enrichment fails or times out
    pub fn unknown() -> Self {
        Self {
            risk_level: RiskLevel::Unknown,
            creator_rug_count: 0,
            top_holder_pct: 0.0,
            summary: String::new(),
        }
    }
}

#[async_trait]
pub trait RiskAnalyzer: Send + Sync {
    async fn fetch_risk_analysis(&self, mint: &str) -> Result<RiskAnalysis>;
}

/// HTTP-backed analyzer
pub struct HttpRiskAnalyzer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRiskAnalyzer {
    pub fn new(config: &EnrichmentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: if config.api_key.is_empty() {
                None
            } else {
                Some(config.api_key.clone())
            },
        }
    }
}

#[async_trait]
impl RiskAnalyzer for HttpRiskAnalyzer {
    async fn fetch_risk_analysis(&self, mint: &str) -> Result<RiskAnalysis> {
        let url = format!("{}/risk/{}", self.base_url, mint);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Enrichment(format!(
                "risk api returned {}",
                response.status()
            )));
        }
        Ok(response.json::<RiskAnalysis>().await?)
    }
}

/// Analyzer used when enrichment is disabled
pub struct NoopRiskAnalyzer;

#[async_trait]
impl RiskAnalyzer for NoopRiskAnalyzer {
    async fn fetch_risk_analysis(&self, _mint: &str) -> Result<RiskAnalysis> {
        Ok(RiskAnalysis::unknown())
    }
}
