//! Notification sink - the downstream delivery boundary
//!
//! Delivery failures are logged and never affect alerting state or dedup
//! bookkeeping. The webhook sink posts the structured payload as JSON; the
//! log sink is the default when no webhook is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alerts::types::AlertType;
use crate::config::NotifierConfig;
use crate::enrichment::RiskAnalysis;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Alert,
    Milestone,
    Outcome,
}

/// Structured payload handed to the sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub kind: NotificationKind,
    pub alert_type: AlertType,
    pub mint: String,
    pub symbol: String,
    pub title: String,
    pub body: String,
    pub market_cap_sol: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAnalysis>,
    pub link: String,
}

impl AlertNotification {
    pub fn link_for(mint: &str) -> String {
        format!("https://pump.fun/{}", mint)
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &AlertNotification) -> Result<()>;
}

/// Posts notifications to a configured webhook URL
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.webhook_url.clone(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, notification: &AlertNotification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Structured-log sink, the default without a webhook
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, notification: &AlertNotification) -> Result<()> {
        info!(
            kind = ?notification.kind,
            alert_type = %notification.alert_type,
            mint = %notification.mint,
            symbol = %notification.symbol,
            market_cap_sol = notification.market_cap_sol,
            "{}",
            notification.title
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_always_delivers() {
        let sink = LogSink;
        let notification = AlertNotification {
            kind: NotificationKind::Alert,
            alert_type: AlertType::Bullish,
            mint: "Mint111".to_string(),
            symbol: "TEST".to_string(),
            title: "Bullish signal: TEST".to_string(),
            body: "score 91".to_string(),
            market_cap_sol: 120.0,
            score: Some(91.0),
            multiple: None,
            risk: None,
            link: AlertNotification::link_for("Mint111"),
        };
        assert!(sink.send(&notification).await.is_ok());
    }

    #[test]
    fn test_payload_serializes_without_empty_optionals() {
        let notification = AlertNotification {
            kind: NotificationKind::Milestone,
            alert_type: AlertType::Bullish,
            mint: "Mint111".to_string(),
            symbol: "TEST".to_string(),
            title: "5x milestone".to_string(),
            body: String::new(),
            market_cap_sol: 500.0,
            score: None,
            multiple: Some(5),
            risk: None,
            link: AlertNotification::link_for("Mint111"),
        };
        let json = serde_json::to_string(&notification).unwrap();
        assert!(json.contains("\"multiple\":5"));
        assert!(!json.contains("\"score\""));
        assert!(json.contains("https://pump.fun/Mint111"));
    }
}
