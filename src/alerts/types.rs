//! Alert record types shared by the decision engine and outcome tracker

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Composite-signal alert, top two category tiers only
    Bullish,
    /// A watched smart-money wallet traded the token
    SmartMoney,
    /// Token migrated off the bonding curve
    Migration,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::SmartMoney => write!(f, "smart_money"),
            Self::Migration => write!(f, "migration"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOutcome {
    Pending,
    Win,
    Loss,
}

/// One emitted alert. The baseline market cap is fixed for the life of the
/// record; milestones and outcome are judged against it. Once resolved the
/// outcome fields never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub mint: String,
    pub symbol: String,
    pub alert_type: AlertType,
    pub created_at: DateTime<Utc>,
    pub baseline_market_cap: f64,
    pub alert_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Highest baseline multiple observed so far
    pub highest_multiple: u32,
    /// Milestones already notified for this record
    pub milestones_hit: BTreeSet<u32>,
    pub outcome: AlertOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_gain_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn new(
        mint: String,
        symbol: String,
        alert_type: AlertType,
        baseline_market_cap: f64,
        alert_price: f64,
        score: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mint,
            symbol,
            alert_type,
            created_at,
            baseline_market_cap,
            alert_price,
            score,
            highest_multiple: 1,
            milestones_hit: BTreeSet::new(),
            outcome: AlertOutcome::Pending,
            outcome_gain_pct: None,
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome != AlertOutcome::Pending
    }

    /// Current multiple of the baseline, 0 when the baseline is degenerate
    pub fn multiple_of_baseline(&self, market_cap_sol: f64) -> f64 {
        if self.baseline_market_cap > 0.0 {
            market_cap_sol / self.baseline_market_cap
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AlertRecord {
        AlertRecord::new(
            "Mint111".to_string(),
            "TEST".to_string(),
            AlertType::Bullish,
            100.0,
            0.0001,
            Some(91.0),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_record_is_pending() {
        let r = record();
        assert_eq!(r.outcome, AlertOutcome::Pending);
        assert!(!r.is_resolved());
        assert!(r.milestones_hit.is_empty());
        assert_eq!(r.highest_multiple, 1);
    }

    #[test]
    fn test_multiple_of_baseline() {
        let r = record();
        assert!((r.multiple_of_baseline(500.0) - 5.0).abs() < f64::EPSILON);
        let mut degenerate = record();
        degenerate.baseline_market_cap = 0.0;
        assert_eq!(degenerate.multiple_of_baseline(500.0), 0.0);
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let mut r = record();
        r.milestones_hit.insert(2);
        r.milestones_hit.insert(5);
        let json = serde_json::to_string(&r).unwrap();
        let back: AlertRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, r.id);
        assert_eq!(back.milestones_hit.len(), 2);
        assert_eq!(back.alert_type, AlertType::Bullish);
    }
}
