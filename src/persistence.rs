//! Best-effort snapshot persistence for warm restarts
//!
//! Serializes token summaries, the alert record table, and global stats to
//! a single JSON file. Written atomically (temp file then rename) so a
//! crash mid-write never corrupts the previous snapshot. Load failures are
//! logged and treated as a cold start.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alerts::AlertRecord;
use crate::error::Result;
use crate::outcome::GlobalStats;
use crate::tracker::TokenState;

/// Dedup-relevant subset of a token's state. Histories are rebuilt from
/// the live feed after restart; only alerting state must survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSummary {
    pub mint: String,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub market_cap_sol: f64,
    pub has_alerted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_alert_price: Option<f64>,
    pub rugged: bool,
}

impl From<&TokenState> for TokenSummary {
    fn from(state: &TokenState) -> Self {
        Self {
            mint: state.mint.clone(),
            symbol: state.symbol.clone(),
            created_at: state.created_at,
            market_cap_sol: state.market_cap_sol,
            has_alerted: state.has_alerted,
            baseline_market_cap: state.baseline_market_cap,
            last_alert_price: state.last_alert_price,
            rugged: state.rugged,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    pub tokens: Vec<TokenSummary>,
    pub alerts: Vec<AlertRecord>,
    pub stats: GlobalStats,
}

/// Write a snapshot atomically
pub async fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    info!(
        path = %path.display(),
        tokens = snapshot.tokens.len(),
        alerts = snapshot.alerts.len(),
        "Snapshot saved"
    );
    Ok(())
}

/// Load the snapshot, if one exists and parses. Any failure is a cold start.
pub async fn load(path: &Path) -> Option<Snapshot> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Snapshot unreadable, cold start");
            return None;
        }
    };
    match serde_json::from_slice::<Snapshot>(&bytes) {
        Ok(snapshot) => {
            info!(
                path = %path.display(),
                saved_at = %snapshot.saved_at,
                tokens = snapshot.tokens.len(),
                "Snapshot loaded"
            );
            Some(snapshot)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Snapshot corrupt, cold start");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertType;

    fn snapshot() -> Snapshot {
        Snapshot {
            saved_at: Utc::now(),
            tokens: vec![TokenSummary {
                mint: "Mint111".to_string(),
                symbol: "TEST".to_string(),
                created_at: Utc::now(),
                market_cap_sol: 120.0,
                has_alerted: true,
                baseline_market_cap: Some(100.0),
                last_alert_price: Some(0.0001),
                rugged: false,
            }],
            alerts: vec![AlertRecord::new(
                "Mint111".to_string(),
                "TEST".to_string(),
                AlertType::Bullish,
                100.0,
                0.0001,
                Some(91.0),
                Utc::now(),
            )],
            stats: GlobalStats::default(),
        }
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let original = snapshot();
        save(&path, &original).await.unwrap();

        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded.tokens.len(), 1);
        assert_eq!(loaded.tokens[0].mint, "Mint111");
        assert!(loaded.tokens[0].has_alerted);
        assert_eq!(loaded.alerts[0].id, original.alerts[0].id);
    }

    #[tokio::test]
    async fn test_missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(load(&path).await.is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        save(&path, &snapshot()).await.unwrap();
        let mut second = snapshot();
        second.tokens.clear();
        save(&path, &second).await.unwrap();

        let loaded = load(&path).await.unwrap();
        assert!(loaded.tokens.is_empty());
        // No stray temp file left behind
        assert!(!path.with_extension("tmp").exists());
    }
}
