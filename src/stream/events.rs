//! Wire format and typed domain events for the PumpPortal feed
//!
//! Raw frames are loosely-typed JSON distinguished by their `txType` field.
//! A frame that fails to classify is dropped by the caller with a debug log;
//! a single bad frame never stops the stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription request sent to the feed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMessage {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl SubscriptionMessage {
    /// Subscribe to new token creation events
    pub fn subscribe_new_tokens() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
            keys: None,
        }
    }

    /// Subscribe to bonding-curve migration events
    pub fn subscribe_migrations() -> Self {
        Self {
            method: "subscribeMigration".to_string(),
            keys: None,
        }
    }

    /// Subscribe to trades on specific tokens
    pub fn subscribe_token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "subscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    /// Unsubscribe from token trades
    pub fn unsubscribe_token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "unsubscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    /// Subscribe to trades by specific accounts (counterparty watch list)
    pub fn subscribe_account_trades(wallets: Vec<String>) -> Self {
        Self {
            method: "subscribeAccountTrade".to_string(),
            keys: Some(wallets),
        }
    }
}

/// Raw token-creation frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenCreated {
    pub signature: String,
    pub mint: String,
    pub trader_public_key: String,
    pub tx_type: String,
    #[serde(default)]
    pub initial_buy: f64,
    #[serde(default)]
    pub v_tokens_in_bonding_curve: f64,
    #[serde(default)]
    pub v_sol_in_bonding_curve: f64,
    #[serde(default)]
    pub market_cap_sol: f64,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub uri: String,
}

/// Raw trade frame (buy or sell)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrade {
    pub signature: String,
    pub mint: String,
    pub trader_public_key: String,
    pub tx_type: String,
    pub token_amount: f64,
    pub sol_amount: f64,
    #[serde(default)]
    pub v_tokens_in_bonding_curve: f64,
    #[serde(default)]
    pub v_sol_in_bonding_curve: f64,
    #[serde(default)]
    pub market_cap_sol: f64,
}

/// Raw migration frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMigration {
    pub signature: String,
    pub mint: String,
    pub tx_type: String,
    #[serde(default)]
    pub pool: Option<String>,
}

/// Typed token-creation event
#[derive(Debug, Clone)]
pub struct TokenCreated {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub creator: String,
    pub market_cap_sol: f64,
    pub v_sol_reserve: f64,
    pub v_token_reserve: f64,
    pub timestamp: DateTime<Utc>,
}

/// Typed trade event. Trades from watched counterparty accounts arrive on
/// the same wire shape; the engine classifies them by trader address.
#[derive(Debug, Clone)]
pub struct TradeExecuted {
    pub mint: String,
    pub trader: String,
    pub is_buy: bool,
    pub token_amount: f64,
    pub sol_amount: f64,
    pub market_cap_sol: f64,
    pub v_sol_reserve: f64,
    pub v_token_reserve: f64,
    pub timestamp: DateTime<Utc>,
}

/// Typed migration event
#[derive(Debug, Clone)]
pub struct TokenMigrated {
    pub mint: String,
    pub pool: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Event from the stream connection manager
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// New token created
    TokenCreated(TokenCreated),
    /// Trade occurred (buy or sell)
    Trade(TradeExecuted),
    /// Token migrated off the bonding curve
    Migration(TokenMigrated),
    /// Session reached OPEN and subscriptions were replayed
    Connected,
    /// Session lost; a reconnect is scheduled
    Disconnected,
}

/// Classify a raw text frame into a typed event.
///
/// Returns `None` for frames that are not domain events (subscription acks,
/// unknown shapes, missing fields).
pub fn parse_message(text: &str) -> Option<StreamEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let tx_type = value.get("txType")?.as_str()?;

    match tx_type {
        "create" => {
            let raw: RawTokenCreated = serde_json::from_value(value).ok()?;
            Some(StreamEvent::TokenCreated(raw.into()))
        }
        "buy" | "sell" => {
            let raw: RawTrade = serde_json::from_value(value).ok()?;
            Some(StreamEvent::Trade(raw.into()))
        }
        "migrate" | "migration" => {
            let raw: RawMigration = serde_json::from_value(value).ok()?;
            Some(StreamEvent::Migration(raw.into()))
        }
        _ => None,
    }
}

impl From<RawTokenCreated> for TokenCreated {
    fn from(raw: RawTokenCreated) -> Self {
        Self {
            mint: raw.mint,
            name: raw.name,
            symbol: raw.symbol,
            creator: raw.trader_public_key,
            market_cap_sol: raw.market_cap_sol,
            v_sol_reserve: raw.v_sol_in_bonding_curve,
            v_token_reserve: raw.v_tokens_in_bonding_curve,
            timestamp: Utc::now(),
        }
    }
}

impl From<RawTrade> for TradeExecuted {
    fn from(raw: RawTrade) -> Self {
        Self {
            is_buy: raw.tx_type == "buy",
            mint: raw.mint,
            trader: raw.trader_public_key,
            token_amount: raw.token_amount,
            sol_amount: raw.sol_amount,
            market_cap_sol: raw.market_cap_sol,
            v_sol_reserve: raw.v_sol_in_bonding_curve,
            v_token_reserve: raw.v_tokens_in_bonding_curve,
            timestamp: Utc::now(),
        }
    }
}

impl From<RawMigration> for TokenMigrated {
    fn from(raw: RawMigration) -> Self {
        Self {
            mint: raw.mint,
            pool: raw.pool,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_message_new_tokens() {
        let msg = SubscriptionMessage::subscribe_new_tokens();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("subscribeNewToken"));
        assert!(!json.contains("keys"));
    }

    #[test]
    fn test_subscription_message_token_trades() {
        let msg = SubscriptionMessage::subscribe_token_trades(vec![
            "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK".to_string(),
        ]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("subscribeTokenTrade"));
        assert!(json.contains("DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK"));
    }

    #[test]
    fn test_parse_create_frame() {
        let json = r#"{
            "signature": "sig",
            "mint": "MintAddr111",
            "traderPublicKey": "CreatorAddr",
            "txType": "create",
            "initialBuy": 1000000.0,
            "vTokensInBondingCurve": 1000000000.0,
            "vSolInBondingCurve": 30.0,
            "marketCapSol": 30.5,
            "name": "Test Token",
            "symbol": "TEST",
            "uri": "https://example.com"
        }"#;

        match parse_message(json) {
            Some(StreamEvent::TokenCreated(e)) => {
                assert_eq!(e.mint, "MintAddr111");
                assert_eq!(e.symbol, "TEST");
                assert_eq!(e.creator, "CreatorAddr");
                assert!((e.market_cap_sol - 30.5).abs() < f64::EPSILON);
            }
            other => panic!("expected TokenCreated, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_trade_frame() {
        let json = r#"{
            "signature": "sig",
            "mint": "MintAddr111",
            "traderPublicKey": "TraderAddr",
            "txType": "sell",
            "tokenAmount": 5000.0,
            "solAmount": 0.25,
            "marketCapSol": 45.0
        }"#;

        match parse_message(json) {
            Some(StreamEvent::Trade(t)) => {
                assert!(!t.is_buy);
                assert_eq!(t.trader, "TraderAddr");
                assert!((t.sol_amount - 0.25).abs() < f64::EPSILON);
            }
            other => panic!("expected Trade, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_migration_frame() {
        let json = r#"{"signature":"sig","mint":"MintAddr111","txType":"migrate","pool":"raydium"}"#;
        match parse_message(json) {
            Some(StreamEvent::Migration(m)) => {
                assert_eq!(m.mint, "MintAddr111");
                assert_eq!(m.pool.as_deref(), Some("raydium"));
            }
            other => panic!("expected Migration, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_frame_is_dropped() {
        assert!(parse_message(r#"{"message":"Successfully subscribed"}"#).is_none());
        assert!(parse_message("not json at all").is_none());
        // Missing required field: classified but fails to deserialize
        assert!(parse_message(r#"{"txType":"buy","mint":"m"}"#).is_none());
    }
}
