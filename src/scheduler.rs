//! Recheck scheduler
//!
//! One abstraction for "check this alert again later" instead of ad hoc
//! per-alert timers. Ticks are delivered over a channel to the event loop;
//! a tick whose alert record or token no longer exists is a no-op at the
//! consumer, so nothing is cancelled on eviction.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A due recheck for one alert
#[derive(Debug, Clone)]
pub struct RecheckTick {
    pub alert_id: Uuid,
    pub mint: String,
    pub offset_mins: u64,
}

/// Cheap to clone; every alert shares the same tick channel
#[derive(Clone)]
pub struct RecheckScheduler {
    tx: mpsc::Sender<RecheckTick>,
}

impl RecheckScheduler {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RecheckTick>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Schedule one tick per offset. Each tick fires independently; a full
    /// or closed channel drops the tick (the opportunistic per-trade path
    /// covers the same checks).
    pub fn schedule(&self, alert_id: Uuid, mint: &str, offsets_mins: &[u64]) {
        for &offset in offsets_mins {
            let tx = self.tx.clone();
            let mint = mint.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(offset * 60)).await;
                let tick = RecheckTick {
                    alert_id,
                    mint,
                    offset_mins: offset,
                };
                if tx.send(tick).await.is_err() {
                    debug!(%alert_id, offset_mins = offset, "Recheck tick dropped, receiver gone");
                }
            });
        }
    }
}
