//! Provider seam plus the per-provider throttle and quota breaker

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::TagResult;
use super::models::ProviderKind;

/// An external image classification service
#[async_trait]
pub trait TagProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Minimum spacing between two outbound calls
    fn min_interval(&self) -> Duration;

    /// Classify a reduced image; returns the raw provider response
    async fn classify(&self, image: &[u8]) -> TagResult<Value>;

    /// Tag names above the confidence threshold
    fn extract_tags(&self, response: &Value) -> Vec<String>;
}

/// Collect `name` of every entry of `entries` whose `score_field` exceeds `min_confidence`
pub fn confident_names(entries: Option<&Value>, score_field: &str, min_confidence: f64) -> Vec<String> {
    entries
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|entry| {
            entry
                .get(score_field)
                .and_then(Value::as_f64)
                .map(|score| score > min_confidence)
                .unwrap_or(false)
        })
        .filter_map(|entry| entry.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Sleep-based spacing of outbound calls
pub struct Throttle {
    min_interval: Duration,
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: tokio::sync::Mutex::new(None),
        }
    }

    /// Wait until `min_interval` has passed since the previous call, then claim the slot.
    ///
    /// Returns the time spent sleeping.
    pub async fn wait(&self) -> Duration {
        let mut last_call = self.last_call.lock().await;
        let slept = match *last_call {
            Some(previous) => {
                let elapsed = previous.elapsed();
                if elapsed < self.min_interval {
                    let delay = self.min_interval - elapsed;
                    tokio::time::sleep(delay).await;
                    delay
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        };
        *last_call = Some(Instant::now());
        slept
    }
}

/// State of a provider's quota breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls are allowed
    Closed,
    /// Quota exhausted; no calls for the rest of the process
    Open,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
        }
    }
}

#[derive(Debug, Clone)]
struct BreakerData {
    state: BreakerState,
    opened_at: Option<DateTime<Utc>>,
    status: Option<u16>,
    rejected: u64,
}

/// Sticky breaker: once tripped it never closes again
pub struct QuotaBreaker {
    kind: ProviderKind,
    data: RwLock<BreakerData>,
}

impl QuotaBreaker {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            data: RwLock::new(BreakerData {
                state: BreakerState::Closed,
                opened_at: None,
                status: None,
                rejected: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.data.read().state
    }

    /// Check whether a call may go out, counting the rejection when it may not
    pub fn allows_requests(&self) -> bool {
        if self.data.read().state == BreakerState::Closed {
            return true;
        }
        let mut data = self.data.write();
        data.rejected += 1;
        debug!(provider = %self.kind, rejected = data.rejected, "Quota breaker open, skipping call");
        false
    }

    /// Open the breaker after a quota response. Returns true on the first trip.
    pub fn trip(&self, status: u16) -> bool {
        let mut data = self.data.write();
        if data.state == BreakerState::Open {
            return false;
        }
        data.state = BreakerState::Open;
        data.opened_at = Some(Utc::now());
        data.status = Some(status);
        warn!(provider = %self.kind, status, "Provider quota exceeded, no more requests this run");
        true
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.data.read().opened_at
    }

    /// Calls skipped since the breaker opened
    pub fn rejected(&self) -> u64 {
        self.data.read().rejected
    }
}
