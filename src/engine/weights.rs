//! Weight calculator - governance-weighted vote score per sender
//!
//! The raw weights come from an externally published snapshot that the bot
//! refreshes on a fixed interval and otherwise treats as a cache. Staleness
//! only affects weight precision, never ledger correctness, so reads while
//! stale are fine. The cache is an explicit object with a value and a
//! last-refreshed timestamp, driven by an injected time source to keep TTL
//! behavior deterministic under test.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One entry from the published governance-weight snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct WeightRecord {
    pub username: String,
    pub weight: u64,
}

/// Source of governance-weight snapshots
#[async_trait]
pub trait WeightProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<WeightRecord>, Box<dyn std::error::Error>>;
}

/// HTTP snapshot provider (the published users.json)
pub struct HttpWeightProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpWeightProvider {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl WeightProvider for HttpWeightProvider {
    async fn fetch(&self) -> Result<Vec<WeightRecord>, Box<dyn std::error::Error>> {
        let records = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<WeightRecord>>()
            .await?;
        Ok(records)
    }
}

/// TTL-cached snapshot of handle -> raw governance weight
pub struct WeightCache {
    weights: HashMap<String, u64>,
    last_refresh: Option<i64>,
    ttl_secs: i64,
    max_weight: u64,
    now_fn: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl WeightCache {
    pub fn new(max_weight: u64, ttl_secs: i64) -> Self {
        Self::new_with_timestamp_fn(
            max_weight,
            ttl_secs,
            Arc::new(|| chrono::Utc::now().timestamp()),
        )
    }

    pub fn new_with_timestamp_fn(
        max_weight: u64,
        ttl_secs: i64,
        now_fn: Arc<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            weights: HashMap::new(),
            last_refresh: None,
            ttl_secs,
            max_weight,
            now_fn,
        }
    }

    /// True when the snapshot has never been installed or has outlived its TTL
    pub fn is_stale(&self) -> bool {
        match self.last_refresh {
            None => true,
            Some(at) => (self.now_fn)() - at >= self.ttl_secs,
        }
    }

    /// Install a fresh snapshot and stamp the refresh time
    pub fn install(&mut self, records: Vec<WeightRecord>) {
        self.weights = records
            .into_iter()
            .map(|r| (r.username.to_lowercase(), r.weight))
            .collect();
        self.last_refresh = Some((self.now_fn)());
        log::info!("📊 Installed weight snapshot ({} users)", self.weights.len());
    }

    /// Normalized weight for a sender and tip amount
    ///
    /// `min(raw / max_weight, 1.0)` rounded to 4 decimal places. Zero when
    /// the sender is absent from the snapshot or the amount truncates below
    /// one whole unit. Informational only; never blocks persistence.
    pub fn weight_for(&self, handle: &str, amount: f64) -> f64 {
        if amount.trunc() < 1.0 {
            return 0.0;
        }
        match self.weights.get(&handle.to_lowercase()) {
            None => 0.0,
            Some(raw) => {
                let normalized = (*raw as f64 / self.max_weight as f64).min(1.0);
                (normalized * 10_000.0).round() / 10_000.0
            }
        }
    }
}
