use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tokio::{sync::RwLock, time::Duration};

use keystore_core::{serde, tokio};
use keystore_store::HealthReport;

/// Methods some route answers to, anything else is counted as `OTHER` so
/// clients cannot mint new series
const KNOWN_METHODS: [&str; 3] = ["DELETE", "GET", "POST"];

fn method_label(method: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .find(|known| **known == method)
        .copied()
        .unwrap_or("OTHER")
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
struct RequestKey {
    method: &'static str,
    endpoint: String,
    status: u16,
}

#[derive(Clone, Copy, Debug, Default)]
struct RequestStats {
    count: u64,
    total_seconds: f64,
}

/// Request counters keyed by method, matched route and status
#[derive(Clone, Debug, Default)]
pub struct RequestMetrics {
    requests: Arc<RwLock<HashMap<RequestKey, RequestStats>>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(crate = "keystore_core::serde")]
pub struct RequestSample {
    pub method: String,
    pub endpoint: String,
    pub status: u16,
    pub count: u64,
    pub total_seconds: f64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(crate = "keystore_core::serde")]
pub struct MetricsResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub health: HealthReport,
    pub requests: Vec<RequestSample>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        RequestMetrics::default()
    }

    pub async fn record(&self, method: &str, endpoint: &str, status: u16, elapsed: Duration) {
        let key = RequestKey {
            method: method_label(method),
            endpoint: endpoint.to_string(),
            status,
        };
        let mut requests = self.requests.write().await;
        let stats = requests.entry(key).or_default();
        stats.count += 1;
        stats.total_seconds += elapsed.as_secs_f64();
    }

    pub async fn snapshot(&self) -> Vec<RequestSample> {
        let requests = self.requests.read().await;
        let mut keys = requests.keys().collect::<Vec<_>>();
        keys.sort();
        keys.into_iter()
            .map(|k| {
                let stats = requests[k];
                RequestSample {
                    method: k.method.to_string(),
                    endpoint: k.endpoint.clone(),
                    status: k.status,
                    count: stats.count,
                    total_seconds: stats.total_seconds,
                }
            })
            .collect()
    }
}
