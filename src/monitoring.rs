//! Monitoring - bounded metric and alert history
//!
//! The runner records a metric per sync/epoch figure and raises alerts for
//! failures. Error and critical alerts are forwarded to a webhook when one
//! is configured.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn, Span};

use crate::config::MonitoringConfig;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }

    fn forwarded(&self) -> bool {
        matches!(self, AlertLevel::Error | AlertLevel::Critical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    pub name: String,
    pub value: f64,
    pub timestamp_ms: i64,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp_ms: i64,
    pub context: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub total_metrics: usize,
    pub metrics_last_24h: usize,
    pub total_alerts: usize,
    pub alerts_last_24h: usize,
    pub alerts_by_level: BTreeMap<AlertLevel, usize>,
}

/// Shared handle; clones see the same history
#[derive(Clone)]
pub struct Monitor {
    metrics: Arc<RwLock<VecDeque<MetricEvent>>>,
    alerts: Arc<RwLock<VecDeque<AlertEvent>>>,
    max_metrics: usize,
    max_alerts: usize,
    webhook_url: Option<String>,
    http: reqwest::Client,
    span: Span,
}

impl Monitor {
    pub fn new(config: &MonitoringConfig, span: Span) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            metrics: Arc::new(RwLock::new(VecDeque::with_capacity(config.max_metrics))),
            alerts: Arc::new(RwLock::new(VecDeque::with_capacity(config.max_alerts))),
            max_metrics: config.max_metrics.max(1),
            max_alerts: config.max_alerts.max(1),
            webhook_url: config.webhook_url.clone().filter(|url| !url.is_empty()),
            http,
            span,
        }
    }

    pub async fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let event = MetricEvent {
            name: name.to_string(),
            value,
            timestamp_ms: now_ms(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };

        let mut metrics = self.metrics.write().await;
        metrics.push_back(event);
        while metrics.len() > self.max_metrics {
            metrics.pop_front();
        }
        debug!(parent: &self.span, metric = name, value, "Metric recorded");
    }

    /// Log the alert at its level and keep it; error and critical alerts
    /// also go to the webhook. Webhook failures are only logged.
    pub async fn alert(&self, level: AlertLevel, message: &str, context: Value) {
        let event = AlertEvent {
            level,
            message: message.to_string(),
            timestamp_ms: now_ms(),
            context,
        };

        match level {
            AlertLevel::Critical | AlertLevel::Error => {
                error!(parent: &self.span, alert_level = level.as_str(), context = %event.context, "{}", message)
            }
            AlertLevel::Warning => warn!(parent: &self.span, context = %event.context, "{}", message),
            AlertLevel::Info => info!(parent: &self.span, context = %event.context, "{}", message),
        }

        {
            let mut alerts = self.alerts.write().await;
            alerts.push_back(event.clone());
            while alerts.len() > self.max_alerts {
                alerts.pop_front();
            }
        }

        if level.forwarded() {
            self.send_webhook(&event).await;
        }
    }

    async fn send_webhook(&self, alert: &AlertEvent) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let body = json!({
            "text": format!("{}: {}", alert.level.as_str().to_uppercase(), alert.message),
            "timestamp": alert.timestamp_ms,
            "context": alert.context,
        });

        match self.http.post(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                error!(parent: &self.span, status = %response.status(), "Webhook alert rejected")
            }
            Err(e) => error!(parent: &self.span, error = %e, "Failed to send webhook alert"),
        }
    }

    pub async fn metrics(&self, name: Option<&str>, since_ms: Option<i64>) -> Vec<MetricEvent> {
        self.metrics
            .read()
            .await
            .iter()
            .filter(|m| name.map_or(true, |n| m.name == n))
            .filter(|m| since_ms.map_or(true, |since| m.timestamp_ms >= since))
            .cloned()
            .collect()
    }

    pub async fn alerts(&self, level: Option<AlertLevel>, since_ms: Option<i64>) -> Vec<AlertEvent> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| level.map_or(true, |l| a.level == l))
            .filter(|a| since_ms.map_or(true, |since| a.timestamp_ms >= since))
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> MonitorStats {
        let cutoff = now_ms() - DAY_MS;
        let metrics = self.metrics.read().await;
        let alerts = self.alerts.read().await;

        let mut alerts_by_level: BTreeMap<AlertLevel, usize> = [
            AlertLevel::Info,
            AlertLevel::Warning,
            AlertLevel::Error,
            AlertLevel::Critical,
        ]
        .into_iter()
        .map(|level| (level, 0))
        .collect();
        for alert in alerts.iter() {
            *alerts_by_level.entry(alert.level).or_default() += 1;
        }

        MonitorStats {
            total_metrics: metrics.len(),
            metrics_last_24h: metrics.iter().filter(|m| m.timestamp_ms >= cutoff).count(),
            total_alerts: alerts.len(),
            alerts_last_24h: alerts.iter().filter(|a| a.timestamp_ms >= cutoff).count(),
            alerts_by_level,
        }
    }

    pub async fn reset(&self) {
        self.metrics.write().await.clear();
        self.alerts.write().await.clear();
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
