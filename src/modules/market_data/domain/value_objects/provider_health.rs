use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::provider_kind::ProviderKind;

/// Provider health status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health metrics for a provider, for external consumption.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthMetrics {
    pub provider: ProviderKind,
    pub status: HealthStatus,
    pub success_count: u32,
    pub failure_count: u32,
    pub consecutive_failures: u32,
    /// Seconds since the last probe, if any.
    pub probed_secs_ago: Option<u64>,
}

/// Internal per-provider health tracking (runtime only).
///
/// Status moves on two axes: probe results flip between Healthy and
/// Unhealthy, and observed call outcomes degrade a provider that keeps
/// failing mid-run. Neither Unhealthy nor Degraded is terminal.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub provider: ProviderKind,
    pub status: HealthStatus,
    pub success_count: u32,
    pub failure_count: u32,
    pub consecutive_failures: u32,
    pub last_probed: Option<Instant>,
}

impl ProviderHealth {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            // Optimistic until a probe or call outcome says otherwise.
            status: HealthStatus::Healthy,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            last_probed: None,
        }
    }

    /// Record the outcome of a health probe.
    pub fn record_probe(&mut self, ok: bool) {
        self.last_probed = Some(Instant::now());
        if ok {
            self.status = HealthStatus::Healthy;
            self.consecutive_failures = 0;
        } else {
            self.status = HealthStatus::Unhealthy;
        }
    }

    /// Record a successful call against this provider.
    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.status = HealthStatus::Healthy;
    }

    /// Record a failed call against this provider.
    pub fn record_failure(&mut self, degraded_after: u32, unhealthy_after: u32) {
        self.failure_count += 1;
        self.consecutive_failures += 1;

        if self.consecutive_failures >= unhealthy_after {
            self.status = HealthStatus::Unhealthy;
        } else if self.consecutive_failures >= degraded_after {
            self.status = HealthStatus::Degraded;
        }
    }

    /// True once the last probe is older than the staleness window.
    /// A provider that has never been probed is not stale; it is trusted
    /// optimistically until something fails.
    pub fn probe_stale(&self, staleness_window: std::time::Duration) -> bool {
        match self.last_probed {
            Some(at) => at.elapsed() > staleness_window,
            None => false,
        }
    }

    pub fn to_metrics(&self) -> ProviderHealthMetrics {
        ProviderHealthMetrics {
            provider: self.provider,
            status: self.status,
            success_count: self.success_count,
            failure_count: self.failure_count,
            consecutive_failures: self.consecutive_failures,
            probed_secs_ago: self.last_probed.map(|at| at.elapsed().as_secs()),
        }
    }
}
