//! Trailing-window call accounting per provider.
//!
//! Each `(provider, window)` pair owns an append-only queue of call
//! timestamps; stale records are pruned lazily whenever the queue is read.
//! DashMap entry locking serializes access per key, so independent providers
//! never contend. A race at a window boundary may over-admit by at most one
//! call, which is accepted slack on every budget we track.

use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::modules::market_data::domain::{ProviderKind, WindowKind};

#[derive(Debug, Default)]
pub struct RateLimitTracker {
    records: DashMap<(ProviderKind, WindowKind), VecDeque<Instant>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff another call fits inside the trailing `period` budget.
    /// A `limit` of zero always denies.
    pub fn can_call(
        &self,
        provider: ProviderKind,
        window: WindowKind,
        limit: u32,
        period: Duration,
    ) -> bool {
        if limit == 0 {
            return false;
        }

        let mut entry = self.records.entry((provider, window)).or_default();
        Self::prune(&mut entry, period);
        (entry.len() as u32) < limit
    }

    /// Record an attempted call. Records are appended in issuance order so
    /// age-based pruning stays correct.
    pub fn record_call(&self, provider: ProviderKind, window: WindowKind) {
        self.records
            .entry((provider, window))
            .or_default()
            .push_back(Instant::now());
    }

    /// Current in-window call counts per provider and window, for
    /// observability.
    pub fn usage(&self) -> HashMap<ProviderKind, HashMap<WindowKind, usize>> {
        let mut stats: HashMap<ProviderKind, HashMap<WindowKind, usize>> = HashMap::new();
        for mut entry in self.records.iter_mut() {
            let (provider, window) = *entry.key();
            Self::prune(entry.value_mut(), window.period());
            stats
                .entry(provider)
                .or_default()
                .insert(window, entry.value().len());
        }
        stats
    }

    /// Time until the oldest record leaves the window, freeing one slot.
    /// `None` when the window is already empty.
    pub fn time_until_reset(
        &self,
        provider: ProviderKind,
        window: WindowKind,
        period: Duration,
    ) -> Option<Duration> {
        let mut entry = self.records.get_mut(&(provider, window))?;
        Self::prune(&mut entry, period);
        let oldest = entry.front()?;
        Some(period.saturating_sub(oldest.elapsed()))
    }

    fn prune(queue: &mut VecDeque<Instant>, period: Duration) {
        while queue
            .front()
            .is_some_and(|oldest| oldest.elapsed() >= period)
        {
            queue.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, Duration};

    const PERIOD: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn denies_once_limit_is_reached() {
        let tracker = RateLimitTracker::new();
        let (p, w) = (ProviderKind::AlphaVantage, WindowKind::Minute);

        for _ in 0..5 {
            assert!(tracker.can_call(p, w, 5, PERIOD));
            tracker.record_call(p, w);
        }
        assert!(!tracker.can_call(p, w, 5, PERIOD));
    }

    #[tokio::test(start_paused = true)]
    async fn readmits_once_records_age_out() {
        let tracker = RateLimitTracker::new();
        let (p, w) = (ProviderKind::TwelveData, WindowKind::Minute);

        tracker.record_call(p, w);
        advance(Duration::from_secs(30)).await;
        tracker.record_call(p, w);
        assert!(!tracker.can_call(p, w, 2, PERIOD));

        // First record leaves the trailing window, second is still inside.
        advance(Duration::from_secs(31)).await;
        assert!(tracker.can_call(p, w, 2, PERIOD));
        assert!(!tracker.can_call(p, w, 1, PERIOD));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_always_denies() {
        let tracker = RateLimitTracker::new();
        assert!(!tracker.can_call(ProviderKind::Fred, WindowKind::Day, 0, PERIOD));
    }

    #[tokio::test(start_paused = true)]
    async fn usage_reports_per_provider_and_window() {
        let tracker = RateLimitTracker::new();
        tracker.record_call(ProviderKind::Fred, WindowKind::Minute);
        tracker.record_call(ProviderKind::Fred, WindowKind::Minute);
        tracker.record_call(ProviderKind::Fred, WindowKind::Day);
        tracker.record_call(ProviderKind::Finnhub, WindowKind::Minute);

        let usage = tracker.usage();
        assert_eq!(usage[&ProviderKind::Fred][&WindowKind::Minute], 2);
        assert_eq!(usage[&ProviderKind::Fred][&WindowKind::Day], 1);
        assert_eq!(usage[&ProviderKind::Finnhub][&WindowKind::Minute], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn time_until_reset_tracks_oldest_record() {
        let tracker = RateLimitTracker::new();
        let (p, w) = (ProviderKind::NewsApi, WindowKind::Minute);

        assert!(tracker.time_until_reset(p, w, PERIOD).is_none());

        tracker.record_call(p, w);
        advance(Duration::from_secs(20)).await;
        let remaining = tracker.time_until_reset(p, w, PERIOD).unwrap();
        assert_eq!(remaining, Duration::from_secs(40));

        advance(Duration::from_secs(40)).await;
        assert!(tracker.time_until_reset(p, w, PERIOD).is_none());
    }
}
