//! Per-connection history of processed snapshots.

use crate::network_scores::NetworkScores;
use crate::stats::ParsedStats;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default number of snapshots retained per connection.
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 5;
/// Default idle time after which a connection's history is dropped.
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(35);

/// Bounds of a [`StatsHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsHistoryConfig {
    /// Maximum number of snapshots kept per connection; the oldest is
    /// evicted on overflow. At least 1.
    pub max_size: usize,
    /// Idle time after the last snapshot before the connection is forgotten.
    pub ttl: Duration,
}

impl Default for StatsHistoryConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_HISTORY_SIZE,
            ttl: DEFAULT_HISTORY_TTL,
        }
    }
}

impl StatsHistoryConfig {
    /// Clamped to at least 1, a detector without a previous snapshot has
    /// nothing to compare against.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A snapshot together with the scores it was evaluated with.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedStats {
    pub stats: ParsedStats,
    pub network_scores: NetworkScores,
}

#[derive(Debug)]
struct ConnectionHistory {
    entries: VecDeque<ProcessedStats>,
    last_updated: Instant,
}

/// Bounded, idle-expiring history of snapshots sharded by connection id.
///
/// Reads treat an expired connection as absent even before
/// [`handle_timeout`](Self::handle_timeout) physically removes it.
#[derive(Debug, Default)]
pub struct StatsHistory {
    config: StatsHistoryConfig,
    connections: HashMap<String, ConnectionHistory>,
}

impl StatsHistory {
    pub fn new(mut config: StatsHistoryConfig) -> Self {
        if config.max_size == 0 {
            warn!("stats history: max_size 0 would retain nothing, using 1");
            config.max_size = 1;
        }
        Self {
            config,
            connections: HashMap::new(),
        }
    }

    pub fn config(&self) -> &StatsHistoryConfig {
        &self.config
    }

    fn get(&self, now: Instant, connection_id: &str) -> Option<&ConnectionHistory> {
        self.connections
            .get(connection_id)
            .filter(|h| now.saturating_duration_since(h.last_updated) < self.config.ttl)
    }

    /// Appends a snapshot and refreshes the connection's idle deadline.
    pub fn push(&mut self, now: Instant, stats: &ParsedStats, network_scores: &NetworkScores) {
        let ttl = self.config.ttl;
        let history = self
            .connections
            .entry(stats.connection_id().to_owned())
            .or_insert_with(|| ConnectionHistory {
                entries: VecDeque::new(),
                last_updated: now,
            });
        if now.saturating_duration_since(history.last_updated) >= ttl {
            history.entries.clear();
        }

        history.entries.push_back(ProcessedStats {
            stats: stats.clone(),
            network_scores: network_scores.clone(),
        });
        while history.entries.len() > self.config.max_size {
            history.entries.pop_front();
        }
        history.last_updated = now;
    }

    /// The most recent snapshot of a connection.
    pub fn latest(&self, now: Instant, connection_id: &str) -> Option<&ProcessedStats> {
        self.get(now, connection_id).and_then(|h| h.entries.back())
    }

    /// All retained snapshots of a connection, oldest first.
    pub fn all<'a>(
        &'a self,
        now: Instant,
        connection_id: &str,
    ) -> impl Iterator<Item = &'a ProcessedStats> + use<'a> {
        self.get(now, connection_id)
            .into_iter()
            .flat_map(|h| h.entries.iter())
    }

    pub fn len(&self, now: Instant, connection_id: &str) -> usize {
        self.get(now, connection_id).map_or(0, |h| h.entries.len())
    }

    pub fn is_empty(&self, now: Instant, connection_id: &str) -> bool {
        self.len(now, connection_id) == 0
    }

    /// Drops everything retained for a connection.
    pub fn clear(&mut self, connection_id: &str) {
        self.connections.remove(connection_id);
    }

    /// Removes idle connections and returns their ids.
    pub fn handle_timeout(&mut self, now: Instant) -> Vec<String> {
        let ttl = self.config.ttl;
        let expired: Vec<String> = self
            .connections
            .iter()
            .filter(|(_, h)| now.saturating_duration_since(h.last_updated) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for connection_id in &expired {
            debug!("stats history: dropping idle connection {}", connection_id);
            self.connections.remove(connection_id);
        }

        expired
    }

    /// Earliest instant at which some connection becomes idle.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.connections
            .values()
            .map(|h| h.last_updated + self.config.ttl)
            .min()
    }

    pub fn close(&mut self) {
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(connection_id: &str, packets_received: u64) -> ParsedStats {
        let mut stats = ParsedStats::default();
        stats.connection.id = connection_id.to_owned();
        stats.connection.packets_received = packets_received;
        stats
    }

    #[test]
    fn test_bounded_ring_buffer() {
        let now = Instant::now();
        let mut history = StatsHistory::new(StatsHistoryConfig::default().with_max_size(3));
        let scores = NetworkScores::default();

        for i in 0..5 {
            history.push(now, &stats("pc-1", i), &scores);
        }

        let retained: Vec<u64> = history
            .all(now, "pc-1")
            .map(|p| p.stats.connection.packets_received)
            .collect();
        assert_eq!(retained, vec![2, 3, 4]);
        assert_eq!(
            history.latest(now, "pc-1").unwrap().stats.connection.packets_received,
            4
        );
        assert!(history.is_empty(now, "pc-2"));
    }

    #[test]
    fn test_idle_expiry() {
        let now = Instant::now();
        let ttl = Duration::from_secs(10);
        let mut history = StatsHistory::new(StatsHistoryConfig::default().with_ttl(ttl));
        let scores = NetworkScores::default();

        history.push(now, &stats("pc-1", 1), &scores);
        history.push(now + Duration::from_secs(5), &stats("pc-2", 1), &scores);
        assert_eq!(history.poll_timeout(), Some(now + ttl));

        let later = now + Duration::from_secs(11);
        assert!(history.latest(later, "pc-1").is_none());
        assert!(history.latest(later, "pc-2").is_some());

        assert_eq!(history.handle_timeout(later), vec!["pc-1".to_owned()]);
        assert_eq!(
            history.poll_timeout(),
            Some(now + Duration::from_secs(5) + ttl)
        );

        // a stale connection restarts from scratch
        history.push(now + Duration::from_secs(30), &stats("pc-2", 2), &scores);
        assert_eq!(history.len(now + Duration::from_secs(30), "pc-2"), 1);
    }

    #[test]
    fn test_zero_max_size_keeps_latest() {
        let now = Instant::now();
        let scores = NetworkScores::default();

        assert_eq!(StatsHistoryConfig::default().with_max_size(0).max_size, 1);

        let config = StatsHistoryConfig {
            max_size: 0,
            ..Default::default()
        };
        let mut history = StatsHistory::new(config);
        assert_eq!(history.config().max_size, 1);

        history.push(now, &stats("pc-1", 1), &scores);
        history.push(now, &stats("pc-1", 2), &scores);
        assert_eq!(history.len(now, "pc-1"), 1);
        assert_eq!(
            history.latest(now, "pc-1").unwrap().stats.connection.packets_received,
            2
        );
    }

    #[test]
    fn test_clear() {
        let now = Instant::now();
        let mut history = StatsHistory::default();
        history.push(now, &stats("pc-1", 1), &NetworkScores::default());
        history.clear("pc-1");
        assert!(history.latest(now, "pc-1").is_none());
    }
}
