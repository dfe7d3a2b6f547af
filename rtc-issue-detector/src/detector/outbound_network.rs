use super::IssueDetector;
use crate::error::Result;
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::network_scores::{NetworkScores, outbound_network_stats};
use crate::stats::ParsedStats;
use log::{debug, trace};
use serde_json::json;
use std::time::Instant;

/// Thresholds of [`OutboundNetworkIssueDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutboundNetworkIssueDetectorConfig {
    pub history: StatsHistoryConfig,
    /// Loss above this percentage is high.
    pub high_packets_loss_pct: f64,
    /// Average jitter at or above this many milliseconds is high.
    pub high_jitter_ms: f64,
}

impl Default for OutboundNetworkIssueDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            high_packets_loss_pct: 5.0,
            high_jitter_ms: 200.0,
        }
    }
}

impl OutboundNetworkIssueDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_high_packets_loss_pct(mut self, pct: f64) -> Self {
        self.high_packets_loss_pct = pct;
        self
    }

    pub fn with_high_jitter_ms(mut self, ms: f64) -> Self {
        self.high_jitter_ms = ms;
        self
    }
}

/// Detects degraded network conditions on what the local endpoint sends,
/// based on the receiver reports of the remote peer.
pub struct OutboundNetworkIssueDetector {
    config: OutboundNetworkIssueDetectorConfig,
    history: StatsHistory,
}

impl Default for OutboundNetworkIssueDetector {
    fn default() -> Self {
        Self::new(OutboundNetworkIssueDetectorConfig::default())
    }
}

impl OutboundNetworkIssueDetector {
    pub fn new(config: OutboundNetworkIssueDetectorConfig) -> Self {
        Self {
            config,
            history: StatsHistory::new(config.history),
        }
    }

    fn process(&self, now: Instant, stats: &ParsedStats) -> Vec<Issue> {
        let Some(prev) = self.history.latest(now, stats.connection_id()) else {
            return vec![];
        };
        let Some(sample) = outbound_network_stats(stats, &prev.stats) else {
            trace!("{}: no receiver reports on {}", self.name(), stats.connection_id());
            return vec![];
        };

        let is_high_packets_loss = sample.packets_loss > self.config.high_packets_loss_pct;
        let is_high_jitter = sample.avg_jitter >= self.config.high_jitter_ms;

        let stats_sample = json!({
            "packetsLoss": sample.packets_loss,
            "avgJitter": sample.avg_jitter,
            "rtt": sample.rtt,
        });
        let local_candidate = &stats.connection.local.id;

        let mut issues = vec![];
        if is_high_packets_loss && is_high_jitter {
            issues.push(
                Issue::new(IssueType::Network, IssueReason::OutboundNetworkMediaLatency)
                    .with_ice_candidate(local_candidate)
                    .with_stats_sample(stats_sample.clone()),
            );
        }
        if is_high_jitter || is_high_packets_loss {
            issues.push(
                Issue::new(IssueType::Network, IssueReason::OutboundNetworkQuality)
                    .with_ice_candidate(local_candidate)
                    .with_stats_sample(stats_sample),
            );
        }

        if !issues.is_empty() {
            debug!(
                "{}: {} issue(s) on {}: loss={}% jitter={}ms rtt={}ms",
                self.name(),
                issues.len(),
                stats.connection_id(),
                sample.packets_loss,
                sample.avg_jitter,
                sample.rtt
            );
        }

        issues
    }
}

impl IssueDetector for OutboundNetworkIssueDetector {
    fn name(&self) -> &'static str {
        "outbound_network"
    }

    fn detect(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Result<Vec<Issue>> {
        let issues = self.process(now, stats);
        self.history.push(now, stats, network_scores);
        Ok(issues)
    }

    fn handle_timeout(&mut self, now: Instant) {
        self.history.handle_timeout(now);
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.history.poll_timeout()
    }

    fn close(&mut self) {
        self.history.close();
    }
}
