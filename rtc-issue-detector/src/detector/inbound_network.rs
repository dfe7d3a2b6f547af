use super::IssueDetector;
use crate::error::Result;
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::network_scores::{NetworkScores, inbound_network_stats};
use crate::stats::ParsedStats;
use log::{debug, trace};
use serde_json::json;
use std::time::Instant;

/// Thresholds of [`InboundNetworkIssueDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InboundNetworkIssueDetectorConfig {
    pub history: StatsHistoryConfig,
    /// Loss above this percentage is high.
    pub high_packets_loss_pct: f64,
    /// Average jitter at or above this many milliseconds is high.
    pub high_jitter_ms: f64,
    /// Round trip time at or above this many milliseconds is high.
    pub high_rtt_ms: f64,
    /// Jitter buffer delay above this many milliseconds is high.
    pub high_jitter_buffer_delay_ms: f64,
}

impl Default for InboundNetworkIssueDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            high_packets_loss_pct: 5.0,
            high_jitter_ms: 200.0,
            high_rtt_ms: 250.0,
            high_jitter_buffer_delay_ms: 500.0,
        }
    }
}

impl InboundNetworkIssueDetectorConfig {
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

    pub fn with_high_rtt_ms(mut self, ms: f64) -> Self {
        self.high_rtt_ms = ms;
        self
    }

    pub fn with_high_jitter_buffer_delay_ms(mut self, ms: f64) -> Self {
        self.high_jitter_buffer_delay_ms = ms;
        self
    }
}

/// Detects degraded network conditions on what the local endpoint receives.
///
/// The checks are not exclusive, one snapshot can yield up to four issues:
///
/// - high jitter or high loss: `inbound-network-quality`
/// - high RTT with neither high jitter nor high loss: `server-issue`
/// - high jitter and high loss: `inbound-network-media-latency`
/// - high jitter and high jitter buffer delay: `network-media-sync-failure`
pub struct InboundNetworkIssueDetector {
    config: InboundNetworkIssueDetectorConfig,
    history: StatsHistory,
}

impl Default for InboundNetworkIssueDetector {
    fn default() -> Self {
        Self::new(InboundNetworkIssueDetectorConfig::default())
    }
}

impl InboundNetworkIssueDetector {
    pub fn new(config: InboundNetworkIssueDetectorConfig) -> Self {
        Self {
            config,
            history: StatsHistory::new(config.history),
        }
    }

    fn process(&self, now: Instant, stats: &ParsedStats) -> Vec<Issue> {
        let Some(prev) = self.history.latest(now, stats.connection_id()) else {
            return vec![];
        };
        let Some(sample) = inbound_network_stats(stats, &prev.stats) else {
            trace!("{}: no inbound streams on {}", self.name(), stats.connection_id());
            return vec![];
        };

        let avg_jitter_buffer_delay = sample.avg_jitter_buffer_delay.unwrap_or(0.0);
        let is_high_packets_loss = sample.packets_loss > self.config.high_packets_loss_pct;
        let is_high_jitter = sample.avg_jitter >= self.config.high_jitter_ms;
        let is_high_rtt = sample.rtt >= self.config.high_rtt_ms;
        let is_high_jitter_buffer_delay =
            avg_jitter_buffer_delay > self.config.high_jitter_buffer_delay_ms;

        let stats_sample = json!({
            "packetsLoss": sample.packets_loss,
            "avgJitter": sample.avg_jitter,
            "rtt": sample.rtt,
            "avgJitterBufferDelay": avg_jitter_buffer_delay,
        });
        let local_candidate = &stats.connection.local.id;

        let mut issues = vec![];
        if is_high_jitter || is_high_packets_loss {
            issues.push(
                Issue::new(IssueType::Network, IssueReason::InboundNetworkQuality)
                    .with_ice_candidate(local_candidate)
                    .with_stats_sample(stats_sample.clone()),
            );
        }
        if is_high_rtt && !is_high_jitter && !is_high_packets_loss {
            issues.push(
                Issue::new(IssueType::Server, IssueReason::ServerIssue)
                    .with_ice_candidate(&stats.connection.remote.id)
                    .with_stats_sample(stats_sample.clone()),
            );
        }
        if is_high_packets_loss && is_high_jitter {
            issues.push(
                Issue::new(IssueType::Network, IssueReason::InboundNetworkMediaLatency)
                    .with_ice_candidate(local_candidate)
                    .with_stats_sample(stats_sample.clone()),
            );
        }
        if is_high_jitter && is_high_jitter_buffer_delay {
            issues.push(
                Issue::new(IssueType::Network, IssueReason::NetworkMediaSyncFailure)
                    .with_ice_candidate(local_candidate)
                    .with_stats_sample(stats_sample),
            );
        }

        if !issues.is_empty() {
            debug!(
                "{}: {} issue(s) on {}: loss={}% jitter={}ms rtt={}ms jitter_buffer={}ms",
                self.name(),
                issues.len(),
                stats.connection_id(),
                sample.packets_loss,
                sample.avg_jitter,
                sample.rtt,
                avg_jitter_buffer_delay
            );
        }

        issues
    }
}

impl IssueDetector for InboundNetworkIssueDetector {
    fn name(&self) -> &'static str {
        "inbound_network"
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
