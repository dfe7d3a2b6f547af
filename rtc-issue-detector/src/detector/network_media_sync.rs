use super::IssueDetector;
use crate::error::Result;
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::network_scores::NetworkScores;
use crate::stats::ParsedStats;
use log::debug;
use serde_json::json;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkMediaSyncIssueDetectorConfig {
    pub history: StatsHistoryConfig,
    /// Share of received samples the jitter buffer had to insert or remove,
    /// in percent, above which playout is considered out of sync.
    pub corrected_samples_pct_threshold: f64,
}

impl Default for NetworkMediaSyncIssueDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            corrected_samples_pct_threshold: 5.0,
        }
    }
}

impl NetworkMediaSyncIssueDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_corrected_samples_pct_threshold(mut self, pct: f64) -> Self {
        self.corrected_samples_pct_threshold = pct;
        self
    }
}

/// Detects inbound audio whose playout the jitter buffer keeps stretching or
/// compressing to stay in sync.
pub struct NetworkMediaSyncIssueDetector {
    config: NetworkMediaSyncIssueDetectorConfig,
    history: StatsHistory,
}

impl Default for NetworkMediaSyncIssueDetector {
    fn default() -> Self {
        Self::new(NetworkMediaSyncIssueDetectorConfig::default())
    }
}

impl NetworkMediaSyncIssueDetector {
    pub fn new(config: NetworkMediaSyncIssueDetectorConfig) -> Self {
        Self {
            config,
            history: StatsHistory::new(config.history),
        }
    }

    fn process(&self, now: Instant, stats: &ParsedStats) -> Vec<Issue> {
        let Some(prev) = self.history.latest(now, stats.connection_id()) else {
            return vec![];
        };

        let mut issues = vec![];
        for stream in &stats.audio.inbound {
            let Some(prev_stream) = prev.stats.inbound_audio(stream.ssrc) else {
                continue;
            };

            let corrected = stream.corrected_samples() as i64;
            let last_corrected = prev_stream.corrected_samples() as i64;
            if corrected == last_corrected {
                continue;
            }

            let delta_samples_received = stream.track.total_samples_received as i64
                - prev_stream.track.total_samples_received as i64;
            if delta_samples_received <= 0 {
                continue;
            }

            let delta_corrected_samples = corrected - last_corrected;
            let corrected_samples_pct =
                (delta_corrected_samples as f64 * 100.0 / delta_samples_received as f64).round();

            if corrected_samples_pct > self.config.corrected_samples_pct_threshold {
                debug!(
                    "{}: ssrc {} corrected {}% of samples",
                    self.name(),
                    stream.ssrc,
                    corrected_samples_pct
                );
                issues.push(
                    Issue::new(IssueType::Network, IssueReason::NetworkMediaSyncFailure)
                        .with_ssrc(stream.ssrc)
                        .with_track_identifier(&stream.track.track_identifier)
                        .with_stats_sample(json!({
                            "correctedSamplesPercentage": corrected_samples_pct,
                            "deltaCorrectedSamples": delta_corrected_samples,
                            "deltaSamplesReceived": delta_samples_received,
                        })),
                );
            }
        }

        issues
    }
}

impl IssueDetector for NetworkMediaSyncIssueDetector {
    fn name(&self) -> &'static str {
        "network_media_sync"
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
