use super::IssueDetector;
use crate::error::Result;
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::network_scores::NetworkScores;
use crate::stats::{ParsedStats, RTCQualityLimitationReason};
use log::debug;
use serde_json::json;
use std::time::Instant;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct QualityLimitationsIssueDetectorConfig {
    pub history: StatsHistoryConfig,
}

impl QualityLimitationsIssueDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }
}

/// Reports outbound video the encoder limits and that stopped sending frames.
pub struct QualityLimitationsIssueDetector {
    history: StatsHistory,
}

impl Default for QualityLimitationsIssueDetector {
    fn default() -> Self {
        Self::new(QualityLimitationsIssueDetectorConfig::default())
    }
}

impl QualityLimitationsIssueDetector {
    pub fn new(config: QualityLimitationsIssueDetectorConfig) -> Self {
        Self {
            history: StatsHistory::new(config.history),
        }
    }

    fn process(&self, now: Instant, stats: &ParsedStats) -> Vec<Issue> {
        let Some(prev) = self.history.latest(now, stats.connection_id()) else {
            return vec![];
        };

        let mut issues = vec![];
        for stream in stats
            .video
            .outbound
            .iter()
            .filter(|s| s.quality_limitation_reason != RTCQualityLimitationReason::None)
        {
            let Some(prev_stream) = prev.stats.outbound_video(stream.ssrc) else {
                continue;
            };
            if stream.frames_sent > prev_stream.frames_sent {
                // still sending
                continue;
            }

            let (typ, reason) = match stream.quality_limitation_reason {
                RTCQualityLimitationReason::Cpu => {
                    (IssueType::Cpu, IssueReason::EncoderCpuThrottling)
                }
                RTCQualityLimitationReason::Bandwidth => {
                    (IssueType::Network, IssueReason::OutboundNetworkThroughput)
                }
                _ => continue,
            };

            debug!(
                "{}: ssrc {} limited by {:?}",
                self.name(),
                stream.ssrc,
                stream.quality_limitation_reason
            );
            issues.push(
                Issue::new(typ, reason)
                    .with_ssrc(stream.ssrc)
                    .with_stats_sample(json!({
                        "qualityLimitationReason": stream.quality_limitation_reason,
                        "framesSent": stream.frames_sent,
                    })),
            );
        }

        issues
    }
}

impl IssueDetector for QualityLimitationsIssueDetector {
    fn name(&self) -> &'static str {
        "quality_limitations"
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
