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
pub struct FramesEncodedSentIssueDetectorConfig {
    pub history: StatsHistoryConfig,
    /// Ratio of sent to encoded frames at or above which the stream is
    /// reported when the two counters diverge.
    pub missed_frames_threshold: f64,
}

impl Default for FramesEncodedSentIssueDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            missed_frames_threshold: 0.15,
        }
    }
}

impl FramesEncodedSentIssueDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_missed_frames_threshold(mut self, ratio: f64) -> Self {
        self.missed_frames_threshold = ratio;
        self
    }
}

/// Reports outbound video whose encoded frames do not all make it onto the
/// wire.
pub struct FramesEncodedSentIssueDetector {
    config: FramesEncodedSentIssueDetectorConfig,
    history: StatsHistory,
}

impl Default for FramesEncodedSentIssueDetector {
    fn default() -> Self {
        Self::new(FramesEncodedSentIssueDetectorConfig::default())
    }
}

impl FramesEncodedSentIssueDetector {
    pub fn new(config: FramesEncodedSentIssueDetectorConfig) -> Self {
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
        for stream in stats.video.outbound.iter().filter(|s| s.frames_encoded > 0) {
            let Some(prev_stream) = prev.stats.outbound_video(stream.ssrc) else {
                continue;
            };

            let delta_frames_encoded =
                stream.frames_encoded as i64 - prev_stream.frames_encoded as i64;
            let delta_frames_sent = stream.frames_sent as i64 - prev_stream.frames_sent as i64;

            // paused
            if delta_frames_encoded == 0 {
                continue;
            }
            if delta_frames_encoded == delta_frames_sent {
                continue;
            }

            let missed_frames = delta_frames_sent as f64 / delta_frames_encoded as f64;
            if missed_frames >= self.config.missed_frames_threshold {
                debug!(
                    "{}: ssrc {} sent {} of {} encoded frames",
                    self.name(),
                    stream.ssrc,
                    delta_frames_sent,
                    delta_frames_encoded
                );
                issues.push(
                    Issue::new(IssueType::Network, IssueReason::OutboundNetworkThroughput)
                        .with_ssrc(stream.ssrc)
                        .with_stats_sample(json!({
                            "missedFramesPercentage": (missed_frames * 100.0).round(),
                            "deltaFramesEncoded": delta_frames_encoded,
                            "deltaFramesSent": delta_frames_sent,
                        })),
                );
            }
        }

        issues
    }
}

impl IssueDetector for FramesEncodedSentIssueDetector {
    fn name(&self) -> &'static str {
        "frames_encoded_sent"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_util::{connection, outbound_video};

    fn snapshot(encoded: u32, sent: u32) -> ParsedStats {
        let mut stats = connection();
        let mut video = outbound_video(4);
        video.frames_encoded = encoded;
        video.frames_sent = sent;
        stats.video.outbound.push(video);
        stats
    }

    #[test]
    fn test_encoded_and_sent_diverge() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = FramesEncodedSentIssueDetector::default();

        detector.detect(now, &snapshot(100, 100), &scores).unwrap();
        let issues = detector.detect(now, &snapshot(200, 180), &scores).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].ssrc, Some(4));
        assert_eq!(issues[0].stats_sample["deltaFramesSent"], 80);
    }

    #[test]
    fn test_paused_or_in_step() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = FramesEncodedSentIssueDetector::default();

        detector.detect(now, &snapshot(100, 100), &scores).unwrap();
        assert!(detector.detect(now, &snapshot(100, 100), &scores).unwrap().is_empty());
        assert!(detector.detect(now, &snapshot(130, 130), &scores).unwrap().is_empty());
    }
}
