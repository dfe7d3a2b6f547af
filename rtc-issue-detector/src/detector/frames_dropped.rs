use super::IssueDetector;
use crate::error::Result;
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::network_scores::NetworkScores;
use crate::stats::ParsedStats;
use log::{debug, trace};
use serde_json::json;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramesDroppedIssueDetectorConfig {
    pub history: StatsHistoryConfig,
    /// Ratio of dropped to received frames at or above which the decoder is
    /// considered throttled.
    pub frames_dropped_threshold: f64,
}

impl Default for FramesDroppedIssueDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            frames_dropped_threshold: 0.5,
        }
    }
}

impl FramesDroppedIssueDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_frames_dropped_threshold(mut self, ratio: f64) -> Self {
        self.frames_dropped_threshold = ratio;
        self
    }
}

/// Reports inbound video streams that drop most of the frames they receive.
pub struct FramesDroppedIssueDetector {
    config: FramesDroppedIssueDetectorConfig,
    history: StatsHistory,
}

impl Default for FramesDroppedIssueDetector {
    fn default() -> Self {
        Self::new(FramesDroppedIssueDetectorConfig::default())
    }
}

impl FramesDroppedIssueDetector {
    pub fn new(config: FramesDroppedIssueDetectorConfig) -> Self {
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
        for stream in stats.video.inbound.iter().filter(|s| s.frames_dropped > 0) {
            let Some(prev_stream) = prev.stats.inbound_video(stream.ssrc) else {
                continue;
            };
            if stream.frames_dropped == prev_stream.frames_dropped {
                continue;
            }

            let delta_frames_received =
                stream.frames_received as i64 - prev_stream.frames_received as i64;
            let delta_frames_decoded =
                stream.frames_decoded as i64 - prev_stream.frames_decoded as i64;
            let delta_frames_dropped =
                stream.frames_dropped as i64 - prev_stream.frames_dropped as i64;

            if delta_frames_received <= 0 {
                trace!(
                    "{}: ssrc {} received no frames (decoded {})",
                    self.name(),
                    stream.ssrc,
                    delta_frames_decoded
                );
                continue;
            }

            let ratio = delta_frames_dropped as f64 / delta_frames_received as f64;
            if ratio >= self.config.frames_dropped_threshold {
                debug!(
                    "{}: ssrc {} dropped {} of {} frames",
                    self.name(),
                    stream.ssrc,
                    delta_frames_dropped,
                    delta_frames_received
                );
                issues.push(
                    Issue::new(IssueType::Cpu, IssueReason::DecoderCpuThrottling)
                        .with_ssrc(stream.ssrc)
                        .with_track_identifier(&stream.track.track_identifier)
                        .with_stats_sample(json!({
                            "framesDroppedPercentage": (ratio * 100.0).round(),
                            "deltaFramesDropped": delta_frames_dropped,
                            "deltaFramesReceived": delta_frames_received,
                        })),
                );
            }
        }

        issues
    }
}

impl IssueDetector for FramesDroppedIssueDetector {
    fn name(&self) -> &'static str {
        "frames_dropped"
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
    use crate::detector::test_util::{connection, inbound_video};

    fn snapshot(received: u32, decoded: u32, dropped: u32) -> ParsedStats {
        let mut stats = connection();
        let mut video = inbound_video(9);
        video.frames_received = received;
        video.frames_decoded = decoded;
        video.frames_dropped = dropped;
        stats.video.inbound.push(video);
        stats
    }

    #[test]
    fn test_most_frames_dropped() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = FramesDroppedIssueDetector::default();

        detector.detect(now, &snapshot(100, 90, 10), &scores).unwrap();
        let issues = detector.detect(now, &snapshot(200, 130, 70), &scores).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, IssueReason::DecoderCpuThrottling);
        assert_eq!(issues[0].stats_sample["framesDroppedPercentage"], 60.0);
    }

    #[test]
    fn test_skips() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = FramesDroppedIssueDetector::default();

        detector.detect(now, &snapshot(100, 90, 10), &scores).unwrap();
        // few drops
        assert!(detector
            .detect(now, &snapshot(200, 180, 20), &scores)
            .unwrap()
            .is_empty());
        // stopped stream
        assert!(detector
            .detect(now, &snapshot(200, 180, 25), &scores)
            .unwrap()
            .is_empty());
        // unchanged drops
        assert!(detector
            .detect(now, &snapshot(300, 280, 25), &scores)
            .unwrap()
            .is_empty());
    }
}
