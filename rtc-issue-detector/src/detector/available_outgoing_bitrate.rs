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
pub struct AvailableOutgoingBitrateIssueDetectorConfig {
    pub history: StatsHistoryConfig,
    /// Estimate in bits per second below which sending video is throttled.
    pub available_outgoing_bitrate_threshold: f64,
}

impl Default for AvailableOutgoingBitrateIssueDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            available_outgoing_bitrate_threshold: 100_000.0,
        }
    }
}

impl AvailableOutgoingBitrateIssueDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_available_outgoing_bitrate_threshold(mut self, bitrate: f64) -> Self {
        self.available_outgoing_bitrate_threshold = bitrate;
        self
    }
}

/// Compares what the congestion controller lets us send with what the
/// outbound streams need.
///
/// Each snapshot is judged on its own figures, but the first snapshot of a
/// connection is skipped: the estimate has not converged yet.
pub struct AvailableOutgoingBitrateIssueDetector {
    config: AvailableOutgoingBitrateIssueDetectorConfig,
    history: StatsHistory,
}

impl Default for AvailableOutgoingBitrateIssueDetector {
    fn default() -> Self {
        Self::new(AvailableOutgoingBitrateIssueDetectorConfig::default())
    }
}

impl AvailableOutgoingBitrateIssueDetector {
    pub fn new(config: AvailableOutgoingBitrateIssueDetectorConfig) -> Self {
        Self {
            config,
            history: StatsHistory::new(config.history),
        }
    }

    fn process(&self, now: Instant, stats: &ParsedStats) -> Vec<Issue> {
        if self.history.latest(now, stats.connection_id()).is_none() {
            return vec![];
        }

        let Some(available_outgoing_bitrate) = stats.connection.available_outgoing_bitrate else {
            trace!("{}: estimate not measured yet", self.name());
            return vec![];
        };

        let audio_total_target_bitrate: f64 =
            stats.audio.outbound.iter().map(|s| s.target_bitrate).sum();
        let video_total_bitrate: f64 = stats.video.outbound.iter().map(|s| s.bitrate).sum();

        if audio_total_target_bitrate <= 0.0 && video_total_bitrate <= 0.0 {
            return vec![];
        }

        if audio_total_target_bitrate > available_outgoing_bitrate {
            debug!(
                "{}: audio target {} exceeds available {}",
                self.name(),
                audio_total_target_bitrate,
                available_outgoing_bitrate
            );
            return vec![
                Issue::new(IssueType::Network, IssueReason::OutboundNetworkThroughput)
                    .with_stats_sample(json!({
                        "availableOutgoingBitrate": available_outgoing_bitrate,
                        "audioStreamsTotalTargetBitrate": audio_total_target_bitrate,
                    })),
            ];
        }

        if video_total_bitrate > 0.0
            && available_outgoing_bitrate < self.config.available_outgoing_bitrate_threshold
        {
            debug!(
                "{}: available {} below floor while sending video",
                self.name(),
                available_outgoing_bitrate
            );
            return vec![
                Issue::new(IssueType::Network, IssueReason::OutboundNetworkThroughput)
                    .with_stats_sample(json!({
                        "availableOutgoingBitrate": available_outgoing_bitrate,
                        "videoStreamsTotalBitrate": video_total_bitrate,
                    })),
            ];
        }

        vec![]
    }
}

impl IssueDetector for AvailableOutgoingBitrateIssueDetector {
    fn name(&self) -> &'static str {
        "available_outgoing_bitrate"
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
    use crate::stats::outbound::ParsedOutboundAudioStreamStats;
    use std::time::Duration;

    fn snapshot(available: Option<f64>, audio_target: f64, video_bitrate: f64) -> ParsedStats {
        let mut stats = connection();
        stats.connection.available_outgoing_bitrate = available;
        stats.audio.outbound.push(ParsedOutboundAudioStreamStats {
            ssrc: 1,
            target_bitrate: audio_target,
            ..Default::default()
        });
        let mut video = outbound_video(2);
        video.bitrate = video_bitrate;
        stats.video.outbound.push(video);
        stats
    }

    /// Judges `stats` as the second snapshot of its connection.
    fn detect(stats: &ParsedStats) -> Vec<Issue> {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = AvailableOutgoingBitrateIssueDetector::default();
        assert!(detector.detect(now, stats, &scores).unwrap().is_empty());
        detector
            .detect(now + Duration::from_secs(1), stats, &scores)
            .unwrap()
    }

    #[test]
    fn test_first_snapshot_yields_nothing() {
        let mut detector = AvailableOutgoingBitrateIssueDetector::default();
        let issues = detector
            .detect(
                Instant::now(),
                &snapshot(Some(50_000.0), 0.0, 300_000.0),
                &NetworkScores::default(),
            )
            .unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_low_estimate_while_sending_video() {
        let issues = detect(&snapshot(Some(50_000.0), 0.0, 300_000.0));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, IssueReason::OutboundNetworkThroughput);
        assert_eq!(issues[0].stats_sample["videoStreamsTotalBitrate"], 300_000.0);
    }

    #[test]
    fn test_audio_target_exceeds_estimate() {
        let issues = detect(&snapshot(Some(10_000.0), 20_000.0, 1_000_000.0));
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].stats_sample["audioStreamsTotalTargetBitrate"],
            20_000.0
        );
    }

    #[test]
    fn test_skips() {
        assert!(detect(&snapshot(None, 20_000.0, 1_000_000.0)).is_empty());
        assert!(detect(&snapshot(Some(10_000.0), 0.0, 0.0)).is_empty());
        assert!(detect(&snapshot(Some(500_000.0), 20_000.0, 300_000.0)).is_empty());
    }

    #[test]
    fn test_idle_connection_starts_over() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let stats = snapshot(Some(50_000.0), 0.0, 300_000.0);
        let mut detector = AvailableOutgoingBitrateIssueDetector::default();

        detector.detect(now, &stats, &scores).unwrap();
        let deadline = detector.poll_timeout().unwrap();
        detector.handle_timeout(deadline);
        assert_eq!(detector.poll_timeout(), None);

        assert!(detector.detect(deadline, &stats, &scores).unwrap().is_empty());
        assert_eq!(
            detector
                .detect(deadline + Duration::from_secs(1), &stats, &scores)
                .unwrap()
                .len(),
            1
        );
    }
}
