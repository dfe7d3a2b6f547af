use super::IssueDetector;
use crate::error::Result;
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::mark::DebounceMarks;
use crate::network_scores::NetworkScores;
use crate::stats::ParsedStats;
use crate::stats::inbound::ParsedInboundVideoStreamStats;
use log::debug;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadVideoTrackDetectorConfig {
    pub history: StatsHistoryConfig,
    /// How long packets must keep arriving without a decoded frame before
    /// the track is reported.
    pub timeout: Duration,
}

impl Default for DeadVideoTrackDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl DeadVideoTrackDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Reports inbound video tracks that receive packets but decode nothing.
///
/// Tracks are keyed by track identifier. A track becomes suspect the first
/// time packets arrive without new decoded frames and is reported once the
/// condition has held for the configured timeout. Any decoded frame resets
/// it to healthy.
pub struct DeadVideoTrackDetector {
    config: DeadVideoTrackDetectorConfig,
    history: StatsHistory,
    marks: HashMap<String, DebounceMarks<String>>,
}

impl Default for DeadVideoTrackDetector {
    fn default() -> Self {
        Self::new(DeadVideoTrackDetectorConfig::default())
    }
}

impl DeadVideoTrackDetector {
    pub fn new(config: DeadVideoTrackDetectorConfig) -> Self {
        Self {
            config,
            history: StatsHistory::new(config.history),
            marks: HashMap::new(),
        }
    }

    fn process(&mut self, now: Instant, stats: &ParsedStats) -> Vec<Issue> {
        let connection_id = stats.connection_id();
        let Some(prev) = self.history.latest(now, connection_id) else {
            self.marks.remove(connection_id);
            return vec![];
        };

        let prev_streams: HashMap<&str, &ParsedInboundVideoStreamStats> = prev
            .stats
            .video
            .inbound
            .iter()
            .map(|s| (s.track.track_identifier.as_str(), s))
            .collect();

        let timeout = self.config.timeout;
        let marks = self
            .marks
            .entry(connection_id.to_owned())
            .or_insert_with(|| DebounceMarks::new(timeout));

        let mut issues = vec![];
        for stream in &stats.video.inbound {
            let track_identifier = &stream.track.track_identifier;
            let Some(prev_stream) = prev_streams.get(track_identifier.as_str()) else {
                continue;
            };
            if stream.packets_received <= prev_stream.packets_received {
                continue;
            }

            if stream.frames_decoded > prev_stream.frames_decoded {
                marks.clear(track_identifier);
                continue;
            }

            if marks.mark(track_identifier.clone(), now) {
                debug!(
                    "dead_video_track: track {} received packets without decoding for {:?}",
                    track_identifier, timeout
                );
                issues.push(
                    Issue::new(IssueType::Stream, IssueReason::DeadVideoTrack)
                        .with_ssrc(stream.ssrc)
                        .with_track_identifier(track_identifier)
                        .with_stats_sample(json!({
                            "packetsReceived": stream.packets_received,
                            "framesDecoded": stream.frames_decoded,
                            "deltaPacketsReceived": stream.packets_received - prev_stream.packets_received,
                            "deltaFramesDecoded": stream.frames_decoded as i64 - prev_stream.frames_decoded as i64,
                        })),
                );
            }
        }

        marks.retain(|track_identifier| {
            stats
                .video
                .inbound
                .iter()
                .any(|s| &s.track.track_identifier == track_identifier)
        });

        issues
    }
}

impl IssueDetector for DeadVideoTrackDetector {
    fn name(&self) -> &'static str {
        "dead_video_track"
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
        for connection_id in self.history.handle_timeout(now) {
            self.marks.remove(&connection_id);
        }
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.history.poll_timeout()
    }

    fn close(&mut self) {
        self.history.close();
        self.marks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_util::{CONNECTION_ID, connection, inbound_video};
    use crate::mark::MarkState;

    fn snapshot(packets_received: u64, frames_decoded: u32) -> ParsedStats {
        let mut stats = connection();
        let mut video = inbound_video(21);
        video.packets_received = packets_received;
        video.frames_decoded = frames_decoded;
        stats.video.inbound.push(video);
        stats
    }

    #[test]
    fn test_stuck_track_fires_after_timeout() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = DeadVideoTrackDetector::default();
        let at = |secs: u64| now + Duration::from_secs(secs);

        assert!(detector
            .detect(at(0), &snapshot(1000, 300), &scores)
            .unwrap()
            .is_empty());

        // packets arrive, nothing decoded: suspected but quiet
        assert!(detector
            .detect(at(5), &snapshot(1200, 300), &scores)
            .unwrap()
            .is_empty());
        assert_eq!(
            detector.marks[CONNECTION_ID].state(&"video-21".to_owned()),
            Some(MarkState::Suspected { since: at(5) })
        );

        assert!(detector
            .detect(at(10), &snapshot(1400, 300), &scores)
            .unwrap()
            .is_empty());

        let issues = detector.detect(at(15), &snapshot(1600, 300), &scores).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, IssueReason::DeadVideoTrack);
        assert_eq!(issues[0].track_identifier.as_deref(), Some("video-21"));

        // once per onset
        assert!(detector
            .detect(at(20), &snapshot(1800, 300), &scores)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_decoded_frames_reset() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = DeadVideoTrackDetector::default();
        let at = |secs: u64| now + Duration::from_secs(secs);

        detector.detect(at(0), &snapshot(1000, 300), &scores).unwrap();
        detector.detect(at(5), &snapshot(1200, 300), &scores).unwrap();
        detector.detect(at(10), &snapshot(1400, 330), &scores).unwrap();
        assert!(detector.marks[CONNECTION_ID].is_empty());

        // a new onset starts the timeout over
        assert!(detector
            .detect(at(15), &snapshot(1600, 330), &scores)
            .unwrap()
            .is_empty());
        assert!(detector
            .detect(at(20), &snapshot(1800, 330), &scores)
            .unwrap()
            .is_empty());
    }
}
