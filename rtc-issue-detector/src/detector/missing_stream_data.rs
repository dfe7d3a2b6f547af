use super::IssueDetector;
use crate::error::Result;
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::mark::ThrottleMarks;
use crate::network_scores::NetworkScores;
use crate::stats::ParsedStats;
use crate::stats::inbound::InboundStreamStats;
use log::debug;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissingStreamDataDetectorConfig {
    pub history: StatsHistoryConfig,
    /// Number of consecutive snapshots, the current one included, over which
    /// `bytesReceived` must stay unchanged. At least 2 and at most
    /// `history.max_size + 1`.
    pub samples: usize,
    /// Minimum time between two reports of the same track.
    pub ttl: Duration,
}

impl Default for MissingStreamDataDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            samples: 3,
            ttl: Duration::from_secs(15),
        }
    }
}

impl MissingStreamDataDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(2);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MediaKind {
    Audio,
    Video,
}

type TrackKey = (MediaKind, String);

/// Reports live inbound tracks that stopped receiving data.
///
/// Audio and video tracks are judged independently. While a track stays
/// silent it is reported at most once per ttl.
pub struct MissingStreamDataDetector {
    config: MissingStreamDataDetectorConfig,
    history: StatsHistory,
    marks: HashMap<String, ThrottleMarks<TrackKey>>,
}

impl Default for MissingStreamDataDetector {
    fn default() -> Self {
        Self::new(MissingStreamDataDetectorConfig::default())
    }
}

impl MissingStreamDataDetector {
    pub fn new(config: MissingStreamDataDetectorConfig) -> Self {
        Self {
            config,
            history: StatsHistory::new(config.history),
            marks: HashMap::new(),
        }
    }

    fn process(&mut self, now: Instant, stats: &ParsedStats) -> Vec<Issue> {
        let connection_id = stats.connection_id();
        if self.history.is_empty(now, connection_id) {
            self.marks.remove(connection_id);
        }

        // the previous `samples - 1` snapshots, oldest first
        let retained: Vec<&ParsedStats> = self
            .history
            .all(now, connection_id)
            .map(|p| &p.stats)
            .collect();
        let needed = self.config.samples.saturating_sub(1).max(1);
        let previous = &retained[retained.len().saturating_sub(needed)..];
        let window_complete = previous.len() == needed;

        let ttl = self.config.ttl;
        let marks = self
            .marks
            .entry(connection_id.to_owned())
            .or_insert_with(|| ThrottleMarks::new(ttl));
        let mut visited = HashSet::new();

        let mut issues = detect_missing_data(
            now,
            &stats.audio.inbound,
            previous.iter().map(|p| p.audio.inbound.as_slice()),
            window_complete,
            (MediaKind::Audio, IssueReason::MissingAudioStreamData),
            marks,
            &mut visited,
        );
        issues.extend(detect_missing_data(
            now,
            &stats.video.inbound,
            previous.iter().map(|p| p.video.inbound.as_slice()),
            window_complete,
            (MediaKind::Video, IssueReason::MissingVideoStreamData),
            marks,
            &mut visited,
        ));

        marks.sweep(now, &visited);

        issues
    }
}

fn detect_missing_data<'a, S: InboundStreamStats + 'a>(
    now: Instant,
    streams: &[S],
    previous: impl Iterator<Item = &'a [S]> + Clone,
    window_complete: bool,
    (kind, reason): (MediaKind, IssueReason),
    marks: &mut ThrottleMarks<TrackKey>,
    visited: &mut HashSet<TrackKey>,
) -> Vec<Issue> {
    let mut issues = vec![];
    for stream in streams {
        let key = (kind, stream.track_identifier().to_owned());
        visited.insert(key.clone());

        let unchanged = window_complete
            && previous.clone().all(|prev_streams| {
                prev_streams.iter().any(|p| {
                    p.track_identifier() == stream.track_identifier()
                        && p.bytes_received() == stream.bytes_received()
                })
            });

        if !unchanged || stream.track_detached() || stream.track_ended() {
            marks.clear(&key);
            continue;
        }

        if marks.mark(key, now) {
            debug!(
                "missing_stream_data: track {} stuck at {} bytes",
                stream.track_identifier(),
                stream.bytes_received()
            );
            issues.push(
                Issue::new(IssueType::Stream, reason)
                    .with_ssrc(stream.ssrc())
                    .with_track_identifier(stream.track_identifier())
                    .with_stats_sample(json!({
                        "bytesReceived": stream.bytes_received(),
                        "trackDetached": stream.track_detached(),
                        "trackEnded": stream.track_ended(),
                    })),
            );
        }
    }
    issues
}

impl IssueDetector for MissingStreamDataDetector {
    fn name(&self) -> &'static str {
        "missing_stream_data"
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
    use crate::detector::test_util::{connection, inbound_audio, inbound_video};

    fn snapshot(audio_bytes: u64, video_bytes: u64, video_ended: bool) -> ParsedStats {
        let mut stats = connection();
        let mut audio = inbound_audio(1);
        audio.bytes_received = audio_bytes;
        stats.audio.inbound.push(audio);
        let mut video = inbound_video(2);
        video.bytes_received = video_bytes;
        video.track.ended = video_ended;
        stats.video.inbound.push(video);
        stats
    }

    #[test]
    fn test_fires_after_window_and_throttles() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = MissingStreamDataDetector::default();
        let at = |secs: u64| now + Duration::from_secs(secs);

        assert!(detector.detect(at(0), &snapshot(500, 0, false), &scores).unwrap().is_empty());
        assert!(detector.detect(at(2), &snapshot(900, 0, false), &scores).unwrap().is_empty());

        let issues = detector.detect(at(4), &snapshot(1300, 0, false), &scores).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, IssueReason::MissingVideoStreamData);
        assert_eq!(issues[0].track_identifier.as_deref(), Some("video-2"));

        // still missing within the ttl
        assert!(detector.detect(at(6), &snapshot(1700, 0, false), &scores).unwrap().is_empty());

        // reported again once the ttl elapsed
        let issues = detector.detect(at(20), &snapshot(2100, 0, false), &scores).unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_audio_and_video_independent() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = MissingStreamDataDetector::default();

        for secs in 0..2 {
            detector
                .detect(now + Duration::from_secs(secs), &snapshot(800, 800, false), &scores)
                .unwrap();
        }
        let issues = detector
            .detect(now + Duration::from_secs(2), &snapshot(800, 800, false), &scores)
            .unwrap();
        let reasons: Vec<IssueReason> = issues.iter().map(|i| i.reason).collect();
        assert_eq!(
            reasons,
            vec![
                IssueReason::MissingAudioStreamData,
                IssueReason::MissingVideoStreamData
            ]
        );
    }

    #[test]
    fn test_short_window_still_needs_previous_snapshot() {
        let now = Instant::now();
        let scores = NetworkScores::default();

        assert_eq!(MissingStreamDataDetectorConfig::default().with_samples(0).samples, 2);

        for samples in [0, 1] {
            let config = MissingStreamDataDetectorConfig {
                samples,
                ..Default::default()
            };
            let mut detector = MissingStreamDataDetector::new(config);

            assert!(detector.detect(now, &snapshot(0, 0, false), &scores).unwrap().is_empty());
            let issues = detector
                .detect(now + Duration::from_secs(2), &snapshot(0, 0, false), &scores)
                .unwrap();
            assert_eq!(issues.len(), 2, "samples={samples}");
        }
    }

    #[test]
    fn test_ended_track_is_ignored() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = MissingStreamDataDetector::default();

        for secs in 0..5 {
            let issues = detector
                .detect(now + Duration::from_secs(secs), &snapshot(secs * 100, 0, true), &scores)
                .unwrap();
            assert!(issues.is_empty());
        }
    }
}
