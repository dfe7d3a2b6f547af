use super::IssueDetector;
use crate::error::Result;
use crate::helpers::{DTX_STD_DEV_THRESHOLD_MS, is_dtx_like_behavior, is_svc_spatial_layer_changed};
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::mark::EdgeLatch;
use crate::network_scores::{MOS_BAD, NetworkScores};
use crate::stats::{ParsedStats, SSRC};
use log::{debug, trace};
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrozenVideoTrackDetectorConfig {
    pub history: StatsHistoryConfig,
    /// Inbound MOS at or below which detection is suppressed.
    pub mos_bad: f64,
    /// Share of wall clock time spent frozen, in percent, above which a
    /// track is frozen.
    pub frozen_duration_pct_threshold: f64,
    /// Average freeze length in milliseconds above which a track is frozen.
    pub avg_freeze_duration_ms_threshold: f64,
    pub dtx_std_dev_threshold_ms: f64,
}

impl Default for FrozenVideoTrackDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            mos_bad: MOS_BAD,
            frozen_duration_pct_threshold: 30.0,
            avg_freeze_duration_ms_threshold: 1000.0,
            dtx_std_dev_threshold_ms: DTX_STD_DEV_THRESHOLD_MS,
        }
    }
}

impl FrozenVideoTrackDetectorConfig {
    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_mos_bad(mut self, mos: f64) -> Self {
        self.mos_bad = mos;
        self
    }

    pub fn with_frozen_duration_pct_threshold(mut self, pct: f64) -> Self {
        self.frozen_duration_pct_threshold = pct;
        self
    }

    pub fn with_avg_freeze_duration_ms_threshold(mut self, ms: f64) -> Self {
        self.avg_freeze_duration_ms_threshold = ms;
        self
    }

    pub fn with_dtx_std_dev_threshold_ms(mut self, ms: f64) -> Self {
        self.dtx_std_dev_threshold_ms = ms;
        self
    }
}

/// Reports inbound video tracks that spend too much time frozen.
///
/// Evaluation is suppressed while the inbound network is bad, and for
/// streams that just switched spatial layer or behave like DTX, since both
/// produce freezes that are not a rendering problem. An onset is reported
/// once per stream; it re-arms after a non-frozen evaluation.
pub struct FrozenVideoTrackDetector {
    config: FrozenVideoTrackDetectorConfig,
    history: StatsHistory,
    frozen: HashMap<String, EdgeLatch<SSRC>>,
}

impl Default for FrozenVideoTrackDetector {
    fn default() -> Self {
        Self::new(FrozenVideoTrackDetectorConfig::default())
    }
}

impl FrozenVideoTrackDetector {
    pub fn new(config: FrozenVideoTrackDetectorConfig) -> Self {
        Self {
            config,
            history: StatsHistory::new(config.history),
            frozen: HashMap::new(),
        }
    }

    fn process(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Vec<Issue> {
        let connection_id = stats.connection_id();

        if network_scores
            .inbound
            .is_some_and(|mos| mos <= self.config.mos_bad)
        {
            trace!("{}: bad inbound network on {}", self.name(), connection_id);
            return vec![];
        }

        let Some(prev) = self.history.latest(now, connection_id) else {
            self.frozen.remove(connection_id);
            return vec![];
        };

        let window: Vec<&ParsedStats> = self
            .history
            .all(now, connection_id)
            .map(|p| &p.stats)
            .chain(std::iter::once(stats))
            .collect();

        let latch = self.frozen.entry(connection_id.to_owned()).or_default();
        let mut issues = vec![];
        for stream in &stats.video.inbound {
            let Some(prev_stream) = prev.stats.inbound_video(stream.ssrc) else {
                continue;
            };

            if is_svc_spatial_layer_changed(stream.ssrc, &window)
                || is_dtx_like_behavior(stream.ssrc, &window, self.config.dtx_std_dev_threshold_ms)
            {
                trace!(
                    "frozen_video_track: ssrc {} switched layer or in DTX",
                    stream.ssrc
                );
                continue;
            }

            let delta_freeze_count = stream.freeze_count as i64 - prev_stream.freeze_count as i64;
            let delta_freeze_duration_ms =
                (stream.total_freezes_duration - prev_stream.total_freezes_duration) * 1000.0;
            let delta_wall_clock_ms = stream.timestamp - prev_stream.timestamp;

            let avg_freeze_duration_ms = if delta_freeze_count > 0 {
                delta_freeze_duration_ms / delta_freeze_count as f64
            } else {
                0.0
            };
            let frozen_duration_pct = if delta_wall_clock_ms > 0.0 {
                delta_freeze_duration_ms / delta_wall_clock_ms * 100.0
            } else {
                0.0
            };

            let is_frozen = frozen_duration_pct > self.config.frozen_duration_pct_threshold
                || avg_freeze_duration_ms > self.config.avg_freeze_duration_ms_threshold;

            if latch.update(stream.ssrc, is_frozen) {
                debug!(
                    "frozen_video_track: ssrc {} frozen {:.0}% of the time, avg freeze {:.0}ms",
                    stream.ssrc, frozen_duration_pct, avg_freeze_duration_ms
                );
                issues.push(
                    Issue::new(IssueType::Stream, IssueReason::FrozenVideoTrack)
                        .with_ssrc(stream.ssrc)
                        .with_track_identifier(&stream.track.track_identifier)
                        .with_stats_sample(json!({
                            "framesPerSecond": stream.frames_per_second,
                            "freezeCount": stream.freeze_count,
                            "totalFreezesDuration": stream.total_freezes_duration,
                            "deltaFreezeCount": delta_freeze_count,
                            "deltaFreezeDurationMs": delta_freeze_duration_ms,
                            "avgFreezeDurationMs": avg_freeze_duration_ms,
                            "frozenDurationPct": frozen_duration_pct,
                        })),
                );
            }
        }
        latch.retain(|ssrc| stats.inbound_video(*ssrc).is_some());

        if !issues.is_empty() {
            self.history.clear(connection_id);
        }

        issues
    }
}

impl IssueDetector for FrozenVideoTrackDetector {
    fn name(&self) -> &'static str {
        "frozen_video_track"
    }

    fn detect(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Result<Vec<Issue>> {
        let issues = self.process(now, stats, network_scores);
        self.history.push(now, stats, network_scores);
        Ok(issues)
    }

    fn handle_timeout(&mut self, now: Instant) {
        for connection_id in self.history.handle_timeout(now) {
            self.frozen.remove(&connection_id);
        }
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.history.poll_timeout()
    }

    fn close(&mut self) {
        self.history.close();
        self.frozen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_util::{connection, inbound_video};
    use std::time::Duration;

    fn snapshot(
        timestamp: f64,
        frames_decoded: u32,
        freeze_count: u32,
        total_freezes_duration: f64,
        width: u32,
    ) -> ParsedStats {
        let mut stats = connection();
        let mut video = inbound_video(1);
        video.timestamp = timestamp;
        video.frames_decoded = frames_decoded;
        video.freeze_count = freeze_count;
        video.total_freezes_duration = total_freezes_duration;
        video.frame_width = width;
        stats.video.inbound.push(video);
        stats
    }

    #[test]
    fn test_frozen_once_per_onset() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = FrozenVideoTrackDetector::default();
        let at = |secs: u64| now + Duration::from_secs(secs);

        assert!(detector
            .detect(at(0), &snapshot(0.0, 0, 0, 0.0, 1280), &scores)
            .unwrap()
            .is_empty());
        // 1 freeze of 1.5s during 2s
        let issues = detector
            .detect(at(2), &snapshot(2000.0, 60, 1, 1.5, 1280), &scores)
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, IssueReason::FrozenVideoTrack);
        assert_eq!(issues[0].track_identifier.as_deref(), Some("video-1"));

        // still frozen, latched
        assert!(detector
            .detect(at(4), &snapshot(4000.0, 120, 2, 3.0, 1280), &scores)
            .unwrap()
            .is_empty());
        // recovered
        assert!(detector
            .detect(at(6), &snapshot(6000.0, 180, 2, 3.0, 1280), &scores)
            .unwrap()
            .is_empty());
        // frozen again
        assert_eq!(
            detector
                .detect(at(8), &snapshot(8000.0, 240, 3, 4.5, 1280), &scores)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_resolution_change_never_fires() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = FrozenVideoTrackDetector::default();

        detector
            .detect(now, &snapshot(0.0, 0, 0, 0.0, 1280), &scores)
            .unwrap();
        let issues = detector
            .detect(
                now + Duration::from_secs(2),
                &snapshot(2000.0, 60, 1, 1.5, 640),
                &scores,
            )
            .unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_dtx_stream_never_fires() {
        let now = Instant::now();
        let scores = NetworkScores::default();
        let mut detector = FrozenVideoTrackDetector::default();
        let at = |secs: u64| now + Duration::from_secs(secs);

        detector
            .detect(at(0), &snapshot(0.0, 0, 0, 0.0, 1280), &scores)
            .unwrap();
        detector
            .detect(at(1), &snapshot(1000.0, 30, 0, 0.0, 1280), &scores)
            .unwrap();
        // 5 frames in the last second, frame intervals 33ms then 200ms
        let issues = detector
            .detect(at(2), &snapshot(2000.0, 35, 1, 1.5, 1280), &scores)
            .unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_suppressed_on_bad_network() {
        let now = Instant::now();
        let bad = NetworkScores {
            inbound: Some(1.5),
            ..Default::default()
        };
        let mut detector = FrozenVideoTrackDetector::default();

        detector
            .detect(now, &snapshot(0.0, 0, 0, 0.0, 1280), &bad)
            .unwrap();
        let issues = detector
            .detect(
                now + Duration::from_secs(2),
                &snapshot(2000.0, 60, 1, 1.5, 1280),
                &bad,
            )
            .unwrap();
        assert!(issues.is_empty());
    }
}
