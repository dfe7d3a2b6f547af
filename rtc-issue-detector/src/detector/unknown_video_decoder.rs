use super::IssueDetector;
use crate::error::Result;
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::mark::EdgeLatch;
use crate::network_scores::NetworkScores;
use crate::stats::{ParsedStats, SSRC};
use log::debug;
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;

/// Value reported as `decoderImplementation` when no decoder could be
/// created for the negotiated codec.
pub(crate) const UNKNOWN_DECODER: &str = "unknown";

/// Tracks inbound video streams whose decoder implementation is unknown and
/// reports each onset once.
///
/// The first snapshot of a stream is skipped since browsers report
/// `"unknown"` until the first frame is decoded.
struct UnknownDecoderTracker {
    name: &'static str,
    reason: IssueReason,
    history: StatsHistory,
    latches: HashMap<String, EdgeLatch<SSRC>>,
}

impl UnknownDecoderTracker {
    fn new(name: &'static str, reason: IssueReason, config: StatsHistoryConfig) -> Self {
        Self {
            name,
            reason,
            history: StatsHistory::new(config),
            latches: HashMap::new(),
        }
    }

    fn process(&mut self, now: Instant, stats: &ParsedStats) -> Vec<Issue> {
        let connection_id = stats.connection_id();
        let Some(prev) = self.history.latest(now, connection_id) else {
            self.latches.remove(connection_id);
            return vec![];
        };

        let latch = self.latches.entry(connection_id.to_owned()).or_default();
        let mut issues = vec![];
        for stream in &stats.video.inbound {
            if prev.stats.inbound_video(stream.ssrc).is_none() {
                continue;
            }

            let is_unknown = stream.decoder_implementation == UNKNOWN_DECODER;
            if latch.update(stream.ssrc, is_unknown) {
                debug!(
                    "{}: ssrc {} has no decoder for {}",
                    self.name, stream.ssrc, stream.mime_type
                );
                issues.push(
                    Issue::new(IssueType::Stream, self.reason)
                        .with_ssrc(stream.ssrc)
                        .with_track_identifier(&stream.track.track_identifier)
                        .with_stats_sample(json!({
                            "mimeType": stream.mime_type,
                            "decoderImplementation": stream.decoder_implementation,
                        })),
                );
            }
        }

        issues
    }

    fn detect(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Vec<Issue> {
        let issues = self.process(now, stats);
        self.history.push(now, stats, network_scores);
        issues
    }

    fn handle_timeout(&mut self, now: Instant) {
        for connection_id in self.history.handle_timeout(now) {
            self.latches.remove(&connection_id);
        }
    }

    fn close(&mut self) {
        self.history.close();
        self.latches.clear();
    }
}

/// Reports inbound video streams the browser has no decoder for as
/// `unknown-video-decoder`.
pub struct UnknownVideoDecoderImplementationDetector {
    tracker: UnknownDecoderTracker,
}

impl Default for UnknownVideoDecoderImplementationDetector {
    fn default() -> Self {
        Self::new(StatsHistoryConfig::default())
    }
}

impl UnknownVideoDecoderImplementationDetector {
    pub fn new(history: StatsHistoryConfig) -> Self {
        Self {
            tracker: UnknownDecoderTracker::new(
                "unknown_video_decoder",
                IssueReason::UnknownVideoDecoder,
                history,
            ),
        }
    }
}

impl IssueDetector for UnknownVideoDecoderImplementationDetector {
    fn name(&self) -> &'static str {
        self.tracker.name
    }

    fn detect(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Result<Vec<Issue>> {
        Ok(self.tracker.detect(now, stats, network_scores))
    }

    fn handle_timeout(&mut self, now: Instant) {
        self.tracker.handle_timeout(now);
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.tracker.history.poll_timeout()
    }

    fn close(&mut self) {
        self.tracker.close();
    }
}

/// Same condition as [`UnknownVideoDecoderImplementationDetector`], reported
/// as `codec-mismatch` for consumers that treat it as a negotiation problem.
pub struct VideoCodecMismatchDetector {
    tracker: UnknownDecoderTracker,
}

impl Default for VideoCodecMismatchDetector {
    fn default() -> Self {
        Self::new(StatsHistoryConfig::default())
    }
}

impl VideoCodecMismatchDetector {
    pub fn new(history: StatsHistoryConfig) -> Self {
        Self {
            tracker: UnknownDecoderTracker::new(
                "video_codec_mismatch",
                IssueReason::VideoCodecMismatch,
                history,
            ),
        }
    }
}

impl IssueDetector for VideoCodecMismatchDetector {
    fn name(&self) -> &'static str {
        self.tracker.name
    }

    fn detect(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Result<Vec<Issue>> {
        Ok(self.tracker.detect(now, stats, network_scores))
    }

    fn handle_timeout(&mut self, now: Instant) {
        self.tracker.handle_timeout(now);
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.tracker.history.poll_timeout()
    }

    fn close(&mut self) {
        self.tracker.close();
    }
}
