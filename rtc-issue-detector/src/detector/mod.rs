//! Issue detectors.
//!
//! Every detector is a small state machine fed with consecutive snapshots of
//! a connection. Most of them keep a [`StatsHistory`](crate::history::StatsHistory)
//! and follow the same three steps on each [`IssueDetector::detect`] call:
//!
//! 1. Evaluate the current snapshot against the retained history
//! 2. Append the current snapshot to the history
//! 3. Refresh the connection's idle deadline
//!
//! Without a previous snapshot there is nothing to compare against, so the
//! first snapshot of a connection never yields an issue.
//!
//! | Detector | Reasons |
//! |----------|---------|
//! | [`QualityLimitationsIssueDetector`] | `encoder-cpu-throttling`, `outbound-network-throughput` |
//! | [`InboundNetworkIssueDetector`] | `inbound-network-quality`, `server-issue`, `inbound-network-media-latency`, `network-media-sync-failure` |
//! | [`OutboundNetworkIssueDetector`] | `outbound-network-quality`, `outbound-network-media-latency` |
//! | [`NetworkMediaSyncIssueDetector`] | `network-media-sync-failure` |
//! | [`AvailableOutgoingBitrateIssueDetector`] | `outbound-network-throughput` |
//! | [`UnknownVideoDecoderImplementationDetector`] | `unknown-video-decoder` |
//! | [`VideoCodecMismatchDetector`] | `codec-mismatch` |
//! | [`FrozenVideoTrackDetector`] | `frozen-video-track` |
//! | [`VideoDecoderIssueDetector`] | `decoder-cpu-throttling` |
//! | [`MissingStreamDataDetector`] | `missing-audio-stream-data`, `missing-video-stream-data` |
//! | [`DeadVideoTrackDetector`] | `dead-video-track` |
//! | [`FramesDroppedIssueDetector`] | `decoder-cpu-throttling` |
//! | [`FramesEncodedSentIssueDetector`] | `outbound-network-throughput` |

use crate::error::Result;
use crate::issue::Issue;
use crate::network_scores::NetworkScores;
use crate::stats::ParsedStats;
use std::time::Instant;

mod available_outgoing_bitrate;
mod dead_video_track;
mod frames_dropped;
mod frames_encoded_sent;
mod frozen_video_track;
mod inbound_network;
mod missing_stream_data;
mod network_media_sync;
mod outbound_network;
mod quality_limitations;
mod unknown_video_decoder;
mod video_decoder;

pub use available_outgoing_bitrate::{
    AvailableOutgoingBitrateIssueDetector, AvailableOutgoingBitrateIssueDetectorConfig,
};
pub use dead_video_track::{DeadVideoTrackDetector, DeadVideoTrackDetectorConfig};
pub use frames_dropped::{FramesDroppedIssueDetector, FramesDroppedIssueDetectorConfig};
pub use frames_encoded_sent::{
    FramesEncodedSentIssueDetector, FramesEncodedSentIssueDetectorConfig,
};
pub use frozen_video_track::{FrozenVideoTrackDetector, FrozenVideoTrackDetectorConfig};
pub use inbound_network::{InboundNetworkIssueDetector, InboundNetworkIssueDetectorConfig};
pub use missing_stream_data::{MissingStreamDataDetector, MissingStreamDataDetectorConfig};
pub use network_media_sync::{NetworkMediaSyncIssueDetector, NetworkMediaSyncIssueDetectorConfig};
pub use outbound_network::{OutboundNetworkIssueDetector, OutboundNetworkIssueDetectorConfig};
pub use quality_limitations::{
    QualityLimitationsIssueDetector, QualityLimitationsIssueDetectorConfig,
};
pub use unknown_video_decoder::{
    UnknownVideoDecoderImplementationDetector, VideoCodecMismatchDetector,
};
pub use video_decoder::{
    DecoderVolatilityMetric, VideoDecoderIssueDetector, VideoDecoderIssueDetectorConfig,
};

/// A stateful evaluator of consecutive connection snapshots.
///
/// State is sharded by connection id and expired through the sans-I/O
/// `handle_timeout`/`poll_timeout` pair. Stateless detectors can rely on the
/// default no-op implementations.
pub trait IssueDetector: Send {
    /// A short stable name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Evaluates `stats` against what the detector has seen before on the
    /// same connection and returns the issues found.
    fn detect(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Result<Vec<Issue>>;

    /// Drops state of connections idle since before `now - ttl`.
    fn handle_timeout(&mut self, _now: Instant) {}

    /// Earliest instant at which some connection's state expires.
    fn poll_timeout(&self) -> Option<Instant> {
        None
    }

    /// Drops all state.
    fn close(&mut self) {}
}

/// The detector set used by
/// [`WebRTCIssueDetectorBuilder::with_default_detectors`](crate::WebRTCIssueDetectorBuilder::with_default_detectors),
/// in evaluation order.
pub fn default_detectors() -> Vec<Box<dyn IssueDetector>> {
    vec![
        Box::new(QualityLimitationsIssueDetector::default()),
        Box::new(InboundNetworkIssueDetector::default()),
        Box::new(OutboundNetworkIssueDetector::default()),
        Box::new(NetworkMediaSyncIssueDetector::default()),
        Box::new(AvailableOutgoingBitrateIssueDetector::default()),
        Box::new(UnknownVideoDecoderImplementationDetector::default()),
        Box::new(FrozenVideoTrackDetector::default()),
        Box::new(VideoDecoderIssueDetector::default()),
        Box::new(MissingStreamDataDetector::default()),
    ]
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::stats::inbound::{ParsedInboundAudioStreamStats, ParsedInboundVideoStreamStats};
    use crate::stats::outbound::ParsedOutboundVideoStreamStats;
    use crate::stats::{ParsedStats, SSRC};

    pub(crate) const CONNECTION_ID: &str = "pc-1";

    pub(crate) fn connection() -> ParsedStats {
        let mut stats = ParsedStats::default();
        stats.connection.id = CONNECTION_ID.to_owned();
        stats.connection.local.id = "local-candidate".to_owned();
        stats.connection.remote.id = "remote-candidate".to_owned();
        stats
    }

    pub(crate) fn inbound_video(ssrc: SSRC) -> ParsedInboundVideoStreamStats {
        let mut stream = ParsedInboundVideoStreamStats {
            ssrc,
            frame_width: 1280,
            frame_height: 720,
            decoder_implementation: "libvpx".to_owned(),
            mime_type: "video/VP8".to_owned(),
            ..Default::default()
        };
        stream.track.track_identifier = format!("video-{ssrc}");
        stream
    }

    pub(crate) fn inbound_audio(ssrc: SSRC) -> ParsedInboundAudioStreamStats {
        let mut stream = ParsedInboundAudioStreamStats {
            ssrc,
            mime_type: "audio/opus".to_owned(),
            ..Default::default()
        };
        stream.track.track_identifier = format!("audio-{ssrc}");
        stream
    }

    pub(crate) fn outbound_video(ssrc: SSRC) -> ParsedOutboundVideoStreamStats {
        ParsedOutboundVideoStreamStats {
            ssrc,
            mime_type: "video/VP8".to_owned(),
            ..Default::default()
        }
    }
}
