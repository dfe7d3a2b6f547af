//! Parsed WebRTC statistics.
//!
//! This module contains the per-connection snapshot consumed by the
//! [`NetworkScoresCalculator`](crate::network_scores::NetworkScoresCalculator)
//! and every [`IssueDetector`](crate::detector::IssueDetector):
//!
//! - [`ParsedStats`] - One poll of a peer connection
//! - [`inbound`] - Locally received audio/video streams
//! - [`outbound`] - Locally sent audio/video streams
//! - [`remote`] - The remote endpoint's view of the same streams (RTCP RR/SR)
//!
//! All counters are cumulative since the connection started. Consumers diff
//! two snapshots of the same connection to obtain rates; absolute values are
//! only meaningful for liveness checks.
//!
//! Container fields default to empty on deserialization, so a detector never
//! has to distinguish a missing list from an empty one.

use serde::{Deserialize, Serialize};
use std::time::Instant;

pub mod inbound;
pub mod outbound;
pub mod remote;

use inbound::{ParsedInboundAudioStreamStats, ParsedInboundVideoStreamStats};
use outbound::{ParsedOutboundAudioStreamStats, ParsedOutboundVideoStreamStats};
use remote::{ParsedRemoteInboundStreamStats, ParsedRemoteOutboundStreamStats};

/// Synchronization source identifier of an RTP stream.
#[allow(clippy::upper_case_acronyms)]
pub type SSRC = u32;

/// The reason for quality limitation in video encoding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCQualityLimitationReason {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "bandwidth")]
    Bandwidth,
    #[serde(rename = "other")]
    Other,
}

/// ICE candidate referenced by the selected candidate pair.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IceCandidateConnectionStats {
    /// The candidate stats id.
    pub id: String,
    pub address: String,
    pub port: u16,
    /// "host", "srflx", "prflx" or "relay".
    pub candidate_type: String,
    /// "udp" or "tcp".
    pub protocol: String,
    pub network_type: Option<String>,
    pub is_remote: bool,
}

/// Transport level statistics of the selected candidate pair.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedConnectionStats {
    /// Identifier of the peer connection; every history and mark map is
    /// sharded by this value.
    pub id: String,

    pub transport_id: String,

    /// Latest STUN round trip time in seconds.
    ///
    /// `None` until the first connectivity check response arrives.
    pub current_round_trip_time: Option<f64>,

    /// Cumulative round trip time in seconds.
    pub total_round_trip_time: f64,

    /// Congestion controller estimate in bits per second.
    ///
    /// `None` while the estimate is not measured yet.
    pub available_outgoing_bitrate: Option<f64>,

    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,

    /// Candidate pair state, e.g. "succeeded".
    pub state: String,

    pub local: IceCandidateConnectionStats,
    pub remote: IceCandidateConnectionStats,
}

/// Local audio streams of a connection.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioStats {
    pub inbound: Vec<ParsedInboundAudioStreamStats>,
    pub outbound: Vec<ParsedOutboundAudioStreamStats>,
}

/// Local video streams of a connection.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoStats {
    pub inbound: Vec<ParsedInboundVideoStreamStats>,
    pub outbound: Vec<ParsedOutboundVideoStreamStats>,
}

/// Remote streams of one media kind.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteMediaStats {
    /// What the remote peer reports about the streams we send.
    pub inbound: Vec<ParsedRemoteInboundStreamStats>,
    /// What the remote peer reports about the streams it sends.
    pub outbound: Vec<ParsedRemoteOutboundStreamStats>,
}

/// Remote audio and video streams of a connection.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteParsedStats {
    pub audio: RemoteMediaStats,
    pub video: RemoteMediaStats,
}

/// One poll of a peer connection's statistics.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedStats {
    pub connection: ParsedConnectionStats,
    pub audio: AudioStats,
    pub video: VideoStats,
    pub remote: RemoteParsedStats,
}

impl ParsedStats {
    /// Returns the id of the connection this snapshot belongs to.
    pub fn connection_id(&self) -> &str {
        &self.connection.id
    }

    /// Remote inbound streams of both media kinds, audio first.
    pub fn remote_inbound(&self) -> impl Iterator<Item = &ParsedRemoteInboundStreamStats> {
        self.remote
            .audio
            .inbound
            .iter()
            .chain(self.remote.video.inbound.iter())
    }

    /// Finds the inbound video stream with the given SSRC.
    pub fn inbound_video(&self, ssrc: SSRC) -> Option<&ParsedInboundVideoStreamStats> {
        self.video.inbound.iter().find(|s| s.ssrc == ssrc)
    }

    /// Finds the outbound video stream with the given SSRC.
    pub fn outbound_video(&self, ssrc: SSRC) -> Option<&ParsedOutboundVideoStreamStats> {
        self.video.outbound.iter().find(|s| s.ssrc == ssrc)
    }

    /// Finds the inbound audio stream with the given SSRC.
    pub fn inbound_audio(&self, ssrc: SSRC) -> Option<&ParsedInboundAudioStreamStats> {
        self.audio.inbound.iter().find(|s| s.ssrc == ssrc)
    }

    /// Finds the remote inbound stream with the given SSRC.
    pub fn remote_inbound_stream(&self, ssrc: SSRC) -> Option<&ParsedRemoteInboundStreamStats> {
        self.remote_inbound().find(|s| s.ssrc == ssrc)
    }
}

/// A stats snapshot tagged with the local time it was collected at.
///
/// `now` drives every debounce window and idle expiry, which keeps the
/// detectors deterministic under test.
#[derive(Debug, Clone)]
pub struct TaggedStats {
    pub now: Instant,
    pub stats: ParsedStats,
}

/// Per-second rate of a cumulative counter between two timestamped values.
///
/// Timestamps are in milliseconds and are truncated to whole milliseconds
/// before diffing. Returns 0 when no time elapsed.
pub fn calc_value_rate(value: f64, timestamp: f64, prev_value: f64, prev_timestamp: f64) -> f64 {
    let time_diff_ms = timestamp.floor() - prev_timestamp.floor();
    if time_diff_ms == 0.0 || !time_diff_ms.is_finite() {
        return 0.0;
    }

    (value - prev_value) / time_diff_ms * 1000.0
}

/// Bits per second from two cumulative byte counters.
pub fn calc_bitrate(bytes: u64, timestamp: f64, prev_bytes: u64, prev_timestamp: f64) -> f64 {
    8.0 * calc_value_rate(bytes as f64, timestamp, prev_bytes as f64, prev_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults_missing_containers() {
        let stats: ParsedStats = serde_json::from_str(r#"{"connection":{"id":"pc-1"}}"#).unwrap();

        assert_eq!(stats.connection_id(), "pc-1");
        assert!(stats.audio.inbound.is_empty());
        assert!(stats.video.outbound.is_empty());
        assert!(stats.remote.audio.inbound.is_empty());
        assert_eq!(stats.connection.available_outgoing_bitrate, None);
        assert_eq!(stats.connection.current_round_trip_time, None);
    }

    #[test]
    fn test_deserialize_camel_case_fields() {
        let stats: ParsedStats = serde_json::from_str(
            r#"{
                "connection": {
                    "id": "pc-1",
                    "currentRoundTripTime": 0.12,
                    "availableOutgoingBitrate": 250000,
                    "packetsSent": 10,
                    "local": {"id": "local-1", "candidateType": "host"}
                },
                "video": {
                    "outbound": [{"ssrc": 7, "qualityLimitationReason": "cpu", "framesSent": 3}]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(stats.connection.current_round_trip_time, Some(0.12));
        assert_eq!(stats.connection.available_outgoing_bitrate, Some(250000.0));
        assert_eq!(stats.connection.local.candidate_type, "host");
        let outbound = stats.outbound_video(7).unwrap();
        assert_eq!(
            outbound.quality_limitation_reason,
            RTCQualityLimitationReason::Cpu
        );
        assert_eq!(outbound.frames_sent, 3);
    }

    #[test]
    fn test_calc_value_rate() {
        assert_eq!(calc_value_rate(2000.0, 2000.0, 1000.0, 1000.0), 1000.0);
        assert_eq!(calc_value_rate(2000.0, 1000.9, 1000.0, 1000.2), 0.0);
        assert_eq!(calc_bitrate(2000, 2000.0, 1000, 1000.0), 8000.0);
    }
}
