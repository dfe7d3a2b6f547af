//! Outbound RTP stream statistics.

use super::{RTCQualityLimitationReason, SSRC};
use serde::{Deserialize, Serialize};

/// Track level info of a locally sent track.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutboundTrackStats {
    pub id: String,
    pub track_identifier: String,
    pub kind: String,
    pub width: u32,
    pub height: u32,
    pub frames_per_second: f64,
}

/// Statistics for a locally sent audio stream.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedOutboundAudioStreamStats {
    pub id: String,
    pub ssrc: SSRC,
    /// Stats timestamp in milliseconds.
    pub timestamp: f64,
    pub mime_type: String,
    pub codec_id: String,
    pub transport_id: String,

    pub bytes_sent: u64,
    pub header_bytes_sent: u64,
    pub packets_sent: u64,
    pub retransmitted_packets_sent: u64,
    pub nack_count: u32,

    /// Encoder target bitrate in bits per second.
    pub target_bitrate: f64,
    /// Send bitrate in bits per second, derived by the stats parser.
    pub bitrate: f64,

    pub track: OutboundTrackStats,
}

/// Statistics for a locally sent video stream.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedOutboundVideoStreamStats {
    pub id: String,
    pub ssrc: SSRC,
    /// Stats timestamp in milliseconds.
    pub timestamp: f64,
    pub mime_type: String,
    pub codec_id: String,
    pub transport_id: String,
    /// RTP stream id for simulcast layers.
    pub rid: String,

    pub encoder_implementation: String,

    pub bytes_sent: u64,
    pub header_bytes_sent: u64,
    pub packets_sent: u64,
    pub retransmitted_packets_sent: u64,

    /// Encoder target bitrate in bits per second.
    pub target_bitrate: f64,
    /// Send bitrate in bits per second, derived by the stats parser.
    pub bitrate: f64,

    pub frames_encoded: u32,
    pub key_frames_encoded: u32,
    pub frames_sent: u32,
    pub huge_frames_sent: u32,
    pub frames_per_second: f64,
    pub frame_width: u32,
    pub frame_height: u32,

    /// Total time spent encoding frames in seconds.
    pub total_encode_time: f64,
    pub total_packet_send_delay: f64,
    pub qp_sum: u64,

    /// The current quality limitation reason.
    pub quality_limitation_reason: RTCQualityLimitationReason,
    pub quality_limitation_resolution_changes: u32,

    pub nack_count: u32,
    pub fir_count: u32,
    pub pli_count: u32,

    pub track: OutboundTrackStats,
}
