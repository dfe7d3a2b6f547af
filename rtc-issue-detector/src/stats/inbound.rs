//! Inbound RTP stream statistics.
//!
//! This module contains the parsed inbound audio and video stream types and
//! the [`InboundStreamStats`] trait, which exposes the counters both media
//! kinds share so that network and liveness checks can treat them uniformly.

use super::SSRC;
use serde::{Deserialize, Serialize};

/// Counters shared by inbound audio and video streams.
pub trait InboundStreamStats {
    fn ssrc(&self) -> SSRC;
    /// Stats timestamp in milliseconds.
    fn timestamp(&self) -> f64;
    fn bytes_received(&self) -> u64;
    fn packets_received(&self) -> u64;
    fn packets_lost(&self) -> i64;
    /// Inter-arrival jitter in seconds.
    fn jitter(&self) -> f64;
    /// Cumulative jitter buffer delay in seconds.
    fn jitter_buffer_delay(&self) -> f64;
    fn jitter_buffer_emitted_count(&self) -> u64;
    fn track_identifier(&self) -> &str;
    fn track_detached(&self) -> bool;
    fn track_ended(&self) -> bool;
}

/// Track level counters of a received audio track.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundAudioTrackStats {
    pub id: String,
    pub track_identifier: String,
    pub detached: bool,
    pub ended: bool,
    pub remote_source: bool,
    pub audio_level: f64,
    pub total_samples_received: u64,
    pub concealed_samples: u64,
    pub silent_concealed_samples: u64,
    pub concealment_events: u64,
    /// Samples inserted to slow down playout.
    pub inserted_samples_for_deceleration: u64,
    /// Samples removed to speed up playout.
    pub removed_samples_for_acceleration: u64,
    pub jitter_buffer_delay: f64,
    pub jitter_buffer_emitted_count: u64,
}

/// Statistics for a locally received audio stream.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedInboundAudioStreamStats {
    pub id: String,
    pub ssrc: SSRC,
    /// Stats timestamp in milliseconds.
    pub timestamp: f64,
    pub mime_type: String,
    pub codec_id: String,
    pub transport_id: String,

    pub bytes_received: u64,
    pub header_bytes_received: u64,
    pub packets_received: u64,
    pub packets_lost: i64,
    pub packets_discarded: u64,

    /// Inter-arrival jitter in seconds.
    pub jitter: f64,
    /// Cumulative jitter buffer delay in seconds.
    pub jitter_buffer_delay: f64,
    pub jitter_buffer_emitted_count: u64,

    pub audio_level: f64,
    pub total_samples_received: u64,
    pub concealed_samples: u64,
    pub concealment_events: u64,
    pub inserted_samples_for_deceleration: u64,
    pub removed_samples_for_acceleration: u64,

    /// Receive bitrate in bits per second, derived by the stats parser.
    pub bitrate: f64,

    pub track: InboundAudioTrackStats,
}

impl ParsedInboundAudioStreamStats {
    /// Samples the jitter buffer corrected (inserted plus removed).
    pub fn corrected_samples(&self) -> u64 {
        self.track.inserted_samples_for_deceleration + self.track.removed_samples_for_acceleration
    }
}

impl InboundStreamStats for ParsedInboundAudioStreamStats {
    fn ssrc(&self) -> SSRC {
        self.ssrc
    }
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
    fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
    fn packets_received(&self) -> u64 {
        self.packets_received
    }
    fn packets_lost(&self) -> i64 {
        self.packets_lost
    }
    fn jitter(&self) -> f64 {
        self.jitter
    }
    fn jitter_buffer_delay(&self) -> f64 {
        self.jitter_buffer_delay
    }
    fn jitter_buffer_emitted_count(&self) -> u64 {
        self.jitter_buffer_emitted_count
    }
    fn track_identifier(&self) -> &str {
        &self.track.track_identifier
    }
    fn track_detached(&self) -> bool {
        self.track.detached
    }
    fn track_ended(&self) -> bool {
        self.track.ended
    }
}

/// Track level counters of a received video track.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundVideoTrackStats {
    pub id: String,
    pub track_identifier: String,
    pub detached: bool,
    pub ended: bool,
    pub remote_source: bool,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frames_received: u32,
    pub frames_decoded: u32,
    pub frames_dropped: u32,
}

/// Statistics for a locally received video stream.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedInboundVideoStreamStats {
    pub id: String,
    pub ssrc: SSRC,
    /// Stats timestamp in milliseconds.
    pub timestamp: f64,
    pub mime_type: String,
    pub codec_id: String,
    pub transport_id: String,

    /// Name of the decoder implementation, `"unknown"` when the browser
    /// could not instantiate a decoder for the negotiated codec.
    pub decoder_implementation: String,

    pub bytes_received: u64,
    pub header_bytes_received: u64,
    pub packets_received: u64,
    pub packets_lost: i64,

    /// Inter-arrival jitter in seconds.
    pub jitter: f64,
    /// Cumulative jitter buffer delay in seconds.
    pub jitter_buffer_delay: f64,
    pub jitter_buffer_emitted_count: u64,

    pub frames_received: u32,
    pub frames_decoded: u32,
    pub key_frames_decoded: u32,
    pub frames_dropped: u32,
    pub frames_per_second: f64,
    pub frame_width: u32,
    pub frame_height: u32,

    /// Total time spent decoding frames in seconds.
    pub total_decode_time: f64,
    pub total_inter_frame_delay: f64,
    pub total_squared_inter_frame_delay: f64,

    /// Number of video freezes detected by the receiver.
    pub freeze_count: u32,
    /// Total duration of freezes in seconds.
    pub total_freezes_duration: f64,
    pub pause_count: u32,
    pub total_pauses_duration: f64,

    pub nack_count: u32,
    pub fir_count: u32,
    pub pli_count: u32,

    /// Receive bitrate in bits per second, derived by the stats parser.
    pub bitrate: f64,

    pub track: InboundVideoTrackStats,
}

impl InboundStreamStats for ParsedInboundVideoStreamStats {
    fn ssrc(&self) -> SSRC {
        self.ssrc
    }
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
    fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
    fn packets_received(&self) -> u64 {
        self.packets_received
    }
    fn packets_lost(&self) -> i64 {
        self.packets_lost
    }
    fn jitter(&self) -> f64 {
        self.jitter
    }
    fn jitter_buffer_delay(&self) -> f64 {
        self.jitter_buffer_delay
    }
    fn jitter_buffer_emitted_count(&self) -> u64 {
        self.jitter_buffer_emitted_count
    }
    fn track_identifier(&self) -> &str {
        &self.track.track_identifier
    }
    fn track_detached(&self) -> bool {
        self.track.detached
    }
    fn track_ended(&self) -> bool {
        self.track.ended
    }
}
