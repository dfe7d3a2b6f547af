//! Remote RTP stream statistics.
//!
//! These are derived from RTCP reports: remote inbound stats describe how the
//! remote peer receives what we send (RTCP RR), remote outbound stats
//! describe what the remote peer claims to have sent (RTCP SR).

use super::SSRC;
use serde::{Deserialize, Serialize};

/// The remote endpoint's view of a stream sent by the local endpoint.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedRemoteInboundStreamStats {
    pub id: String,
    pub ssrc: SSRC,
    /// Stats timestamp in milliseconds.
    pub timestamp: f64,
    pub kind: String,
    pub mime_type: String,
    pub codec_id: String,
    pub transport_id: String,
    /// The id of the matching local outbound stats.
    pub local_id: String,

    /// Cumulative packets lost as reported by the remote peer.
    pub packets_lost: i64,
    /// Fraction of packets lost since the previous report (0.0 to 1.0).
    pub fraction_lost: f64,
    /// Inter-arrival jitter in seconds.
    pub jitter: f64,

    /// Most recent round trip time in seconds.
    pub round_trip_time: f64,
    pub total_round_trip_time: f64,
    pub round_trip_time_measurements: u64,
}

/// The remote endpoint's view of a stream it sends to us.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedRemoteOutboundStreamStats {
    pub id: String,
    pub ssrc: SSRC,
    /// Stats timestamp in milliseconds.
    pub timestamp: f64,
    pub kind: String,
    pub mime_type: String,
    pub codec_id: String,
    pub transport_id: String,
    /// The id of the matching local inbound stats.
    pub local_id: String,

    pub packets_sent: u64,
    pub bytes_sent: u64,
    /// NTP timestamp of the sender report in milliseconds.
    pub remote_timestamp: f64,
    pub reports_sent: u64,
    pub total_round_trip_time: f64,
    pub round_trip_time_measurements: u64,
}
