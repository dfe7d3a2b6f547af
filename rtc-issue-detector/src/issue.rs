//! Issue records emitted by the detectors.

use crate::stats::SSRC;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad category of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    #[serde(rename = "network")]
    Network,
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "server")]
    Server,
    #[serde(rename = "stream")]
    Stream,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            IssueType::Network => "network",
            IssueType::Cpu => "cpu",
            IssueType::Server => "server",
            IssueType::Stream => "stream",
        };
        write!(f, "{s}")
    }
}

/// The specific diagnosis behind an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueReason {
    #[serde(rename = "outbound-network-quality")]
    OutboundNetworkQuality,
    #[serde(rename = "inbound-network-quality")]
    InboundNetworkQuality,
    #[serde(rename = "outbound-network-media-latency")]
    OutboundNetworkMediaLatency,
    #[serde(rename = "inbound-network-media-latency")]
    InboundNetworkMediaLatency,
    #[serde(rename = "network-media-sync-failure")]
    NetworkMediaSyncFailure,
    #[serde(rename = "outbound-network-throughput")]
    OutboundNetworkThroughput,
    #[serde(rename = "encoder-cpu-throttling")]
    EncoderCpuThrottling,
    #[serde(rename = "decoder-cpu-throttling")]
    DecoderCpuThrottling,
    #[serde(rename = "server-issue")]
    ServerIssue,
    #[serde(rename = "unknown-video-decoder")]
    UnknownVideoDecoder,
    #[serde(rename = "codec-mismatch")]
    VideoCodecMismatch,
    #[serde(rename = "frozen-video-track")]
    FrozenVideoTrack,
    #[serde(rename = "dead-video-track")]
    DeadVideoTrack,
    #[serde(rename = "missing-audio-stream-data")]
    MissingAudioStreamData,
    #[serde(rename = "missing-video-stream-data")]
    MissingVideoStreamData,
}

impl fmt::Display for IssueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            IssueReason::OutboundNetworkQuality => "outbound-network-quality",
            IssueReason::InboundNetworkQuality => "inbound-network-quality",
            IssueReason::OutboundNetworkMediaLatency => "outbound-network-media-latency",
            IssueReason::InboundNetworkMediaLatency => "inbound-network-media-latency",
            IssueReason::NetworkMediaSyncFailure => "network-media-sync-failure",
            IssueReason::OutboundNetworkThroughput => "outbound-network-throughput",
            IssueReason::EncoderCpuThrottling => "encoder-cpu-throttling",
            IssueReason::DecoderCpuThrottling => "decoder-cpu-throttling",
            IssueReason::ServerIssue => "server-issue",
            IssueReason::UnknownVideoDecoder => "unknown-video-decoder",
            IssueReason::VideoCodecMismatch => "codec-mismatch",
            IssueReason::FrozenVideoTrack => "frozen-video-track",
            IssueReason::DeadVideoTrack => "dead-video-track",
            IssueReason::MissingAudioStreamData => "missing-audio-stream-data",
            IssueReason::MissingVideoStreamData => "missing-video-stream-data",
        };
        write!(f, "{s}")
    }
}

/// A single diagnosis produced by a detector.
///
/// Issues are emitted and never stored by the engine. `stats_sample` carries
/// the values that led to the decision so consumers can log or forward them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(rename = "type")]
    pub typ: IssueType,
    pub reason: IssueReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<SSRC>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_candidate: Option<String>,
    #[serde(default)]
    pub stats_sample: serde_json::Value,
}

impl Issue {
    pub fn new(typ: IssueType, reason: IssueReason) -> Self {
        Self {
            typ,
            reason,
            ssrc: None,
            track_identifier: None,
            ice_candidate: None,
            stats_sample: serde_json::Value::Null,
        }
    }

    pub fn with_ssrc(mut self, ssrc: SSRC) -> Self {
        self.ssrc = Some(ssrc);
        self
    }

    pub fn with_track_identifier(mut self, track_identifier: impl Into<String>) -> Self {
        self.track_identifier = Some(track_identifier.into());
        self
    }

    pub fn with_ice_candidate(mut self, ice_candidate: impl Into<String>) -> Self {
        self.ice_candidate = Some(ice_candidate.into());
        self
    }

    pub fn with_stats_sample(mut self, stats_sample: serde_json::Value) -> Self {
        self.stats_sample = stats_sample;
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.typ, self.reason)?;
        if let Some(ssrc) = self.ssrc {
            write!(f, " ssrc={ssrc}")?;
        }
        if let Some(track_identifier) = &self.track_identifier {
            write!(f, " track={track_identifier}")?;
        }
        Ok(())
    }
}
