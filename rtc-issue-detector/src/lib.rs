//! RTC Issue Detector - Sans-IO diagnosis of WebRTC call quality from stats.
//!
//! This crate evaluates periodic statistics snapshots of peer connections and
//! produces:
//!
//! - a Mean Opinion Score (MOS) estimate of the network for each direction
//! - discrete [`Issue`]s such as network degradation, CPU throttling,
//!   decoder problems and stalled streams
//!
//! Every counter in a snapshot is cumulative, so detectors diff consecutive
//! snapshots of the same connection. Each detector owns a bounded,
//! idle-expiring history sharded by connection id, applies its own thresholds
//! and debounces its reports.
//!
//! # Available Detectors
//!
//! ## Network
//!
//! | Detector | Description |
//! |----------|-------------|
//! | [`InboundNetworkIssueDetector`] | Loss, jitter, RTT and jitter buffer delay of received media |
//! | [`OutboundNetworkIssueDetector`] | Loss and jitter of sent media, from remote receiver reports |
//! | [`NetworkMediaSyncIssueDetector`] | Audio playout the jitter buffer keeps correcting |
//! | [`AvailableOutgoingBitrateIssueDetector`] | Congestion controller estimate too low for what is sent |
//!
//! ## CPU
//!
//! | Detector | Description |
//! |----------|-------------|
//! | [`QualityLimitationsIssueDetector`] | Encoder limited by CPU or bandwidth and no longer sending |
//! | [`VideoDecoderIssueDetector`] | Unstable decode rate across inbound video streams |
//! | [`FramesDroppedIssueDetector`] | Inbound video dropping most received frames |
//! | [`FramesEncodedSentIssueDetector`] | Encoded frames not making it onto the wire |
//!
//! ## Stream
//!
//! | Detector | Description |
//! |----------|-------------|
//! | [`UnknownVideoDecoderImplementationDetector`] | No decoder for the negotiated codec |
//! | [`VideoCodecMismatchDetector`] | Same condition, reported as a codec mismatch |
//! | [`FrozenVideoTrackDetector`] | Inbound video frozen too long or too often |
//! | [`DeadVideoTrackDetector`] | Packets arriving but nothing decoded |
//! | [`MissingStreamDataDetector`] | Live tracks that stopped receiving bytes |
//!
//! # Quick Start
//!
//! ```ignore
//! use rtc_issue_detector::{IssueDetectorEvent, TaggedStats, WebRTCIssueDetector};
//! use sansio::Protocol;
//! use std::time::Instant;
//!
//! let mut detector = WebRTCIssueDetector::default();
//!
//! // on every stats poll
//! detector.handle_read(TaggedStats { now: Instant::now(), stats })?;
//! while let Some(event) = detector.poll_read() {
//!     match event {
//!         IssueDetectorEvent::NetworkScoresUpdated(scores) => { /* ... */ }
//!         IssueDetectorEvent::Issues { issues, .. } => { /* ... */ }
//!     }
//! }
//!
//! // when the deadline returned by poll_timeout() passes
//! detector.handle_timeout(Instant::now())?;
//! ```

#![warn(rust_2018_idioms)]

pub mod detector;
pub mod error;
pub mod helpers;
pub mod history;
pub mod issue;
pub mod mark;
pub mod network_scores;
pub mod stats;

mod pipeline;

pub use detector::{
    AvailableOutgoingBitrateIssueDetector, AvailableOutgoingBitrateIssueDetectorConfig,
    DeadVideoTrackDetector, DeadVideoTrackDetectorConfig, DecoderVolatilityMetric,
    FramesDroppedIssueDetector, FramesDroppedIssueDetectorConfig, FramesEncodedSentIssueDetector,
    FramesEncodedSentIssueDetectorConfig, FrozenVideoTrackDetector,
    FrozenVideoTrackDetectorConfig, InboundNetworkIssueDetector,
    InboundNetworkIssueDetectorConfig, IssueDetector, MissingStreamDataDetector,
    MissingStreamDataDetectorConfig, NetworkMediaSyncIssueDetector,
    NetworkMediaSyncIssueDetectorConfig, OutboundNetworkIssueDetector,
    OutboundNetworkIssueDetectorConfig, QualityLimitationsIssueDetector,
    QualityLimitationsIssueDetectorConfig, UnknownVideoDecoderImplementationDetector,
    VideoCodecMismatchDetector, VideoDecoderIssueDetector, VideoDecoderIssueDetectorConfig,
    default_detectors,
};
pub use error::{Error, Result};
pub use history::{ProcessedStats, StatsHistory, StatsHistoryConfig};
pub use issue::{Issue, IssueReason, IssueType};
pub use network_scores::{
    MOS_BAD, NetworkQualityStatsSample, NetworkQualityStatsSamples, NetworkScores,
    NetworkScoresCalculate, NetworkScoresCalculator, calculate_mos,
};
pub use pipeline::{IssueDetectorEvent, WebRTCIssueDetector, WebRTCIssueDetectorBuilder};
pub use stats::{ParsedStats, SSRC, TaggedStats, calc_bitrate, calc_value_rate};
