//! Network quality scoring.
//!
//! The [`NetworkScoresCalculator`] diffs two consecutive snapshots of a
//! connection and estimates a Mean Opinion Score (MOS, 1 to 4.5) for each
//! direction with a simplified E-model:
//!
//! ```text
//! effective_latency = rtt + 2 * jitter + 10
//! r = 93.2 - effective_latency / 40            if effective_latency < 160
//! r = 93.2 - (effective_latency - 120) / 10    otherwise
//! r = r - 2.5 * packets_loss
//! mos = 1 + 0.035 r + 0.000007 r (r - 60) (100 - r)
//! ```
//!
//! The raw figures each score is derived from are kept in
//! [`NetworkScores::stats_samples`] so detectors can apply their own
//! thresholds to them without recomputing the deltas.

use crate::stats::inbound::InboundStreamStats;
use crate::stats::ParsedStats;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// MOS at or below which a direction is considered bad.
pub const MOS_BAD: f64 = 2.1;

/// Idle time after which the previous snapshot of a connection is forgotten.
pub const DEFAULT_PREV_STATS_TTL: Duration = Duration::from_secs(35);

/// The network figures a MOS was computed from.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkQualityStatsSample {
    /// Average jitter across streams in milliseconds.
    pub avg_jitter: f64,
    /// Round trip time in milliseconds.
    pub rtt: f64,
    /// Packet loss since the previous snapshot, in percent (0 to 100).
    pub packets_loss: f64,
    /// Average jitter buffer delay per emitted sample in milliseconds.
    ///
    /// Only measured for the inbound direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_jitter_buffer_delay: Option<f64>,
}

/// Raw samples behind [`NetworkScores`].
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkQualityStatsSamples {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound_stats_sample: Option<NetworkQualityStatsSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_stats_sample: Option<NetworkQualityStatsSample>,
}

/// MOS estimate of a connection for each direction.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkScores {
    pub connection_id: String,
    /// `None` when nothing is received or there is no previous snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound: Option<f64>,
    /// `None` when no remote receiver reports exist or there is no previous
    /// snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<f64>,
    pub stats_samples: NetworkQualityStatsSamples,
}

impl NetworkScores {
    /// Reports whether the inbound score is known and at or below [`MOS_BAD`].
    pub fn is_inbound_bad(&self) -> bool {
        self.inbound.is_some_and(|mos| mos <= MOS_BAD)
    }
}

/// Produces [`NetworkScores`] for consecutive snapshots of a connection.
///
/// Implementations keep whatever per-connection state they need and expire
/// it through the sans-I/O `handle_timeout`/`poll_timeout` pair.
pub trait NetworkScoresCalculate: Send {
    fn calculate(&mut self, now: Instant, stats: &ParsedStats) -> NetworkScores;

    /// Forgets connections idle since before `now - ttl`.
    fn handle_timeout(&mut self, now: Instant);

    /// Earliest instant at which some connection expires.
    fn poll_timeout(&self) -> Option<Instant>;

    fn close(&mut self);
}

/// Default [`NetworkScoresCalculate`] implementation keeping one previous
/// snapshot per connection.
pub struct NetworkScoresCalculator {
    ttl: Duration,
    last_processed: HashMap<String, (Instant, ParsedStats)>,
}

impl Default for NetworkScoresCalculator {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_PREV_STATS_TTL,
            last_processed: HashMap::new(),
        }
    }
}

impl NetworkScoresCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle time after which the previous snapshot is dropped.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn previous(&self, now: Instant, connection_id: &str) -> Option<&ParsedStats> {
        self.last_processed
            .get(connection_id)
            .filter(|(last_updated, _)| now.saturating_duration_since(*last_updated) < self.ttl)
            .map(|(_, stats)| stats)
    }
}

impl NetworkScoresCalculate for NetworkScoresCalculator {
    fn calculate(&mut self, now: Instant, stats: &ParsedStats) -> NetworkScores {
        let connection_id = stats.connection_id().to_owned();

        let (inbound_stats_sample, outbound_stats_sample) = match self.previous(now, &connection_id)
        {
            Some(prev) => (
                inbound_network_stats(stats, prev),
                outbound_network_stats(stats, prev),
            ),
            None => (None, None),
        };

        let scores = NetworkScores {
            connection_id: connection_id.clone(),
            inbound: inbound_stats_sample.as_ref().map(calculate_mos),
            outbound: outbound_stats_sample.as_ref().map(calculate_mos),
            stats_samples: NetworkQualityStatsSamples {
                inbound_stats_sample,
                outbound_stats_sample,
            },
        };

        trace!(
            "network scores for {}: inbound={:?} outbound={:?}",
            connection_id, scores.inbound, scores.outbound
        );

        self.last_processed
            .insert(connection_id, (now, stats.clone()));

        scores
    }

    fn handle_timeout(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.last_processed.retain(|connection_id, (last_updated, _)| {
            let alive = now.saturating_duration_since(*last_updated) < ttl;
            if !alive {
                debug!("network scores: dropping idle connection {}", connection_id);
            }
            alive
        });
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.last_processed
            .values()
            .map(|(last_updated, _)| *last_updated + self.ttl)
            .min()
    }

    fn close(&mut self) {
        self.last_processed.clear();
    }
}

/// MOS for one direction, clamped to [1, 4.5].
pub fn calculate_mos(sample: &NetworkQualityStatsSample) -> f64 {
    let effective_latency = sample.rtt + 2.0 * sample.avg_jitter + 10.0;
    let mut r = if effective_latency < 160.0 {
        93.2 - effective_latency / 40.0
    } else {
        93.2 - (effective_latency - 120.0) / 10.0
    };
    r -= 2.5 * sample.packets_loss;
    let r = r.clamp(0.0, 100.0);

    let mos = 1.0 + 0.035 * r + 0.000007 * r * (r - 60.0) * (100.0 - r);
    mos.clamp(1.0, 4.5)
}

/// Loss percentage from a lost-packet delta and a sent/received delta.
///
/// Yields 0 unless both deltas are positive.
fn packets_loss_percent(delta_packets: i64, delta_lost: i64) -> f64 {
    if delta_packets <= 0 || delta_lost <= 0 {
        return 0.0;
    }
    let pct = (delta_lost as f64 * 100.0 / (delta_packets + delta_lost) as f64).round();
    pct.clamp(0.0, 100.0)
}

fn round_trip_time_ms(stats: &ParsedStats) -> f64 {
    stats
        .connection
        .current_round_trip_time
        .filter(|rtt| rtt.is_finite())
        .map_or(0.0, |rtt| rtt * 1000.0)
}

/// Network figures of what the local endpoint receives, diffed against
/// `prev`. `None` when no inbound stream exists.
pub(crate) fn inbound_network_stats(
    stats: &ParsedStats,
    prev: &ParsedStats,
) -> Option<NetworkQualityStatsSample> {
    let current: Vec<&dyn InboundStreamStats> = stats
        .audio
        .inbound
        .iter()
        .map(|s| s as &dyn InboundStreamStats)
        .chain(stats.video.inbound.iter().map(|s| s as &dyn InboundStreamStats))
        .collect();
    if current.is_empty() {
        return None;
    }

    let previous: Vec<&dyn InboundStreamStats> = prev
        .audio
        .inbound
        .iter()
        .map(|s| s as &dyn InboundStreamStats)
        .chain(prev.video.inbound.iter().map(|s| s as &dyn InboundStreamStats))
        .collect();

    let mut sum_jitter = 0.0;
    let mut sum_jitter_buffer_delay_ms = 0.0;
    let mut delta_lost = 0i64;
    for stream in &current {
        sum_jitter += stream.jitter();

        let Some(prev_stream) = previous.iter().find(|p| p.ssrc() == stream.ssrc()) else {
            continue;
        };
        delta_lost += stream.packets_lost() - prev_stream.packets_lost();

        let delay = stream.jitter_buffer_delay() - prev_stream.jitter_buffer_delay();
        let emitted = stream.jitter_buffer_emitted_count() as f64
            - prev_stream.jitter_buffer_emitted_count() as f64;
        if delay > 0.0 && emitted > 0.0 {
            sum_jitter_buffer_delay_ms += delay * 1000.0 / emitted;
        }
    }

    let count = current.len() as f64;
    let delta_received =
        stats.connection.packets_received as i64 - prev.connection.packets_received as i64;

    Some(NetworkQualityStatsSample {
        avg_jitter: sum_jitter / count * 1000.0,
        rtt: round_trip_time_ms(stats),
        packets_loss: packets_loss_percent(delta_received, delta_lost),
        avg_jitter_buffer_delay: Some(sum_jitter_buffer_delay_ms / count),
    })
}

/// Network figures of what the local endpoint sends, as reported back by the
/// remote peer and diffed against `prev`. `None` when no remote inbound
/// report exists.
pub(crate) fn outbound_network_stats(
    stats: &ParsedStats,
    prev: &ParsedStats,
) -> Option<NetworkQualityStatsSample> {
    let current: Vec<_> = stats.remote_inbound().collect();
    if current.is_empty() {
        return None;
    }

    let mut sum_jitter = 0.0;
    let mut delta_lost = 0i64;
    for stream in &current {
        sum_jitter += stream.jitter;
        if let Some(prev_stream) = prev.remote_inbound_stream(stream.ssrc) {
            delta_lost += stream.packets_lost - prev_stream.packets_lost;
        }
    }

    let delta_sent = stats.connection.packets_sent as i64 - prev.connection.packets_sent as i64;

    Some(NetworkQualityStatsSample {
        avg_jitter: sum_jitter / current.len() as f64 * 1000.0,
        rtt: round_trip_time_ms(stats),
        packets_loss: packets_loss_percent(delta_sent, delta_lost),
        avg_jitter_buffer_delay: None,
    })
}
