use super::IssueDetector;
use crate::error::Result;
use crate::helpers::{
    DTX_STD_DEV_THRESHOLD_MS, calculate_volatility, is_dtx_like_behavior,
    is_svc_spatial_layer_changed,
};
use crate::history::{StatsHistory, StatsHistoryConfig};
use crate::issue::{Issue, IssueReason, IssueType};
use crate::mark::EdgeLatch;
use crate::network_scores::{MOS_BAD, NetworkScores};
use crate::stats::{ParsedStats, SSRC};
use log::{debug, trace};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

/// The per-stream series whose volatility indicates a throttled decoder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DecoderVolatilityMetric {
    /// `framesPerSecond` of every snapshot in the window.
    #[default]
    FramesPerSecond,
    /// Milliseconds spent decoding a frame between consecutive snapshots.
    /// The series must also be strictly increasing.
    DecodeTimePerFrame,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoDecoderIssueDetectorConfig {
    pub history: StatsHistoryConfig,
    pub metric: DecoderVolatilityMetric,
    /// Volatility, in percent of the mean, above which a stream is throttled.
    pub volatility_threshold: f64,
    /// Share of throttled streams, in percent, above which an issue fires.
    pub affected_streams_percent_threshold: f64,
    /// Minimum number of snapshots, the current one included, to evaluate.
    pub min_window: usize,
    /// Inbound MOS at or below which the window is not trusted.
    pub mos_bad: f64,
    pub dtx_std_dev_threshold_ms: f64,
}

impl Default for VideoDecoderIssueDetectorConfig {
    fn default() -> Self {
        Self {
            history: StatsHistoryConfig::default(),
            metric: DecoderVolatilityMetric::FramesPerSecond,
            volatility_threshold: 8.0,
            affected_streams_percent_threshold: 30.0,
            min_window: 5,
            mos_bad: MOS_BAD,
            dtx_std_dev_threshold_ms: DTX_STD_DEV_THRESHOLD_MS,
        }
    }
}

impl VideoDecoderIssueDetectorConfig {
    /// Defaults for the [`DecoderVolatilityMetric::DecodeTimePerFrame`] metric.
    pub fn decode_time_per_frame() -> Self {
        Self {
            metric: DecoderVolatilityMetric::DecodeTimePerFrame,
            volatility_threshold: 1.5,
            affected_streams_percent_threshold: 50.0,
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: StatsHistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_metric(mut self, metric: DecoderVolatilityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_volatility_threshold(mut self, threshold: f64) -> Self {
        self.volatility_threshold = threshold;
        self
    }

    pub fn with_affected_streams_percent_threshold(mut self, pct: f64) -> Self {
        self.affected_streams_percent_threshold = pct;
        self
    }

    pub fn with_min_window(mut self, min_window: usize) -> Self {
        self.min_window = min_window;
        self
    }

    pub fn with_mos_bad(mut self, mos: f64) -> Self {
        self.mos_bad = mos;
        self
    }

    pub fn with_dtx_std_dev_threshold_ms(mut self, ms: f64) -> Self {
        self.dtx_std_dev_threshold_ms = ms;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThrottledStream {
    ssrc: SSRC,
    volatility: f64,
    series: Vec<f64>,
}

/// Reports connections where a large share of inbound video streams decode
/// at an unstable rate.
///
/// Needs a full window of snapshots, none of them taken while the inbound
/// network was bad. After an issue the connection's history is dropped and
/// no further issue is reported until an evaluation falls below the
/// threshold again.
pub struct VideoDecoderIssueDetector {
    config: VideoDecoderIssueDetectorConfig,
    history: StatsHistory,
    throttled: EdgeLatch<String>,
}

impl Default for VideoDecoderIssueDetector {
    fn default() -> Self {
        Self::new(VideoDecoderIssueDetectorConfig::default())
    }
}

impl VideoDecoderIssueDetector {
    pub fn new(config: VideoDecoderIssueDetectorConfig) -> Self {
        Self {
            config,
            history: StatsHistory::new(config.history),
            throttled: EdgeLatch::default(),
        }
    }

    fn series(&self, ssrc: SSRC, window: &[&ParsedStats]) -> Vec<f64> {
        match self.config.metric {
            DecoderVolatilityMetric::FramesPerSecond => window
                .iter()
                .filter_map(|s| s.inbound_video(ssrc))
                .map(|s| s.frames_per_second)
                .collect(),
            DecoderVolatilityMetric::DecodeTimePerFrame => window
                .windows(2)
                .filter_map(|pair| {
                    let current = pair[1].inbound_video(ssrc)?;
                    let Some(prev) = pair[0].inbound_video(ssrc) else {
                        return Some(0.0);
                    };
                    let delta_frames_decoded =
                        current.frames_decoded as f64 - prev.frames_decoded as f64;
                    let delta_total_decode_time = current.total_decode_time - prev.total_decode_time;
                    if delta_frames_decoded > 0.0 && delta_total_decode_time > 0.0 {
                        Some(delta_total_decode_time * 1000.0 / delta_frames_decoded)
                    } else {
                        Some(0.0)
                    }
                })
                .collect(),
        }
    }

    fn process(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Result<Vec<Issue>> {
        let connection_id = stats.connection_id();
        if self.history.is_empty(now, connection_id) {
            self.throttled.update(connection_id.to_owned(), false);
        }

        let history_len = self.history.len(now, connection_id);
        if history_len + 1 < self.config.min_window {
            trace!(
                "{}: {} of {} snapshots on {}",
                self.name(),
                history_len + 1,
                self.config.min_window,
                connection_id
            );
            return Ok(vec![]);
        }

        let mos_bad = self.config.mos_bad;
        let is_bad = |scores: &NetworkScores| scores.inbound.is_some_and(|mos| mos <= mos_bad);
        if is_bad(network_scores)
            || self
                .history
                .all(now, connection_id)
                .any(|p| is_bad(&p.network_scores))
        {
            trace!("{}: bad inbound network on {}", self.name(), connection_id);
            return Ok(vec![]);
        }

        let window: Vec<&ParsedStats> = self
            .history
            .all(now, connection_id)
            .map(|p| &p.stats)
            .chain(std::iter::once(stats))
            .collect();

        let mut throttled_streams = vec![];
        for stream in &stats.video.inbound {
            if is_svc_spatial_layer_changed(stream.ssrc, &window)
                || is_dtx_like_behavior(stream.ssrc, &window, self.config.dtx_std_dev_threshold_ms)
            {
                continue;
            }

            let series = self.series(stream.ssrc, &window);
            if series.is_empty() {
                continue;
            }
            let volatility = calculate_volatility(&series)?;

            let is_increasing = match self.config.metric {
                DecoderVolatilityMetric::FramesPerSecond => true,
                DecoderVolatilityMetric::DecodeTimePerFrame => {
                    series.windows(2).all(|pair| pair[1] > pair[0])
                }
            };

            if volatility > self.config.volatility_threshold && is_increasing {
                throttled_streams.push(ThrottledStream {
                    ssrc: stream.ssrc,
                    volatility,
                    series,
                });
            }
        }

        let total = stats.video.inbound.len();
        if total == 0 {
            return Ok(vec![]);
        }
        let affected_streams_percent = throttled_streams.len() as f64 * 100.0 / total as f64;
        let is_throttled = affected_streams_percent > self.config.affected_streams_percent_threshold;

        if !self.throttled.update(connection_id.to_owned(), is_throttled) {
            return Ok(vec![]);
        }

        debug!(
            "{}: {:.0}% of inbound video streams throttled on {}",
            self.name(),
            affected_streams_percent,
            connection_id
        );
        self.history.clear(connection_id);

        Ok(vec![
            Issue::new(IssueType::Cpu, IssueReason::DecoderCpuThrottling).with_stats_sample(
                json!({
                    "affectedStreamsPercent": affected_streams_percent,
                    "throttledStreams": throttled_streams,
                }),
            ),
        ])
    }
}

impl IssueDetector for VideoDecoderIssueDetector {
    fn name(&self) -> &'static str {
        "video_decoder"
    }

    fn detect(
        &mut self,
        now: Instant,
        stats: &ParsedStats,
        network_scores: &NetworkScores,
    ) -> Result<Vec<Issue>> {
        let issues = self.process(now, stats, network_scores);
        self.history.push(now, stats, network_scores);
        issues
    }

    fn handle_timeout(&mut self, now: Instant) {
        let evicted = self.history.handle_timeout(now);
        self.throttled.retain(|connection_id| !evicted.contains(connection_id));
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.history.poll_timeout()
    }

    fn close(&mut self) {
        self.history.close();
        self.throttled = EdgeLatch::default();
    }
}
