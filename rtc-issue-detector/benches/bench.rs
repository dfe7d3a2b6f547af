use criterion::{Criterion, criterion_group, criterion_main};
use rtc_issue_detector::stats::inbound::{
    InboundAudioTrackStats, InboundVideoTrackStats, ParsedInboundAudioStreamStats,
    ParsedInboundVideoStreamStats,
};
use rtc_issue_detector::stats::outbound::ParsedOutboundVideoStreamStats;
use rtc_issue_detector::stats::remote::ParsedRemoteInboundStreamStats;
use rtc_issue_detector::{
    NetworkQualityStatsSample, NetworkScoresCalculate, NetworkScoresCalculator, ParsedStats,
    TaggedStats, WebRTCIssueDetector, calculate_mos,
};
use sansio::Protocol;
use std::hint::black_box;
use std::time::{Duration, Instant};

/// The n-th poll of a call receiving one audio and one video stream and
/// sending one video stream.
fn call_snapshot(n: u64) -> ParsedStats {
    let timestamp = 1000.0 * n as f64;
    let mut stats = ParsedStats::default();
    stats.connection.id = "pc-bench".to_owned();
    stats.connection.current_round_trip_time = Some(0.08);
    stats.connection.available_outgoing_bitrate = Some(1_500_000.0);
    stats.connection.packets_received = 150 * n;

    stats.audio.inbound.push(ParsedInboundAudioStreamStats {
        ssrc: 1111,
        timestamp,
        bytes_received: 4_000 * n,
        packets_received: 50 * n,
        packets_lost: n as i64 / 10,
        jitter: 0.012,
        jitter_buffer_delay: 0.06 * n as f64,
        jitter_buffer_emitted_count: 960 * n,
        total_samples_received: 48_000 * n,
        inserted_samples_for_deceleration: 100 * n,
        removed_samples_for_acceleration: 80 * n,
        track: InboundAudioTrackStats {
            track_identifier: "audio-1111".to_owned(),
            ..Default::default()
        },
        ..Default::default()
    });

    stats.video.inbound.push(ParsedInboundVideoStreamStats {
        ssrc: 2222,
        timestamp,
        mime_type: "video/VP8".to_owned(),
        decoder_implementation: "libvpx".to_owned(),
        bytes_received: 120_000 * n,
        packets_received: 100 * n,
        packets_lost: n as i64 / 5,
        jitter: 0.02,
        frames_received: 30 * n as u32,
        frames_decoded: 30 * n as u32,
        frames_per_second: if n % 2 == 0 { 30.0 } else { 24.0 },
        frame_width: 1280,
        frame_height: 720,
        total_decode_time: 0.004 * 30.0 * n as f64,
        track: InboundVideoTrackStats {
            track_identifier: "video-2222".to_owned(),
            ..Default::default()
        },
        ..Default::default()
    });

    stats.video.outbound.push(ParsedOutboundVideoStreamStats {
        ssrc: 3333,
        timestamp,
        bytes_sent: 100_000 * n,
        packets_sent: 90 * n,
        frames_encoded: 30 * n as u32,
        frames_sent: 30 * n as u32,
        bitrate: 800_000.0,
        ..Default::default()
    });
    stats.remote.video.inbound.push(ParsedRemoteInboundStreamStats {
        ssrc: 3333,
        timestamp,
        packets_lost: n as i64 / 20,
        jitter: 0.015,
        round_trip_time: 0.08,
        ..Default::default()
    });

    stats
}

fn benchmark_calculate_mos(c: &mut Criterion) {
    let sample = NetworkQualityStatsSample {
        avg_jitter: 20.0,
        rtt: 150.0,
        packets_loss: 3.0,
        avg_jitter_buffer_delay: None,
    };

    c.bench_function("calculate_mos", |b| {
        b.iter(|| calculate_mos(black_box(&sample)))
    });
}

fn benchmark_network_scores(c: &mut Criterion) {
    let snapshots: Vec<ParsedStats> = (1..=10).map(call_snapshot).collect();

    c.bench_function("NetworkScoresCalculator 10 polls", |b| {
        b.iter(|| {
            let start = Instant::now();
            let mut calculator = NetworkScoresCalculator::new();
            for (i, stats) in snapshots.iter().enumerate() {
                let _ = calculator.calculate(start + Duration::from_secs(i as u64), stats);
            }
        })
    });
}

fn benchmark_issue_detector(c: &mut Criterion) {
    let snapshots: Vec<ParsedStats> = (1..=10).map(call_snapshot).collect();

    c.bench_function("WebRTCIssueDetector 10 polls", |b| {
        b.iter(|| {
            let start = Instant::now();
            let mut detector = WebRTCIssueDetector::default();
            for (i, stats) in snapshots.iter().enumerate() {
                detector
                    .handle_read(TaggedStats {
                        now: start + Duration::from_secs(i as u64),
                        stats: stats.clone(),
                    })
                    .unwrap();
                while let Some(event) = detector.poll_read() {
                    black_box(event);
                }
            }
        })
    });
}

criterion_group!(
    benches,
    benchmark_calculate_mos,
    benchmark_network_scores,
    benchmark_issue_detector
);
criterion_main!(benches);
