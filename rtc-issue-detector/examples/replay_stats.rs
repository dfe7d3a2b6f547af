use rtc_issue_detector::{
    Error, ParsedStats, TaggedStats, WebRTCIssueDetectorBuilder, calc_bitrate,
};
use sansio::Protocol;

use clap::Parser;
use log::{info, trace};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "Stats Replay")]
#[command(version = "0.1.0")]
#[command(about = "Replays recorded stats snapshots through the issue detector", long_about = None)]
struct Cli {
    /// Newline-delimited JSON snapshots, one per poll. Reads stdin when omitted.
    #[arg(long)]
    input: Option<String>,
    /// Interval between two polls of the same connection.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
    /// SSRCs whose issues are discarded.
    #[arg(long)]
    ignore_ssrc: Vec<u32>,
    #[arg(short, long)]
    debug: bool,
}

/// Browsers do not report bitrates, derive them from the byte counters of
/// the previous snapshot of the same connection when missing.
fn fill_bitrates(stats: &mut ParsedStats, prev: Option<&ParsedStats>) {
    let Some(prev) = prev else {
        return;
    };

    for stream in stats.video.inbound.iter_mut().filter(|s| s.bitrate == 0.0) {
        if let Some(p) = prev.inbound_video(stream.ssrc) {
            stream.bitrate =
                calc_bitrate(stream.bytes_received, stream.timestamp, p.bytes_received, p.timestamp);
        }
    }
    for stream in stats.audio.inbound.iter_mut().filter(|s| s.bitrate == 0.0) {
        if let Some(p) = prev.inbound_audio(stream.ssrc) {
            stream.bitrate =
                calc_bitrate(stream.bytes_received, stream.timestamp, p.bytes_received, p.timestamp);
        }
    }
    for stream in stats.video.outbound.iter_mut().filter(|s| s.bitrate == 0.0) {
        if let Some(p) = prev.outbound_video(stream.ssrc) {
            stream.bitrate =
                calc_bitrate(stream.bytes_sent, stream.timestamp, p.bytes_sent, p.timestamp);
        }
    }
    for stream in stats.audio.outbound.iter_mut().filter(|s| s.bitrate == 0.0) {
        if let Some(p) = prev.audio.outbound.iter().find(|p| p.ssrc == stream.ssrc) {
            stream.bitrate =
                calc_bitrate(stream.bytes_sent, stream.timestamp, p.bytes_sent, p.timestamp);
        }
    }
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    if cli.debug {
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    record.args()
                )
            })
            .filter(None, log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut detector = WebRTCIssueDetectorBuilder::new()
        .with_default_detectors()
        .with_ignore_ssrc_list(cli.ignore_ssrc)
        .build();
    info!("detectors: {:?}", detector.detector_names());

    let interval = Duration::from_millis(cli.interval_ms);
    let start = Instant::now();
    let mut polls: HashMap<String, u32> = HashMap::new();
    let mut last: HashMap<String, ParsedStats> = HashMap::new();
    let mut now = start;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let mut stats: ParsedStats = serde_json::from_str(&line)?;
        let connection_id = stats.connection_id().to_owned();
        fill_bitrates(&mut stats, last.get(&connection_id));

        // each connection is polled on its own clock
        let poll = polls.entry(connection_id.clone()).or_insert(0);
        now = now.max(start + interval * *poll);
        *poll += 1;

        while let Some(deadline) = detector.poll_timeout() {
            if deadline > now {
                break;
            }
            trace!("timeout at {:?}", deadline.duration_since(start));
            detector.handle_timeout(deadline)?;
        }

        detector.handle_read(TaggedStats {
            now,
            stats: stats.clone(),
        })?;
        last.insert(connection_id, stats);

        while let Some(event) = detector.poll_read() {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }
    }

    detector.close()?;

    Ok(())
}
