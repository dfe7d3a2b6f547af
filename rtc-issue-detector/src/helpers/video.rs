use super::calc::calculate_standard_deviation;
use crate::stats::{ParsedStats, SSRC};

/// Default frame interval standard deviation, in milliseconds, above which a
/// stream is considered to be in discontinuous transmission.
pub const DTX_STD_DEV_THRESHOLD_MS: f64 = 30.0;

/// Reports whether the resolution of the inbound video stream `ssrc` changed
/// anywhere in `window`, which is ordered oldest first.
///
/// A stream that shows up without a counterpart in the preceding snapshot is
/// treated as a change as well.
pub fn is_svc_spatial_layer_changed(ssrc: SSRC, window: &[&ParsedStats]) -> bool {
    window.windows(2).any(|pair| {
        let Some(current) = pair[1].inbound_video(ssrc) else {
            return false;
        };
        match pair[0].inbound_video(ssrc) {
            Some(prev) => {
                current.frame_width != prev.frame_width || current.frame_height != prev.frame_height
            }
            None => true,
        }
    })
}

/// Reports whether the frame intervals of the inbound video stream `ssrc`
/// vary the way a DTX stream does, i.e. their standard deviation across
/// `window` exceeds `std_dev_threshold_ms`.
///
/// At least two intervals are needed for a verdict.
pub fn is_dtx_like_behavior(ssrc: SSRC, window: &[&ParsedStats], std_dev_threshold_ms: f64) -> bool {
    let frame_intervals: Vec<f64> = window
        .windows(2)
        .filter_map(|pair| {
            let prev = pair[0].inbound_video(ssrc)?;
            let current = pair[1].inbound_video(ssrc)?;
            let delta_frames = current.frames_decoded as f64 - prev.frames_decoded as f64;
            if delta_frames > 0.0 {
                Some((current.timestamp - prev.timestamp) / delta_frames)
            } else {
                None
            }
        })
        .collect();

    if frame_intervals.len() <= 1 {
        return false;
    }

    calculate_standard_deviation(&frame_intervals) > std_dev_threshold_ms
}
