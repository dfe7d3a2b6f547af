//! Numeric and video stream helpers shared by the detectors.

pub mod calc;
pub mod video;

pub use calc::{
    calculate_mean, calculate_standard_deviation, calculate_variance, calculate_volatility,
};
pub use video::{DTX_STD_DEV_THRESHOLD_MS, is_dtx_like_behavior, is_svc_spatial_layer_changed};
