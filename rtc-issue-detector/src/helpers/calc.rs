use crate::error::{Error, Result};

/// Arithmetic mean. Returns 0 for an empty series.
pub fn calculate_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance around `mean`. Returns 0 for an empty series.
pub fn calculate_variance(mean: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn calculate_standard_deviation(values: &[f64]) -> f64 {
    let mean = calculate_mean(values);
    calculate_variance(mean, values).sqrt()
}

/// Mean absolute deviation as a percentage of the mean.
///
/// A series whose mean is zero has no meaningful relative spread and yields 0.
pub fn calculate_volatility(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(Error::ErrEmptySeries);
    }

    let mean = calculate_mean(values);
    if mean == 0.0 {
        return Ok(0.0);
    }

    let mean_absolute_deviation =
        values.iter().map(|v| (v - mean).abs()).sum::<f64>() / values.len() as f64;

    Ok(mean_absolute_deviation * 100.0 / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volatility_empty_series() {
        assert_eq!(calculate_volatility(&[]), Err(Error::ErrEmptySeries));
    }

    #[test]
    fn test_volatility() {
        // mean 25, deviations 5,5,5,5
        let v = calculate_volatility(&[20.0, 30.0, 20.0, 30.0]).unwrap();
        assert!((v - 20.0).abs() < 1e-9);

        assert_eq!(calculate_volatility(&[30.0, 30.0, 30.0]).unwrap(), 0.0);
        assert_eq!(calculate_volatility(&[0.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_mean_variance_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(calculate_mean(&values), 5.0);
        assert_eq!(calculate_variance(5.0, &values), 4.0);
        assert_eq!(calculate_standard_deviation(&values), 2.0);
        assert_eq!(calculate_mean(&[]), 0.0);
    }
}
