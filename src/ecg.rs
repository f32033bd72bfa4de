//! ==============================================================================
//! ecg.rs - resting-ECG category derivation
//! ==============================================================================
//!
//! purpose:
//!     classifies an ECG waveform into the 3-level resting-ECG ordinal used as
//!     a model feature downstream (0 = normal, 1 = mild deviation, 2 = strong
//!     deviation). the signal is normalized to z-scores and the maximum
//!     absolute deviation decides the category.
//!
//! relationships:
//!     - used by: registry.rs (fills in `rest_ecg` when a device omits it)
//!
//! ==============================================================================

/// Derive the resting-ECG category (0/1/2) from an ordered ECG sample sequence.
///
/// Pure and total: an empty sequence maps to 0, and a zero-variance sequence
/// divides by 1 instead of the standard deviation, so every input has a
/// defined category.
///
/// Uses the population standard deviation (divisor `n`, not `n - 1`).
pub fn process_ecg_to_restecg(ecg: &[f64]) -> u8 {
    if ecg.is_empty() {
        return 0;
    }

    let n = ecg.len() as f64;
    let mean = ecg.iter().sum::<f64>() / n;
    let variance = ecg.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = variance.sqrt();
    let divisor = if std == 0.0 { 1.0 } else { std };

    let max_dev = ecg
        .iter()
        .map(|v| ((v - mean) / divisor).abs())
        .fold(0.0_f64, f64::max);

    if max_dev < 1.0 {
        0
    } else if max_dev < 2.0 {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_is_normal() {
        assert_eq!(process_ecg_to_restecg(&[]), 0);
    }

    #[test]
    fn flat_line_is_normal() {
        // zero variance: safe-divide keeps every z-score at 0
        assert_eq!(process_ecg_to_restecg(&[5.0, 5.0, 5.0, 5.0]), 0);
    }

    #[test]
    fn two_distinct_values_are_mild() {
        // mean 0.5, population std 0.5, both z-scores exactly 1.0
        assert_eq!(process_ecg_to_restecg(&[0.0, 1.0]), 1);
    }

    #[test]
    fn single_extreme_outlier_is_strong() {
        // [0,0,0,0,10]: mean 2, std 4, outlier z-score exactly 2.0
        assert_eq!(process_ecg_to_restecg(&[0.0, 0.0, 0.0, 0.0, 10.0]), 2);
    }

    #[test]
    fn single_sample_is_normal() {
        assert_eq!(process_ecg_to_restecg(&[42.0]), 0);
    }
}
