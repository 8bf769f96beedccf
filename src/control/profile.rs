// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Precomputed Gaussian velocity profile for open-loop smooth moves.
//!
//! The profile samples a bell curve centered on the middle of the move and normalizes it one of
//! two ways (see [`ProfileNormalization`]):
//!
//! - `Cumulative`: value *i* is the fraction of the move that should be done after step *i*.
//!   The curve is non-decreasing and its last value is exactly 1.0.
//! - `Peak`: value *i* is the relay duty for step *i*. The largest value is exactly 1.0.

use crate::config::{ProfileConfig, ProfileNormalization};
use micromath::F32Ext;

/// Capacity of the profile buffer.
pub const MAX_STEPS: usize = 64;

/// A normalized, discretized Gaussian curve.
#[derive(Clone, Debug)]
pub struct MotionProfile {
    values: [f32; MAX_STEPS],
    len: usize,
    step_ms: u32,
    normalization: ProfileNormalization,
}

impl MotionProfile {
    /// Build the curve for `config`.
    pub fn new(config: &ProfileConfig) -> Self {
        let len = config.steps.clamp(1, MAX_STEPS);
        let timeframe_s = config.timeframe_ms as f32 / 1000.0;
        let dt = timeframe_s / len as f32;
        let mu = timeframe_s / 2.0;
        let two_sigma_sq = 2.0 * config.sigma_s * config.sigma_s;

        let mut values = [0.0f32; MAX_STEPS];
        for (i, v) in values.iter_mut().take(len).enumerate() {
            let t = i as f32 * dt;
            let x = t - mu;
            *v = if two_sigma_sq > 0.0 {
                F32Ext::exp(-(x * x) / two_sigma_sq)
            } else if i == len / 2 {
                1.0
            } else {
                0.0
            };
        }

        match config.normalization {
            ProfileNormalization::Cumulative => normalize_cumulative(&mut values[..len]),
            ProfileNormalization::Peak => normalize_peak(&mut values[..len]),
        }

        Self {
            values,
            len,
            step_ms: config.timeframe_ms / len as u32,
            normalization: config.normalization,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Duration of one step (ms).
    #[inline]
    pub fn step_ms(&self) -> u32 {
        self.step_ms
    }

    #[inline]
    pub fn normalization(&self) -> ProfileNormalization {
        self.normalization
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values[..self.len]
    }

    /// `(step_index, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.values().iter().copied().enumerate()
    }

    /// Value at `step`, or 0.0 past the end.
    #[inline]
    pub fn value(&self, step: usize) -> f32 {
        self.values().get(step).copied().unwrap_or(0.0)
    }

    /// Intermediate height (mm) the desk should have reached by the end of `step`.
    ///
    /// Meaningful for the `Cumulative` policy.
    pub fn step_target(&self, step: usize, start_mm: i32, delta_mm: i32) -> i32 {
        let fraction = self.value(step);
        start_mm + round_mm(fraction * delta_mm as f32)
    }

    /// On-time (ms) of the relay pulse for `step`.
    ///
    /// Meaningful for the `Peak` policy.
    pub fn pulse_ms(&self, step: usize) -> u32 {
        let on = self.value(step) * self.step_ms as f32;
        (on + 0.5) as u32
    }
}

fn normalize_cumulative(values: &mut [f32]) {
    let total: f32 = values.iter().sum();
    if total <= 0.0 {
        values.fill(1.0);
        return;
    }

    let mut running = 0.0;
    for v in values.iter_mut() {
        running += *v;
        *v = (running / total).min(1.0);
    }
    if let Some(last) = values.last_mut() {
        *last = 1.0;
    }
}

fn normalize_peak(values: &mut [f32]) {
    let peak = values.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        values.fill(1.0);
        return;
    }

    for v in values.iter_mut() {
        *v /= peak;
    }
}

fn round_mm(x: f32) -> i32 {
    if x < 0.0 {
        (x - 0.5) as i32
    } else {
        (x + 0.5) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(normalization: ProfileNormalization) -> MotionProfile {
        MotionProfile::new(&ProfileConfig::default().with_normalization(normalization))
    }

    #[test]
    fn cumulative_curve_is_monotonic_and_ends_at_one() {
        let p = profile(ProfileNormalization::Cumulative);
        assert_eq!(p.len(), 30);
        let values = p.values();
        for pair in values.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(*values.last().unwrap(), 1.0);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn cumulative_curve_is_half_done_near_midpoint() {
        let p = profile(ProfileNormalization::Cumulative);
        // Step 15 sits on the mean; about half the move is done either side of it.
        assert!(p.value(14) < 0.5 && p.value(15) > 0.5);
    }

    #[test]
    fn peak_curve_tops_out_at_one_in_the_middle() {
        let p = profile(ProfileNormalization::Peak);
        let values = p.values();
        let max = values.iter().copied().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);

        let peak_index = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_index, 15);
        assert!(values[0] < 0.05);
        assert!(values[29] < 0.1);
    }

    #[test]
    fn steps_span_the_timeframe() {
        let p = profile(ProfileNormalization::Peak);
        assert_eq!(p.step_ms(), 100);
        assert_eq!(p.step_ms() * p.len() as u32, 3_000);
        assert_eq!(p.pulse_ms(15), 100);
        assert_eq!(p.pulse_ms(99), 0);
    }

    #[test]
    fn step_targets_walk_from_start_to_target() {
        let p = profile(ProfileNormalization::Cumulative);
        assert_eq!(p.step_target(29, 700, 200), 900);
        assert_eq!(p.step_target(29, 900, -200), 700);
        let mid = p.step_target(15, 700, 200);
        assert!(mid > 780 && mid < 820);
    }

    #[test]
    fn iter_yields_indexed_values() {
        let p = profile(ProfileNormalization::Cumulative);
        let pairs: Vec<(usize, f32)> = p.iter().collect();
        assert_eq!(pairs.len(), 30);
        assert_eq!(pairs[0].0, 0);
        assert_eq!(pairs[29], (29, 1.0));
    }
}
