// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! PID controller for closed-loop height control.
//!
//! Works in `no_std` and does not allocate memory. A fresh controller is built for every motion
//! session; nothing is carried over between sessions.

/// Proportional, integral and derivative gains.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Gains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Gains {
    /// Error (mm) at which the base gains apply unscaled.
    pub const REFERENCE_ERROR_MM: f32 = 200.0;

    pub const BASE: Gains = Gains {
        kp: 0.02,
        ki: 0.001,
        kd: 0.01,
    };

    /// Gain multiplier for a session starting `initial_error` mm away from its target.
    ///
    /// Large moves get up to twice the base gains, short ones down to half.
    pub fn scale_for(initial_error: f32) -> f32 {
        let magnitude = if initial_error < 0.0 {
            -initial_error
        } else {
            initial_error
        };
        (magnitude / Self::REFERENCE_ERROR_MM).clamp(0.5, 2.0)
    }

    /// Base gains scaled by [`scale_for`](Self::scale_for).
    pub fn self_tuned(initial_error: f32) -> Self {
        let scale = Self::scale_for(initial_error);
        Self {
            kp: Self::BASE.kp * scale,
            ki: Self::BASE.ki * scale,
            kd: Self::BASE.kd * scale,
        }
    }
}

/// PID controller with integral anti-windup and optional derivative smoothing.
pub struct Pid {
    gains: Gains,

    /// Integrator state
    integral: f32,
    /// Anti-windup clamp, symmetric around zero
    integral_limit: f32,

    /// Error from the previous call (for derivative term)
    prev_error: f32,
    /// Filtered derivative
    derivative: f32,
    /// Weight of the newest derivative sample, 1.0 = no filtering
    derivative_alpha: f32,
}

impl Pid {
    /// Create a new PID controller.
    pub fn new(gains: Gains, integral_limit: f32) -> Self {
        Self {
            gains,
            integral: 0.0,
            integral_limit: if integral_limit < 0.0 {
                -integral_limit
            } else {
                integral_limit
            },
            prev_error: 0.0,
            derivative: 0.0,
            derivative_alpha: 1.0,
        }
    }

    /// Controller for a session starting `initial_error` mm from target.
    ///
    /// The previous error is seeded with the initial error so the first derivative sample
    /// reflects motion rather than the jump from zero.
    pub fn self_tuned(initial_error: f32, integral_limit: f32) -> Self {
        let mut pid = Self::new(Gains::self_tuned(initial_error), integral_limit);
        pid.prev_error = initial_error;
        pid
    }

    /// Set the derivative smoothing weight in `[0, 1]`.
    pub fn with_derivative_alpha(mut self, alpha: f32) -> Self {
        self.derivative_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    #[inline]
    pub fn gains(&self) -> Gains {
        self.gains
    }

    #[inline]
    pub fn integral(&self) -> f32 {
        self.integral
    }

    #[inline]
    pub fn integral_limit(&self) -> f32 {
        self.integral_limit
    }

    #[inline]
    pub fn prev_error(&self) -> f32 {
        self.prev_error
    }

    /// Update the controller.
    ///
    /// `error` — setpoint minus measurement (mm)
    /// `dt` — seconds since the previous call
    ///
    /// Returns the signed control output; only its sign is used to pick a relay direction.
    pub fn compute(&mut self, error: f32, dt: f32) -> f32 {
        // ----- I term -----
        self.integral = (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);

        // ----- D term -----
        let raw = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };
        self.derivative = self.derivative_alpha * raw + (1.0 - self.derivative_alpha) * self.derivative;
        self.prev_error = error;

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * self.derivative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn gain_scale_follows_initial_error() {
        assert_eq!(Gains::scale_for(200.0), 1.0);
        assert_eq!(Gains::scale_for(-200.0), 1.0);
        assert_eq!(Gains::scale_for(50.0), 0.5);
        assert_eq!(Gains::scale_for(1000.0), 2.0);
        assert_eq!(Gains::scale_for(300.0), 1.5);
    }

    #[test]
    fn self_tuned_gains_at_reference_error() {
        let g = Gains::self_tuned(200.0);
        assert!(close(g.kp, 0.02));
        assert!(close(g.ki, 0.001));
        assert!(close(g.kd, 0.01));

        let g = Gains::self_tuned(1000.0);
        assert!(close(g.kp, 0.04));
        assert!(close(g.kd, 0.02));
    }

    #[test]
    fn compute_matches_textbook_terms() {
        let mut pid = Pid::new(
            Gains {
                kp: 1.0,
                ki: 0.5,
                kd: 0.25,
            },
            100.0,
        );
        // integral = 2, derivative = (10 - 0) / 0.2 = 50
        let out = pid.compute(10.0, 0.2);
        assert!(close(out, 10.0 + 1.0 + 12.5));
        assert!(close(pid.prev_error(), 10.0));

        // integral = 2 + 1 = 3, derivative = (5 - 10) / 0.2 = -25
        let out = pid.compute(5.0, 0.2);
        assert!(close(out, 5.0 + 1.5 - 6.25));
    }

    #[test]
    fn zero_dt_skips_derivative() {
        let mut pid = Pid::new(
            Gains {
                kp: 0.0,
                ki: 0.0,
                kd: 1.0,
            },
            10.0,
        );
        assert_eq!(pid.compute(50.0, 0.0), 0.0);
    }

    #[test]
    fn integral_never_leaves_limits() {
        let mut pid = Pid::new(Gains::BASE, 25.0);
        let errors = [400.0, 400.0, -900.0, 3.0, 1e6, -1e6, 0.0, 12.5, -0.1];
        for (i, e) in errors.iter().cycle().take(200).enumerate() {
            let dt = 0.05 + (i % 7) as f32 * 0.1;
            pid.compute(*e, dt);
            assert!(pid.integral() <= 25.0 && pid.integral() >= -25.0);
        }
    }

    #[test]
    fn self_tuned_seeds_previous_error() {
        let mut pid = Pid::self_tuned(200.0, 500.0);
        assert_eq!(pid.prev_error(), 200.0);
        // Same error again: derivative is zero, output is P + I only.
        let out = pid.compute(200.0, 0.1);
        assert!(close(out, 0.02 * 200.0 + 0.001 * 20.0));
    }

    #[test]
    fn smoothing_blends_derivative() {
        let mut pid = Pid::new(
            Gains {
                kp: 0.0,
                ki: 0.0,
                kd: 1.0,
            },
            10.0,
        )
        .with_derivative_alpha(0.5);
        // raw derivative 10 → filtered 5
        assert!(close(pid.compute(1.0, 0.1), 5.0));
        // raw derivative 0 → filtered 2.5
        assert!(close(pid.compute(1.0, 0.1), 2.5));
    }

    #[test]
    fn negative_limit_is_treated_as_magnitude() {
        let pid = Pid::new(Gains::BASE, -40.0);
        assert_eq!(pid.integral_limit(), 40.0);
    }
}
