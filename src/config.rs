// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Desk Configuration
//!
//! All tunables for the height control engine live here. Every struct has a `Default` matching
//! the stock desk frame and `with_*` builders for overriding individual values:
//!
//! ```no_run
//! use desklift::config::{DeskConfig, MotionConfig};
//!
//! let config = DeskConfig::default()
//!     .with_height_limits(670, 1150)
//!     .with_motion(MotionConfig::default().with_fixed_timeout_ms(20_000));
//! ```

/// Top-level configuration handed to the scheduler and motion engine.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DeskConfig {
    /// Lowest height (mm) a target may request
    pub min_height_mm: i32,
    /// Highest height (mm) a target may request
    pub max_height_mm: i32,

    pub motion: MotionConfig,
    pub pid: PidConfig,
    pub profile: ProfileConfig,
    pub scheduler: SchedulerConfig,
    pub remote: RemoteConfig,
}

impl DeskConfig {
    pub const fn new() -> Self {
        Self {
            min_height_mm: 685,
            max_height_mm: 1100,
            motion: MotionConfig::new(),
            pid: PidConfig::new(),
            profile: ProfileConfig::new(),
            scheduler: SchedulerConfig::new(),
            remote: RemoteConfig::new(),
        }
    }

    /// Set the allowed target range (mm).
    pub fn with_height_limits(mut self, min_mm: i32, max_mm: i32) -> Self {
        self.min_height_mm = min_mm.min(max_mm);
        self.max_height_mm = max_mm.max(min_mm);
        self
    }

    pub fn with_motion(mut self, motion: MotionConfig) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_pid(mut self, pid: PidConfig) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_profile(mut self, profile: ProfileConfig) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }

    /// Clamp a requested target into the configured height range.
    #[inline]
    pub fn clamp_target(&self, target_mm: i32) -> i32 {
        target_mm.clamp(self.min_height_mm, self.max_height_mm)
    }
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing and tolerance settings shared by the motion strategies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MotionConfig {
    /// Deadband for the fixed and PID entry checks, and the fixed-strategy exit (mm)
    pub tolerance_mm: i32,
    /// Deadband for the Gaussian entry check and final verdict (mm)
    pub profile_tolerance_mm: i32,
    /// Exit deadband for the PID loop (mm)
    pub pid_tolerance_mm: i32,

    /// Sensor cadence for the fixed and PID strategies
    pub sample_interval_ms: u32,

    pub fixed_timeout_ms: u32,
    pub pid_timeout_ms: u32,
    /// Longest a manual up/down jog may run without a stop
    pub jog_timeout_ms: u32,

    /// Relay changeover delay
    pub dead_time_ms: u32,

    /// Stall detection for the fixed strategy, off by default
    pub stall: Option<StallGuard>,
}

impl MotionConfig {
    pub const fn new() -> Self {
        Self {
            tolerance_mm: 10,
            profile_tolerance_mm: 5,
            pid_tolerance_mm: 3,
            sample_interval_ms: 100,
            fixed_timeout_ms: 15_000,
            pid_timeout_ms: 3_000,
            jog_timeout_ms: 15_000,
            dead_time_ms: 10,
            stall: None,
        }
    }

    pub fn with_tolerance_mm(mut self, mm: i32) -> Self {
        self.tolerance_mm = mm;
        self
    }

    pub fn with_sample_interval_ms(mut self, ms: u32) -> Self {
        self.sample_interval_ms = ms.max(1);
        self
    }

    pub fn with_fixed_timeout_ms(mut self, ms: u32) -> Self {
        self.fixed_timeout_ms = ms;
        self
    }

    pub fn with_pid_timeout_ms(mut self, ms: u32) -> Self {
        self.pid_timeout_ms = ms;
        self
    }

    pub fn with_jog_timeout_ms(mut self, ms: u32) -> Self {
        self.jog_timeout_ms = ms;
        self
    }

    pub fn with_dead_time_ms(mut self, ms: u32) -> Self {
        self.dead_time_ms = ms;
        self
    }

    pub fn with_stall_guard(mut self, stall: StallGuard) -> Self {
        self.stall = Some(stall);
        self
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Stop a fixed-strategy session when the desk stops making progress.
///
/// Speed is measured once per `window_ms`. A window counts as failed when the desk moved slower
/// than `min_speed_mm_s` or in the wrong direction; `tries` consecutive failures end the
/// session.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StallGuard {
    pub window_ms: u32,
    pub min_speed_mm_s: f32,
    pub tries: u8,
}

impl Default for StallGuard {
    fn default() -> Self {
        Self {
            window_ms: 500,
            min_speed_mm_s: 5.0,
            tries: 3,
        }
    }
}

/// PID limits. Gains are not configured here: they are derived from the initial error of each
/// session (see [`crate::control::pid::Gains::self_tuned`]).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PidConfig {
    /// Anti-windup clamp on the accumulated integral (mm·s)
    pub integral_limit: f32,
    /// Derivative low-pass weight of the newest sample; 1.0 disables smoothing
    pub derivative_alpha: f32,
}

impl PidConfig {
    pub const fn new() -> Self {
        Self {
            integral_limit: 500.0,
            derivative_alpha: 1.0,
        }
    }

    pub fn with_integral_limit(mut self, limit: f32) -> Self {
        self.integral_limit = limit.abs();
        self
    }

    pub fn with_derivative_alpha(mut self, alpha: f32) -> Self {
        self.derivative_alpha = alpha.clamp(0.0, 1.0);
        self
    }
}

impl Default for PidConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How the Gaussian density is turned into a per-step command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProfileNormalization {
    /// Running sum scaled to end at 1.0; each value is the fraction of the move that should be
    /// complete by that step.
    Cumulative,

    /// Density scaled so its peak is 1.0; each value is the relay duty for that step.
    Peak,
}

/// Gaussian velocity profile settings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProfileConfig {
    pub steps: usize,
    pub timeframe_ms: u32,
    /// Standard deviation of the bell, in seconds
    pub sigma_s: f32,
    pub normalization: ProfileNormalization,
    /// Sensor cadence for the overshoot guard while a pulse is on
    pub guard_interval_ms: u32,
}

impl ProfileConfig {
    pub const fn new() -> Self {
        Self {
            steps: 30,
            timeframe_ms: 3_000,
            sigma_s: 0.5,
            normalization: ProfileNormalization::Cumulative,
            guard_interval_ms: 20,
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps.clamp(1, crate::control::profile::MAX_STEPS);
        self
    }

    pub fn with_timeframe_ms(mut self, ms: u32) -> Self {
        self.timeframe_ms = ms;
        self
    }

    pub fn with_normalization(mut self, normalization: ProfileNormalization) -> Self {
        self.normalization = normalization;
        self
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Task periods for the cooperative scheduler.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub command_poll_ms: u32,
    pub remote_poll_ms: u32,
    pub telemetry_interval_ms: u32,
    /// Period of `move <height>` progress messages while a session runs
    pub progress_interval_ms: u32,
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        Self {
            command_poll_ms: 100,
            remote_poll_ms: 100,
            telemetry_interval_ms: 5_000,
            progress_interval_ms: 1_000,
        }
    }

    pub fn with_telemetry_interval_ms(mut self, ms: u32) -> Self {
        self.telemetry_interval_ms = ms;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Pub/sub topics and identity. Broker address and credentials belong to the link itself.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RemoteConfig {
    pub client_id: &'static str,
    pub command_topic: &'static str,
    pub height_topic: &'static str,
    pub status_topic: &'static str,
}

impl RemoteConfig {
    pub const fn new() -> Self {
        Self {
            client_id: "desklift",
            command_topic: "desk/cmd",
            height_topic: "desk/height",
            status_topic: "desk/status",
        }
    }

    pub fn with_topics(
        mut self,
        command: &'static str,
        height: &'static str,
        status: &'static str,
    ) -> Self {
        self.command_topic = command;
        self.height_topic = height;
        self.status_topic = status;
        self
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_frame() {
        let cfg = DeskConfig::default();
        assert_eq!((cfg.min_height_mm, cfg.max_height_mm), (685, 1100));
        assert_eq!(cfg.motion.tolerance_mm, 10);
        assert_eq!(cfg.motion.profile_tolerance_mm, 5);
        assert_eq!(cfg.motion.pid_tolerance_mm, 3);
        assert_eq!(cfg.motion.fixed_timeout_ms, 15_000);
        assert_eq!(cfg.motion.pid_timeout_ms, 3_000);
        assert_eq!(cfg.motion.dead_time_ms, 10);
        assert_eq!(cfg.profile.steps, 30);
        assert_eq!(cfg.profile.timeframe_ms, 3_000);
        assert_eq!(cfg.scheduler.telemetry_interval_ms, 5_000);
        assert!(cfg.motion.stall.is_none());
    }

    #[test]
    fn targets_are_clamped_to_limits() {
        let cfg = DeskConfig::default();
        assert_eq!(cfg.clamp_target(2000), 1100);
        assert_eq!(cfg.clamp_target(10), 685);
        assert_eq!(cfg.clamp_target(900), 900);
    }

    #[test]
    fn swapped_limits_are_reordered() {
        let cfg = DeskConfig::default().with_height_limits(1150, 670);
        assert_eq!((cfg.min_height_mm, cfg.max_height_mm), (670, 1150));
    }

    #[test]
    fn profile_steps_stay_in_buffer() {
        let p = ProfileConfig::default().with_steps(10_000);
        assert_eq!(p.steps, crate::control::profile::MAX_STEPS);
        assert_eq!(ProfileConfig::default().with_steps(0).steps, 1);
    }
}
