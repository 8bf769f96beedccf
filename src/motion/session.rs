// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Resumable motion session.
//!
//! A session is created by [`Session::enter`], which performs the entry check, and is then
//! advanced one step per scheduler tick with [`Session::advance`] until it reports an
//! [`Outcome`]. A session never sleeps: every wait is a deadline compared against the tick time.
//!
//! ```text
//! Entry ──► Moving ──► Reached | TimedOut | Overshot | Stalled | ProfileEnded | AtLimit
//!   │                                        │
//!   └──► AlreadyClose | SensorFault          └──► (engine calls stop())
//! ```

use crate::config::{DeskConfig, ProfileNormalization, StallGuard};
use crate::control::{MotionProfile, Pid};
use crate::motion::{
    elapsed_ms, is_due, Actuator, Direction, HeightSensor, Millis, MotionRequest, Outcome,
    Strategy,
};

/// Summary of a finished session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub request: MotionRequest,
    /// Height at entry, if it could be read
    pub start_mm: Option<i32>,
    /// Last valid height seen by the session
    pub final_mm: Option<i32>,
    pub outcome: Outcome,
    pub elapsed_ms: u32,
    /// Number of times a relay line was energized
    pub pulses: u32,
}

/// Result of the entry check.
pub enum Entry {
    /// The session is running and owns the actuator.
    Moving(Session),
    /// The session ended at entry without moving.
    Done(SessionReport),
}

pub struct Session {
    request: MotionRequest,
    started_at: Millis,
    start_mm: Option<i32>,
    last_mm: Option<i32>,
    timeout_ms: u32,
    pulses: u32,
    state: State,
}

enum State {
    Fixed(Fixed),
    Gaussian(Gaussian),
    Pid(PidLoop),
    Jog(Jog),
}

struct Fixed {
    direction: Direction,
    next_sample: Millis,
    stall: Option<StallWatch>,
}

struct StallWatch {
    guard: StallGuard,
    window_start: Millis,
    window_mm: i32,
    failures: u8,
}

struct Gaussian {
    profile: MotionProfile,
    direction: Direction,
    delta_mm: i32,
    step: usize,
    step_target_mm: i32,
    pulse_on: bool,
    pulse_end: Millis,
    next_guard: Millis,
}

struct PidLoop {
    pid: Pid,
    error: f32,
    direction: Direction,
    last_sample: Millis,
    next_sample: Millis,
}

struct Jog {
    direction: Direction,
    next_sample: Millis,
}

impl Session {
    /// Run the entry check for `request` and, if motion is needed, start it.
    ///
    /// `request.target_mm` must already be clamped to the configured height range.
    pub fn enter<A, S>(
        request: MotionRequest,
        now: Millis,
        actuator: &mut A,
        sensor: &mut S,
        config: &DeskConfig,
    ) -> Entry
    where
        A: Actuator,
        S: HeightSensor,
    {
        let motion = &config.motion;
        let reading = sensor.read().get();

        let done = |outcome: Outcome| {
            Entry::Done(SessionReport {
                request,
                start_mm: reading,
                final_mm: reading,
                outcome,
                elapsed_ms: 0,
                pulses: 0,
            })
        };

        let (state, timeout_ms) = match request.strategy {
            Strategy::Jog(Direction::Stopped) => return done(Outcome::Cancelled),

            Strategy::Jog(direction) => {
                if let Some(mm) = reading {
                    if at_limit(mm, direction, config) {
                        return done(Outcome::AtLimit);
                    }
                }
                let state = State::Jog(Jog {
                    direction,
                    next_sample: now.wrapping_add(motion.sample_interval_ms),
                });
                (state, request.timeout_ms.unwrap_or(motion.jog_timeout_ms))
            }

            strategy => {
                let Some(current) = reading else {
                    log::error!("no height at entry, aborting {} move", strategy.as_str());
                    return done(Outcome::SensorFault);
                };

                let delta = request.target_mm - current;
                // A smooth move within its tolerance band, edge included, has nothing to do.
                let already_close = match strategy {
                    Strategy::Gaussian => delta.abs() <= motion.profile_tolerance_mm,
                    _ => delta.abs() < motion.tolerance_mm,
                };
                if already_close {
                    return done(Outcome::AlreadyClose);
                }

                match strategy {
                    Strategy::Gaussian => {
                        let profile = MotionProfile::new(&config.profile);
                        let state = State::Gaussian(Gaussian {
                            profile,
                            direction: Direction::toward(delta),
                            delta_mm: delta,
                            step: 0,
                            step_target_mm: current,
                            pulse_on: false,
                            pulse_end: now,
                            next_guard: now,
                        });
                        (state, request.timeout_ms.unwrap_or(config.profile.timeframe_ms))
                    }
                    Strategy::Pid => {
                        let pid = Pid::self_tuned(delta as f32, config.pid.integral_limit)
                            .with_derivative_alpha(config.pid.derivative_alpha);
                        let state = State::Pid(PidLoop {
                            pid,
                            error: delta as f32,
                            direction: Direction::Stopped,
                            last_sample: now,
                            next_sample: now,
                        });
                        (state, request.timeout_ms.unwrap_or(motion.pid_timeout_ms))
                    }
                    _ => {
                        let stall = motion.stall.map(|guard| StallWatch {
                            guard,
                            window_start: now,
                            window_mm: current,
                            failures: 0,
                        });
                        let state = State::Fixed(Fixed {
                            direction: Direction::toward(delta),
                            next_sample: now.wrapping_add(motion.sample_interval_ms),
                            stall,
                        });
                        (state, request.timeout_ms.unwrap_or(motion.fixed_timeout_ms))
                    }
                }
            }
        };

        let mut session = Session {
            request,
            started_at: now,
            start_mm: reading,
            last_mm: reading,
            timeout_ms,
            pulses: 0,
            state,
        };
        session.start(now, actuator, sensor);
        Entry::Moving(session)
    }

    #[inline]
    pub fn request(&self) -> &MotionRequest {
        &self.request
    }

    #[inline]
    pub fn last_mm(&self) -> Option<i32> {
        self.last_mm
    }

    /// Point a running jog in a new direction and restart its timeout.
    ///
    /// Returns `false` when this session is not a jog.
    pub fn redirect_jog<A: Actuator>(
        &mut self,
        direction: Direction,
        now: Millis,
        actuator: &mut A,
    ) -> bool {
        let State::Jog(jog) = &mut self.state else {
            return false;
        };
        jog.direction = direction;
        self.request.strategy = Strategy::Jog(direction);
        self.started_at = now;
        self.energize(actuator, direction);
        true
    }

    /// Advance the session by one scheduler tick.
    ///
    /// Returns the outcome once the session is finished. The caller must then stop the actuator
    /// and drop the session.
    pub fn advance<A, S>(
        &mut self,
        now: Millis,
        actuator: &mut A,
        sensor: &mut S,
        config: &DeskConfig,
    ) -> Option<Outcome>
    where
        A: Actuator,
        S: HeightSensor,
    {
        match self.state {
            State::Fixed(_) => self.advance_fixed(now, sensor, config),
            State::Gaussian(_) => self.advance_gaussian(now, actuator, sensor, config),
            State::Pid(_) => self.advance_pid(now, actuator, sensor, config),
            State::Jog(_) => self.advance_jog(now, sensor, config),
        }
    }

    /// Build the report for a session ending with `outcome` at `now`.
    pub fn finish(&self, outcome: Outcome, now: Millis) -> SessionReport {
        SessionReport {
            request: self.request,
            start_mm: self.start_mm,
            final_mm: self.last_mm,
            outcome,
            elapsed_ms: elapsed_ms(now, self.started_at),
            pulses: self.pulses,
        }
    }

    fn timed_out(&self, now: Millis) -> bool {
        elapsed_ms(now, self.started_at) > self.timeout_ms
    }

    /// Change the relay state, always passing through stop before a reversal.
    fn energize<A: Actuator>(&mut self, actuator: &mut A, direction: Direction) {
        let current = actuator.direction();
        if current == direction {
            return;
        }
        if direction == Direction::Stopped {
            actuator.stop();
            return;
        }
        if current != Direction::Stopped {
            actuator.stop();
        }
        actuator.drive(direction);
        self.pulses += 1;
    }

    /// First actuator command after a successful entry.
    fn start<A: Actuator, S: HeightSensor>(&mut self, now: Millis, actuator: &mut A, sensor: &mut S) {
        match &self.state {
            State::Fixed(fixed) => {
                let direction = fixed.direction;
                self.energize(actuator, direction);
            }
            State::Jog(jog) => {
                let direction = jog.direction;
                self.energize(actuator, direction);
            }
            State::Gaussian(_) => self.begin_step(0, now, actuator, sensor),
            // The loop decides its first direction on its first sample.
            State::Pid(_) => {}
        }
    }

    fn advance_fixed<S: HeightSensor>(
        &mut self,
        now: Millis,
        sensor: &mut S,
        config: &DeskConfig,
    ) -> Option<Outcome> {
        let State::Fixed(fixed) = &mut self.state else {
            return None;
        };

        if is_due(now, fixed.next_sample) {
            fixed.next_sample = now.wrapping_add(config.motion.sample_interval_ms);

            if let Some(current) = sensor.read().get() {
                self.last_mm = Some(current);
                let diff = self.request.target_mm - current;

                if diff.abs() <= config.motion.tolerance_mm {
                    return Some(Outcome::Reached);
                }
                if Direction::toward(diff) != fixed.direction {
                    log::warn!(
                        "overshoot: at {} mm moving {:?} toward {} mm",
                        current,
                        fixed.direction,
                        self.request.target_mm
                    );
                    return Some(Outcome::Overshot);
                }
                if let Some(watch) = fixed.stall.as_mut() {
                    if watch.check(now, current, fixed.direction) {
                        return Some(Outcome::Stalled);
                    }
                }
            }
        }

        if self.timed_out(now) {
            return Some(Outcome::TimedOut);
        }
        None
    }

    fn advance_gaussian<A, S>(
        &mut self,
        now: Millis,
        actuator: &mut A,
        sensor: &mut S,
        config: &DeskConfig,
    ) -> Option<Outcome>
    where
        A: Actuator,
        S: HeightSensor,
    {
        let State::Gaussian(g) = &self.state else {
            return None;
        };
        let step_ms = g.profile.step_ms().max(1);
        let len = g.profile.len();
        let current_step = g.step;

        let due_step = (elapsed_ms(now, self.started_at) / step_ms) as usize;
        if due_step >= len || self.timed_out(now) {
            self.energize(actuator, Direction::Stopped);
            if let Some(mm) = sensor.read().get() {
                self.last_mm = Some(mm);
            }
            let close = self
                .last_mm
                .map(|mm| (self.request.target_mm - mm).abs() <= config.motion.profile_tolerance_mm)
                .unwrap_or(false);
            return Some(if close {
                Outcome::Reached
            } else {
                Outcome::ProfileEnded
            });
        }

        if due_step != current_step {
            self.begin_step(due_step, now, actuator, sensor);
            return None;
        }

        let guard_interval = config.profile.guard_interval_ms;
        let State::Gaussian(g) = &mut self.state else {
            return None;
        };
        if !g.pulse_on {
            return None;
        }

        match g.profile.normalization() {
            ProfileNormalization::Peak => {
                if is_due(now, g.pulse_end) {
                    g.pulse_on = false;
                    self.energize(actuator, Direction::Stopped);
                }
            }
            ProfileNormalization::Cumulative => {
                if is_due(now, g.next_guard) {
                    g.next_guard = now.wrapping_add(guard_interval);
                    let reading = sensor.read().get();
                    let State::Gaussian(g) = &mut self.state else {
                        return None;
                    };
                    if let Some(mm) = reading {
                        self.last_mm = Some(mm);
                        if passed(mm, g.step_target_mm, g.direction) {
                            g.pulse_on = false;
                            self.energize(actuator, Direction::Stopped);
                        }
                    }
                }
            }
        }
        None
    }

    /// Start profile step `step`: decide whether the relay is on for it.
    fn begin_step<A: Actuator, S: HeightSensor>(
        &mut self,
        step: usize,
        now: Millis,
        actuator: &mut A,
        sensor: &mut S,
    ) {
        let start_mm = self.start_mm.unwrap_or(self.request.target_mm);
        let State::Gaussian(g) = &mut self.state else {
            return;
        };
        g.step = step;
        let direction = g.direction;

        let on = match g.profile.normalization() {
            ProfileNormalization::Peak => {
                let pulse_ms = g.profile.pulse_ms(step);
                g.pulse_end = now.wrapping_add(pulse_ms);
                pulse_ms > 0
            }
            ProfileNormalization::Cumulative => {
                g.step_target_mm = g.profile.step_target(step, start_mm, g.delta_mm);
                g.next_guard = now;
                let target = g.step_target_mm;
                match sensor.read().get() {
                    Some(mm) => {
                        self.last_mm = Some(mm);
                        !passed(mm, target, direction)
                    }
                    None => true,
                }
            }
        };

        if let State::Gaussian(g) = &mut self.state {
            g.pulse_on = on;
        }
        self.energize(actuator, if on { direction } else { Direction::Stopped });
    }

    fn advance_pid<A, S>(
        &mut self,
        now: Millis,
        actuator: &mut A,
        sensor: &mut S,
        config: &DeskConfig,
    ) -> Option<Outcome>
    where
        A: Actuator,
        S: HeightSensor,
    {
        let State::Pid(pl) = &mut self.state else {
            return None;
        };
        if !is_due(now, pl.next_sample) {
            return if self.timed_out(now) {
                Some(Outcome::TimedOut)
            } else {
                None
            };
        }

        let dt = elapsed_ms(now, pl.last_sample) as f32 / 1000.0;
        pl.last_sample = now;
        pl.next_sample = now.wrapping_add(config.motion.sample_interval_ms);

        // A failed read keeps the previous error.
        if let Some(current) = sensor.read().get() {
            self.last_mm = Some(current);
            pl.error = (self.request.target_mm - current) as f32;
        }

        let tolerance = config.motion.pid_tolerance_mm as f32;
        if pl.error <= tolerance && pl.error >= -tolerance {
            return Some(Outcome::Reached);
        }

        let output = pl.pid.compute(pl.error, dt);
        let direction = Direction::from_output(output);
        let changed = direction != pl.direction;
        pl.direction = direction;

        if self.timed_out(now) {
            return Some(Outcome::TimedOut);
        }
        if changed {
            self.energize(actuator, direction);
        }
        None
    }

    fn advance_jog<S: HeightSensor>(
        &mut self,
        now: Millis,
        sensor: &mut S,
        config: &DeskConfig,
    ) -> Option<Outcome> {
        let State::Jog(jog) = &mut self.state else {
            return None;
        };

        if is_due(now, jog.next_sample) {
            jog.next_sample = now.wrapping_add(config.motion.sample_interval_ms);
            let direction = jog.direction;
            if let Some(mm) = sensor.read().get() {
                self.last_mm = Some(mm);
                if at_limit(mm, direction, config) {
                    return Some(Outcome::AtLimit);
                }
            }
        }

        if self.timed_out(now) {
            return Some(Outcome::TimedOut);
        }
        None
    }
}

impl StallWatch {
    /// Feed one sample; returns `true` once the desk is considered stalled.
    fn check(&mut self, now: Millis, current_mm: i32, direction: Direction) -> bool {
        let window = elapsed_ms(now, self.window_start);
        if window < self.guard.window_ms || window == 0 {
            return false;
        }

        let moved = (current_mm - self.window_mm) * direction.sign();
        let speed = moved as f32 * 1000.0 / window as f32;
        self.window_start = now;
        self.window_mm = current_mm;

        if speed < self.guard.min_speed_mm_s {
            self.failures = self.failures.saturating_add(1);
            log::debug!("slow window: {} mm/s ({} of {})", speed, self.failures, self.guard.tries);
        } else {
            self.failures = 0;
        }
        self.failures >= self.guard.tries
    }
}

/// `true` when `current_mm` is at or beyond `target_mm` in the direction of travel.
fn passed(current_mm: i32, target_mm: i32, direction: Direction) -> bool {
    match direction {
        Direction::Up => current_mm >= target_mm,
        Direction::Down => current_mm <= target_mm,
        Direction::Stopped => true,
    }
}

fn at_limit(current_mm: i32, direction: Direction, config: &DeskConfig) -> bool {
    match direction {
        Direction::Up => current_mm >= config.max_height_mm,
        Direction::Down => current_mm <= config.min_height_mm,
        Direction::Stopped => false,
    }
}
