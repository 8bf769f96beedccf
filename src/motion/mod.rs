// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Motion
//!
//! Height control engine: the actuator and sensor contracts, motion requests, and the session
//! state machine that runs one request to completion.
//!
//! ## Modules
//!
//! - [`engine`] - [`MotionEngine`], the single owner of the actuator.
//! - [`session`] - Per-request state machine for the fixed, Gaussian, PID and jog strategies.

use core::fmt;

pub mod engine;
pub mod session;

pub use engine::MotionEngine;
pub use session::SessionReport;

/// Milliseconds from a free-running, wrapping clock.
pub type Millis = u32;

/// Time elapsed between two wrapping millisecond timestamps.
#[inline]
pub fn elapsed_ms(now: Millis, since: Millis) -> u32 {
    now.wrapping_sub(since)
}

/// `true` once `now` has reached `deadline` on a wrapping clock.
#[inline]
pub fn is_due(now: Millis, deadline: Millis) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Relay drive state of the lift.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Stopped,
    Up,
    Down,
}

impl Direction {
    /// Direction that reduces a signed height error (`target - current`).
    #[inline]
    pub fn toward(delta_mm: i32) -> Self {
        match delta_mm {
            d if d > 0 => Direction::Up,
            d if d < 0 => Direction::Down,
            _ => Direction::Stopped,
        }
    }

    /// Direction for a signed control output.
    #[inline]
    pub fn from_output(u: f32) -> Self {
        if u > 0.0 {
            Direction::Up
        } else if u < 0.0 {
            Direction::Down
        } else {
            Direction::Stopped
        }
    }

    /// +1 for up, -1 for down, 0 when stopped.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
            Direction::Stopped => 0,
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Stopped => Direction::Stopped,
        }
    }
}

/// Two-line lift drive.
///
/// Implementations must never energize both lines, and must hold both lines off for the
/// dead-time before energizing a line.
pub trait Actuator {
    /// De-energize both lines. Idempotent.
    fn stop(&mut self);

    /// Energize exactly one line. `Direction::Stopped` is the same as [`stop`](Self::stop).
    fn drive(&mut self, direction: Direction);

    /// Last commanded state.
    fn direction(&self) -> Direction;
}

/// One height sample.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeightReading {
    pub millimeters: i32,
    pub valid: bool,
}

impl HeightReading {
    pub const INVALID: HeightReading = HeightReading {
        millimeters: -1,
        valid: false,
    };

    /// Build a reading from a raw distance. Negative values are the sensor's fault sentinel.
    #[inline]
    pub fn from_mm(mm: i32) -> Self {
        if mm < 0 {
            Self::INVALID
        } else {
            Self {
                millimeters: mm,
                valid: true,
            }
        }
    }

    #[inline]
    pub fn get(&self) -> Option<i32> {
        self.valid.then_some(self.millimeters)
    }
}

/// Distance sensor pointed at the floor (or ceiling) giving the desk height.
pub trait HeightSensor {
    type Error: fmt::Debug;

    /// Take one distance sample in millimeters.
    fn read_distance(&mut self) -> Result<i32, Self::Error>;

    /// Take a sample, folding errors into an invalid reading.
    fn read(&mut self) -> HeightReading {
        match self.read_distance() {
            Ok(mm) => HeightReading::from_mm(mm),
            Err(e) => {
                log::debug!("height sensor unavailable: {:?}", e);
                HeightReading::INVALID
            }
        }
    }
}

/// How a session moves the desk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Drive at full speed until within tolerance or timed out.
    FixedTimeout,
    /// Pulse the relay along a precomputed bell curve.
    Gaussian,
    /// Closed-loop control on the height error.
    Pid,
    /// Manual move in one direction until stopped or timed out.
    Jog(Direction),
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FixedTimeout => "fixed",
            Strategy::Gaussian => "smooth",
            Strategy::Pid => "pid",
            Strategy::Jog(Direction::Up) => "jog_up",
            Strategy::Jog(Direction::Down) => "jog_down",
            Strategy::Jog(Direction::Stopped) => "jog",
        }
    }
}

/// A single request to move the desk. Consumed by [`MotionEngine::begin`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MotionRequest {
    pub target_mm: i32,
    pub strategy: Strategy,
    /// Overrides the strategy's configured timeout when set
    pub timeout_ms: Option<u32>,
}

impl MotionRequest {
    pub const fn new(target_mm: i32, strategy: Strategy) -> Self {
        Self {
            target_mm,
            strategy,
            timeout_ms: None,
        }
    }

    pub const fn fixed(target_mm: i32) -> Self {
        Self::new(target_mm, Strategy::FixedTimeout)
    }

    pub const fn gaussian(target_mm: i32) -> Self {
        Self::new(target_mm, Strategy::Gaussian)
    }

    pub const fn pid(target_mm: i32) -> Self {
        Self::new(target_mm, Strategy::Pid)
    }

    pub const fn jog(direction: Direction) -> Self {
        Self::new(0, Strategy::Jog(direction))
    }

    pub fn with_timeout_ms(mut self, ms: u32) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}

/// Why a session ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Within tolerance of the target.
    Reached,
    /// Already within tolerance at entry; nothing moved.
    AlreadyClose,
    /// Ran past its timeout.
    TimedOut,
    /// Sensor reports the desk went past the target.
    Overshot,
    /// Desk stopped making progress.
    Stalled,
    /// Gaussian profile finished without confirming the target.
    ProfileEnded,
    /// Jog hit the configured height limit.
    AtLimit,
    /// Stopped by a command.
    Cancelled,
    /// No height available at entry.
    SensorFault,
}

impl Outcome {
    /// Short token used in status messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Reached => "reached",
            Outcome::AlreadyClose => "no_change",
            Outcome::TimedOut => "timed_out",
            Outcome::Overshot => "overshoot",
            Outcome::Stalled => "stalled",
            Outcome::ProfileEnded => "profile_ended",
            Outcome::AtLimit => "at_limit",
            Outcome::Cancelled => "cancelled",
            Outcome::SensorFault => "sensor_fault",
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Reached | Outcome::AlreadyClose)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned when asking the engine to start a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MotionError {
    /// Another session owns the actuator.
    Busy,
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::Busy => f.write_str("busy: a move is already in progress"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the motion and scheduler tests.

    use super::*;
    use std::cell::{RefCell, RefMut};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Simulated desk: an actuator and a sensor sharing one height.
    ///
    /// The height only changes when the test advances simulated time with [`SimDesk::advance`].
    #[derive(Clone)]
    pub struct SimDesk {
        inner: Rc<RefCell<SimState>>,
    }

    pub struct SimState {
        pub position_mm: f32,
        pub direction: Direction,
        pub speed_mm_s: f32,
        /// Per-read failure flags; `true` fails that read
        pub failures: VecDeque<bool>,
        pub fail_all: bool,
        pub drives: u32,
        pub log: Vec<Direction>,
        pub both_on: bool,
    }

    impl SimDesk {
        pub fn new(height_mm: i32, speed_mm_s: f32) -> Self {
            Self {
                inner: Rc::new(RefCell::new(SimState {
                    position_mm: height_mm as f32,
                    direction: Direction::Stopped,
                    speed_mm_s,
                    failures: VecDeque::new(),
                    fail_all: false,
                    drives: 0,
                    log: Vec::new(),
                    both_on: false,
                })),
            }
        }

        pub fn state(&self) -> RefMut<'_, SimState> {
            self.inner.borrow_mut()
        }

        /// Move the desk for `dt_ms` at its current drive direction.
        pub fn advance(&self, dt_ms: u32) {
            let mut s = self.state();
            let step = s.direction.sign() as f32 * s.speed_mm_s * dt_ms as f32 / 1000.0;
            s.position_mm += step;
        }

        pub fn script_failures(&self, pattern: &[bool]) {
            self.state().failures.extend(pattern.iter().copied());
        }

        pub fn height(&self) -> i32 {
            self.inner.borrow().position_mm.round() as i32
        }

        pub fn direction(&self) -> Direction {
            self.inner.borrow().direction
        }

        pub fn drives(&self) -> u32 {
            self.inner.borrow().drives
        }

        pub fn log(&self) -> Vec<Direction> {
            self.inner.borrow().log.clone()
        }

        pub fn actuator(&self) -> SimActuator {
            SimActuator { desk: self.clone() }
        }

        pub fn sensor(&self) -> SimSensor {
            SimSensor { desk: self.clone() }
        }
    }

    pub struct SimActuator {
        desk: SimDesk,
    }

    impl Actuator for SimActuator {
        fn stop(&mut self) {
            let mut s = self.desk.state();
            s.direction = Direction::Stopped;
            s.log.push(Direction::Stopped);
        }

        fn drive(&mut self, direction: Direction) {
            if direction == Direction::Stopped {
                return self.stop();
            }
            let mut s = self.desk.state();
            if s.direction == direction {
                return;
            }
            if s.direction != Direction::Stopped {
                // Reversal without passing through stop would short the driver.
                s.both_on = true;
            }
            s.direction = direction;
            s.drives += 1;
            s.log.push(direction);
        }

        fn direction(&self) -> Direction {
            self.desk.direction()
        }
    }

    pub struct SimSensor {
        desk: SimDesk,
    }

    #[derive(Debug, PartialEq)]
    pub struct SimFault;

    impl HeightSensor for SimSensor {
        type Error = SimFault;

        fn read_distance(&mut self) -> Result<i32, SimFault> {
            let height = self.desk.height();
            let mut s = self.desk.state();
            let fail = s.fail_all || s.failures.pop_front().unwrap_or(false);
            if fail {
                Err(SimFault)
            } else {
                Ok(height)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_follows_error_sign() {
        assert_eq!(Direction::toward(215), Direction::Up);
        assert_eq!(Direction::toward(-3), Direction::Down);
        assert_eq!(Direction::toward(0), Direction::Stopped);
        assert_eq!(Direction::from_output(0.4), Direction::Up);
        assert_eq!(Direction::from_output(-1e-4), Direction::Down);
        assert_eq!(Direction::from_output(0.0), Direction::Stopped);
        assert_eq!(Direction::Up.opposite(), Direction::Down);
    }

    #[test]
    fn negative_distance_is_invalid() {
        assert_eq!(HeightReading::from_mm(-1).get(), None);
        assert_eq!(HeightReading::from_mm(742).get(), Some(742));
    }

    #[test]
    fn wrapping_deadlines() {
        assert!(is_due(100, 100));
        assert!(!is_due(99, 100));
        assert!(is_due(5, u32::MAX - 5));
        assert_eq!(elapsed_ms(5, u32::MAX - 4), 10);
    }

    #[test]
    fn outcome_tokens() {
        assert_eq!(Outcome::AlreadyClose.as_str(), "no_change");
        assert!(Outcome::Reached.is_success());
        assert!(!Outcome::TimedOut.is_success());
    }
}
