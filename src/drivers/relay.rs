// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Two-relay lift drive.
//!
//! One relay raises the desk, the other lowers it. Both lines are always switched off, then held
//! off for the dead-time, before either line is switched on.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::motion::{Actuator, Direction};

/// Whether a relay coil is energized by driving its line high or low.
///
/// Most opto-isolated relay boards are active-low.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActiveLevel {
    High,
    Low,
}

pub struct RelayPair<UP: OutputPin, DOWN: OutputPin, D: DelayNs> {
    up: UP,
    down: DOWN,
    delay: D,
    active: ActiveLevel,
    dead_time_ms: u32,
    direction: Direction,
}

impl<UP: OutputPin, DOWN: OutputPin, D: DelayNs> RelayPair<UP, DOWN, D> {
    /// Create the drive with both relays released.
    pub fn new(up: UP, down: DOWN, delay: D, active: ActiveLevel, dead_time_ms: u32) -> Self {
        let mut relays = Self {
            up,
            down,
            delay,
            active,
            dead_time_ms,
            direction: Direction::Stopped,
        };
        relays.release_both();
        relays
    }

    pub fn active_high(up: UP, down: DOWN, delay: D, dead_time_ms: u32) -> Self {
        Self::new(up, down, delay, ActiveLevel::High, dead_time_ms)
    }

    pub fn active_low(up: UP, down: DOWN, delay: D, dead_time_ms: u32) -> Self {
        Self::new(up, down, delay, ActiveLevel::Low, dead_time_ms)
    }

    #[inline]
    pub fn dead_time_ms(&self) -> u32 {
        self.dead_time_ms
    }

    pub fn free(mut self) -> (UP, DOWN, D) {
        self.release_both();
        (self.up, self.down, self.delay)
    }

    fn release_both(&mut self) {
        set_line(&mut self.up, self.active, false);
        set_line(&mut self.down, self.active, false);
    }
}

fn set_line<P: OutputPin>(pin: &mut P, active: ActiveLevel, on: bool) {
    match (active, on) {
        (ActiveLevel::High, true) | (ActiveLevel::Low, false) => pin.set_high().ok(),
        (ActiveLevel::High, false) | (ActiveLevel::Low, true) => pin.set_low().ok(),
    };
}

impl<UP: OutputPin, DOWN: OutputPin, D: DelayNs> Actuator for RelayPair<UP, DOWN, D> {
    fn stop(&mut self) {
        self.release_both();
        self.direction = Direction::Stopped;
    }

    fn drive(&mut self, direction: Direction) {
        if direction == self.direction {
            return;
        }

        self.stop();
        if direction == Direction::Stopped {
            return;
        }

        self.delay.delay_ms(self.dead_time_ms);
        match direction {
            Direction::Up => set_line(&mut self.up, self.active, true),
            Direction::Down => set_line(&mut self.down, self.active, true),
            Direction::Stopped => {}
        }
        self.direction = direction;
        log::debug!("relay {:?}", direction);
    }

    #[inline]
    fn direction(&self) -> Direction {
        self.direction
    }
}
