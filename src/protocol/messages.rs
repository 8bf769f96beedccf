// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Text command set shared by the serial console and the remote command topic.
//!
//! | Input                        | Command                    |
//! |------------------------------|----------------------------|
//! | `u`, `up`                    | [`Command::Up`]            |
//! | `d`, `down`                  | [`Command::Down`]          |
//! | `s`, `stop`                  | [`Command::Stop`]          |
//! | `h`, `range`, `height`       | [`Command::Height`]        |
//! | `move <mm>`, `adjust <mm>`   | [`Command::MoveFixed`]     |
//! | `move_smooth <mm>`           | [`Command::MoveSmooth`]    |
//! | `move_pid <mm>`              | [`Command::MovePid`]       |

use crate::motion::{Direction, MotionRequest};

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Jog up until stopped or timed out
    Up,
    /// Jog down until stopped or timed out
    Down,
    /// Stop any motion
    Stop,
    /// Report the current height
    Height,
    MoveFixed(i32),
    MoveSmooth(i32),
    MovePid(i32),
}

impl Command {
    /// Motion request this command starts, if any.
    pub fn motion_request(&self) -> Option<MotionRequest> {
        match *self {
            Command::Up => Some(MotionRequest::jog(Direction::Up)),
            Command::Down => Some(MotionRequest::jog(Direction::Down)),
            Command::MoveFixed(mm) => Some(MotionRequest::fixed(mm)),
            Command::MoveSmooth(mm) => Some(MotionRequest::gaussian(mm)),
            Command::MovePid(mm) => Some(MotionRequest::pid(mm)),
            Command::Stop | Command::Height => None,
        }
    }
}
