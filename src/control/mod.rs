// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Control Algorithms
//!
//! Pure numeric building blocks for the motion strategies. Nothing in here touches hardware.
//!
//! ## Modules
//!
//! - [`pid`] - PID controller with anti-windup and per-session gain self-tuning.
//! - [`profile`] - Discretized Gaussian velocity profile for smooth moves.

pub mod pid;
pub mod profile;

pub use pid::{Gains, Pid};
pub use profile::MotionProfile;
