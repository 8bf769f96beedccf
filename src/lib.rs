// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Desk Lift Firmware
//!
//! Height control for a motorized standing desk, written in Rust, targeting an STM32F777 MCU.
//! A pair of relays drives the lift motor up or down, and a VL53L1X time-of-flight sensor
//! measures the desk height. Motion requests arrive over a serial console or a remote
//! publish/subscribe link.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`config`] | Desk limits, tolerances, timeouts, tuning |
//! | [`motion`] | Motion sessions (fixed, smooth, PID, jog) and the [`motion::MotionEngine`] |
//! | [`control`] | PID controller and Gaussian speed profile |
//! | [`drivers`] | Device-level drivers (relay pair, VL53L1X) |
//! | [`protocol`] | Console command parsing |
//! | [`remote`] | Remote publish/subscribe link |
//! | [`scheduler`] | Cooperative task loop tying it all together |
//! | `hw` | MCU-level wrappers around USART, I2C, GPIO, SysTick (`firmware` feature) |
//!
//! Everything except `hw` is hardware-independent and unit tested on the host.
//!
//! ## Getting Started
//!
//! Run the host tests:
//!
//! ```bash
//! cargo test
//! ```
//!
//! Flash the board:
//!
//! ```bash
//! cargo run --release --features firmware
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod control;
pub mod drivers;
#[cfg(feature = "firmware")]
pub mod hw;
pub mod io;
pub mod motion;
pub mod protocol;
pub mod remote;
pub mod scheduler;
