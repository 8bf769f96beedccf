// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Device-Specific Drivers
//!
//! This module contains device-specific drivers that sit above the raw `hw/` layer and below the
//! application logic. Both are written against the `embedded-hal` 1.0 traits.
//!
//! ## Existing drivers
//!
//! - [`relay`] – Two-relay up/down lift drive with break-before-make dead-time
//! - [`vl53l1x`] – ST VL53L1X time-of-flight ranging sensor (I2C)

pub mod relay;
pub mod vl53l1x;

pub use relay::{ActiveLevel, RelayPair};
pub use vl53l1x::Vl53l1x;
