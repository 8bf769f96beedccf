// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! STM32F777 board support. Only built with the `firmware` feature.

pub mod clock;
pub mod gpio;
pub mod i2c;
pub mod pins;
pub mod usart;

pub use clock::CycleDelay;
pub use gpio::OutputLine;
pub use i2c::I2cBus;
pub use pins::BoardPins;
pub use usart::{Console, Usart};
