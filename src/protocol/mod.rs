// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Command Protocol
//!
//! - [`messages`] - The [`Command`] set.
//! - [`parser`] - Byte-wise line assembly and command parsing.

pub mod messages;
pub mod parser;

pub use messages::Command;
pub use parser::{parse, LineBuffer, ParseError};
