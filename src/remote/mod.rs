// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Remote Control
//!
//! Publish/subscribe link used for remote commands and telemetry. The scheduler owns one
//! [`RemoteLink`] and drives its lifecycle: `connect` and `subscribe` at start, non-blocking
//! `poll_message` and `publish` while running, `disconnect` when the link reports
//! [`RemoteError::Disconnected`].
//!
//! ## Implementations
//!
//! - [`bridge::SerialBridge`] - Line protocol to a network co-processor over a UART.

use core::fmt;

pub mod bridge;

pub use bridge::SerialBridge;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RemoteError {
    /// The broker connection is gone. Ends the remote task.
    Disconnected,
    /// Writing to the link failed
    Io,
    /// The link did not answer in time
    Timeout,
    /// An incoming message did not fit the caller's buffer and was dropped
    Oversized,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Disconnected => f.write_str("remote channel disconnected"),
            RemoteError::Io => f.write_str("remote link write failed"),
            RemoteError::Timeout => f.write_str("remote link not responding"),
            RemoteError::Oversized => f.write_str("remote message too large"),
        }
    }
}

pub trait RemoteLink {
    /// Open the session with the broker.
    fn connect(&mut self, client_id: &str) -> Result<(), RemoteError>;

    /// Ask for messages published on `topic`.
    fn subscribe(&mut self, topic: &str) -> Result<(), RemoteError>;

    /// Copy the payload of the next pending message on a subscribed topic into `buf`.
    ///
    /// Never blocks. Returns `Ok(None)` when nothing is pending and `Ok(Some(len))` otherwise.
    fn poll_message(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RemoteError>;

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), RemoteError>;

    /// Close the session. Safe to call when already disconnected.
    fn disconnect(&mut self);
}
