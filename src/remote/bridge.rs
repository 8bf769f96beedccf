// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Serial bridge to a network co-processor.
//!
//! The co-processor holds the actual broker connection. It speaks newline-terminated text:
//!
//! | Direction | Line                         | Meaning                              |
//! |-----------|------------------------------|--------------------------------------|
//! | out       | `CONNECT <client_id>`        | Open the broker session              |
//! | in        | `CONNECTED`                  | Broker session open                  |
//! | out       | `SUB <topic>`                | Subscribe                            |
//! | out       | `PUB <topic> <payload>`      | Publish                              |
//! | out       | `DISCONNECT`                 | Close the broker session             |
//! | in        | `MSG <topic> <payload>`      | Message on a subscribed topic        |
//! | in        | `DISCONNECTED`               | Broker session lost                  |
//!
//! `connect` waits up to [`CONNECT_TIMEOUT_MS`] for `CONNECTED`; a `DISCONNECTED` reply refuses
//! the session. Any other incoming line is logged and ignored.

use core::fmt;

use embedded_hal::delay::DelayNs;
use heapless::{String, Vec};

use crate::io::ByteSource;
use crate::remote::{RemoteError, RemoteLink};

/// Longest incoming line, excluding the terminator.
pub const MAX_LINE: usize = 128;
pub const MAX_TOPIC: usize = 32;
pub const MAX_SUBSCRIPTIONS: usize = 4;

/// Bytes consumed per `poll_message` call before yielding.
const RX_BUDGET: usize = 256;

/// How long `connect` waits for the co-processor to acknowledge.
pub const CONNECT_TIMEOUT_MS: u32 = 5_000;

pub struct SerialBridge<RX, TX, D> {
    rx: RX,
    tx: TX,
    delay: D,
    line: Vec<u8, MAX_LINE>,
    overflow: bool,
    connected: bool,
    subscriptions: Vec<String<MAX_TOPIC>, MAX_SUBSCRIPTIONS>,
}

impl<RX: ByteSource, TX: fmt::Write, D: DelayNs> SerialBridge<RX, TX, D> {
    /// `delay` paces the wait for the connect acknowledgement.
    pub fn new(rx: RX, tx: TX, delay: D) -> Self {
        Self {
            rx,
            tx,
            delay,
            line: Vec::new(),
            overflow: false,
            connected: false,
            subscriptions: Vec::new(),
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn free(self) -> (RX, TX) {
        (self.rx, self.tx)
    }

    fn send(&mut self, args: fmt::Arguments<'_>) -> Result<(), RemoteError> {
        self.tx.write_fmt(args).map_err(|_| RemoteError::Io)
    }

    /// Consume received bytes until the connect reply. `None` while it has not arrived.
    fn take_connect_reply(&mut self) -> Option<Result<(), RemoteError>> {
        for _ in 0..RX_BUDGET {
            let b = match self.rx.read_byte() {
                Ok(b) => b,
                Err(nb::Error::WouldBlock) => return None,
                Err(nb::Error::Other(e)) => {
                    log::warn!("bridge rx error: {:?}", e);
                    continue;
                }
            };
            if !self.push_byte(b) {
                continue;
            }
            let reply = match core::str::from_utf8(&self.line).map(str::trim) {
                Ok("CONNECTED") => Some(Ok(())),
                Ok("DISCONNECTED") => Some(Err(RemoteError::Disconnected)),
                Ok(other) => {
                    log::debug!("bridge: {} before connect reply", other);
                    None
                }
                Err(_) => None,
            };
            self.line.clear();
            if reply.is_some() {
                return reply;
            }
        }
        None
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|t| t.as_str() == topic)
    }

    /// Feed one received byte. Returns `true` once a full line is in `self.line`.
    fn push_byte(&mut self, b: u8) -> bool {
        match b {
            b'\r' | b'\n' => {
                if self.overflow {
                    log::warn!("bridge: dropped line longer than {} bytes", MAX_LINE);
                    self.overflow = false;
                    self.line.clear();
                    return false;
                }
                !self.line.is_empty()
            }
            _ if self.overflow => false,
            _ => {
                if self.line.push(b).is_err() {
                    self.overflow = true;
                }
                false
            }
        }
    }

    /// Act on the line in `self.line`. Returns the payload length when it was a message for us.
    fn handle_line(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RemoteError> {
        let Ok(text) = core::str::from_utf8(&self.line) else {
            log::warn!("bridge: non-utf8 line dropped");
            return Ok(None);
        };
        let text = text.trim();

        if text == "DISCONNECTED" {
            self.connected = false;
            return Err(RemoteError::Disconnected);
        }

        let Some(rest) = text.strip_prefix("MSG ") else {
            log::debug!("bridge: {}", text);
            return Ok(None);
        };
        let (topic, payload) = rest.split_once(' ').unwrap_or((rest, ""));
        if !self.is_subscribed(topic) {
            log::debug!("bridge: message on {} ignored", topic);
            return Ok(None);
        }

        let payload = payload.as_bytes();
        if payload.len() > buf.len() {
            return Err(RemoteError::Oversized);
        }
        buf[..payload.len()].copy_from_slice(payload);
        Ok(Some(payload.len()))
    }
}

impl<RX: ByteSource, TX: fmt::Write, D: DelayNs> RemoteLink for SerialBridge<RX, TX, D> {
    fn connect(&mut self, client_id: &str) -> Result<(), RemoteError> {
        self.line.clear();
        self.overflow = false;
        self.send(format_args!("CONNECT {}\n", client_id))?;

        let mut waited_ms = 0;
        loop {
            if let Some(reply) = self.take_connect_reply() {
                reply?;
                self.connected = true;
                return Ok(());
            }
            if waited_ms >= CONNECT_TIMEOUT_MS {
                return Err(RemoteError::Timeout);
            }
            self.delay.delay_ms(1);
            waited_ms += 1;
        }
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), RemoteError> {
        if !self.connected {
            return Err(RemoteError::Disconnected);
        }
        if !self.is_subscribed(topic) {
            let mut t = String::new();
            t.push_str(topic).map_err(|_| RemoteError::Oversized)?;
            self.subscriptions
                .push(t)
                .map_err(|_| RemoteError::Oversized)?;
        }
        self.send(format_args!("SUB {}\n", topic))
    }

    fn poll_message(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RemoteError> {
        if !self.connected {
            return Err(RemoteError::Disconnected);
        }

        for _ in 0..RX_BUDGET {
            let b = match self.rx.read_byte() {
                Ok(b) => b,
                Err(nb::Error::WouldBlock) => return Ok(None),
                Err(nb::Error::Other(e)) => {
                    log::warn!("bridge rx error: {:?}", e);
                    continue;
                }
            };
            if self.push_byte(b) {
                let result = self.handle_line(buf);
                self.line.clear();
                match result {
                    Ok(None) => continue,
                    other => return other,
                }
            }
        }
        Ok(None)
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), RemoteError> {
        if !self.connected {
            return Err(RemoteError::Disconnected);
        }
        self.send(format_args!("PUB {} {}\n", topic, payload))
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.send(format_args!("DISCONNECT\n")).ok();
        }
        self.connected = false;
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testing::MemBytes;

    /// Delay that only adds up the time asked for.
    #[derive(Default)]
    struct Elapsed {
        ns: u64,
    }

    impl Elapsed {
        fn ms(&self) -> u64 {
            self.ns / 1_000_000
        }
    }

    impl DelayNs for Elapsed {
        fn delay_ns(&mut self, ns: u32) {
            self.ns += ns as u64;
        }
    }

    type TestBridge = SerialBridge<MemBytes, std::string::String, Elapsed>;

    fn unconnected() -> TestBridge {
        SerialBridge::new(MemBytes::default(), std::string::String::new(), Elapsed::default())
    }

    fn bridge() -> TestBridge {
        let mut b = unconnected();
        b.rx.push_str("CONNECTED\r\n");
        b.connect("desklift").unwrap();
        b.subscribe("desk/cmd").unwrap();
        b
    }

    #[test]
    fn lifecycle_lines() {
        let mut b = bridge();
        b.publish("desk/height", "812").unwrap();
        b.disconnect();
        let (_, tx) = b.free();
        assert_eq!(
            tx,
            "CONNECT desklift\nSUB desk/cmd\nPUB desk/height 812\nDISCONNECT\n"
        );
    }

    #[test]
    fn connect_skips_chatter_until_acknowledged() {
        let mut b = unconnected();
        b.rx.push_str("OK\r\nMSG desk/cmd up\nCONNECTED\nMSG desk/cmd down\n");
        assert_eq!(b.connect("desklift"), Ok(()));
        assert!(b.is_connected());
        assert_eq!(b.delay.ms(), 0);

        b.subscribe("desk/cmd").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(b.poll_message(&mut buf), Ok(Some(4)));
        assert_eq!(&buf[..4], b"down");
    }

    #[test]
    fn connect_without_acknowledgement_times_out() {
        let mut b = unconnected();
        assert_eq!(b.connect("desklift"), Err(RemoteError::Timeout));
        assert!(!b.is_connected());
        assert_eq!(b.delay.ms(), CONNECT_TIMEOUT_MS as u64);
        assert_eq!(b.subscribe("desk/cmd"), Err(RemoteError::Disconnected));

        let (_, tx) = b.free();
        assert_eq!(tx, "CONNECT desklift\n");
    }

    #[test]
    fn refused_connect_is_reported() {
        let mut b = unconnected();
        b.rx.push_str("DISCONNECTED\n");
        assert_eq!(b.connect("desklift"), Err(RemoteError::Disconnected));
        assert!(!b.is_connected());
    }

    #[test]
    fn delivers_messages_on_subscribed_topics() {
        let mut b = bridge();
        b.rx.push_str("OK\r\nMSG desk/other up\nMSG desk/cmd move_pid 900\r\n");
        let mut buf = [0u8; 32];
        let n = b.poll_message(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..n], b"move_pid 900");
        assert_eq!(b.poll_message(&mut buf), Ok(None));
    }

    #[test]
    fn partial_lines_are_kept_between_polls() {
        let mut b = bridge();
        let mut buf = [0u8; 32];
        b.rx.push_str("MSG desk/cmd st");
        assert_eq!(b.poll_message(&mut buf), Ok(None));
        b.rx.push_str("op\n");
        assert_eq!(b.poll_message(&mut buf), Ok(Some(4)));
        assert_eq!(&buf[..4], b"stop");
    }

    #[test]
    fn disconnect_notice_ends_the_session() {
        let mut b = bridge();
        b.rx.push_str("DISCONNECTED\n");
        let mut buf = [0u8; 8];
        assert_eq!(b.poll_message(&mut buf), Err(RemoteError::Disconnected));
        assert!(!b.is_connected());
        assert_eq!(b.publish("desk/height", "700"), Err(RemoteError::Disconnected));
    }

    #[test]
    fn oversized_payload_is_reported_and_skipped() {
        let mut b = bridge();
        b.rx.push_str("MSG desk/cmd move_smooth 1000\nMSG desk/cmd up\n");
        let mut buf = [0u8; 4];
        assert_eq!(b.poll_message(&mut buf), Err(RemoteError::Oversized));
        assert_eq!(b.poll_message(&mut buf), Ok(Some(2)));
    }

    #[test]
    fn overlong_lines_are_dropped() {
        let mut b = bridge();
        let long = "x".repeat(MAX_LINE + 5);
        b.rx.push_str(&long);
        b.rx.push_str("\nMSG desk/cmd down\n");
        let mut buf = [0u8; 16];
        assert_eq!(b.poll_message(&mut buf), Ok(Some(4)));
        assert_eq!(&buf[..4], b"down");
    }
}
