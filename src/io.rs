// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Byte-level input used by the command console and the remote bridge.
//!
//! On the board the USART receive interrupt moves each byte into a `heapless::spsc` queue with
//! [`pump`] and the tasks read it back through [`QueuedRx`], so a burst that arrives between
//! two polls is buffered instead of overrunning the single-byte data register.

use core::convert::Infallible;
use core::fmt;

use heapless::spsc::{Consumer, Producer};

/// Non-blocking source of received bytes, e.g. the RX half of a USART.
pub trait ByteSource {
    type Error: fmt::Debug;

    /// Read one byte. `Err(nb::Error::WouldBlock)` when nothing has arrived.
    fn read_byte(&mut self) -> nb::Result<u8, Self::Error>;
}

/// Receive half of an interrupt-fed byte queue.
pub struct QueuedRx<'a, const N: usize> {
    queue: Consumer<'a, u8, N>,
}

impl<'a, const N: usize> QueuedRx<'a, N> {
    pub fn new(queue: Consumer<'a, u8, N>) -> Self {
        Self { queue }
    }
}

impl<const N: usize> ByteSource for QueuedRx<'_, N> {
    type Error = Infallible;

    #[inline]
    fn read_byte(&mut self) -> nb::Result<u8, Infallible> {
        self.queue.dequeue().ok_or(nb::Error::WouldBlock)
    }
}

/// Bytes moved per [`pump`] call at most.
const PUMP_BUDGET: usize = 4;

/// Move the bytes `source` has ready into `queue`.
///
/// Returns how many bytes were lost, either to a full queue or to a receive error.
pub fn pump<S: ByteSource, const N: usize>(
    source: &mut S,
    queue: &mut Producer<'_, u8, N>,
) -> usize {
    let mut lost = 0;
    for _ in 0..PUMP_BUDGET {
        match source.read_byte() {
            Ok(b) => {
                if queue.enqueue(b).is_err() {
                    lost += 1;
                }
            }
            Err(nb::Error::WouldBlock) => break,
            Err(nb::Error::Other(_)) => lost += 1,
        }
    }
    lost
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory byte source fed by the test.
    #[derive(Default)]
    pub struct MemBytes {
        pub bytes: VecDeque<Result<u8, ()>>,
    }

    impl MemBytes {
        pub fn push_str(&mut self, s: &str) {
            self.bytes.extend(s.bytes().map(Ok));
        }
    }

    impl ByteSource for MemBytes {
        type Error = ();

        fn read_byte(&mut self) -> nb::Result<u8, ()> {
            match self.bytes.pop_front() {
                Some(Ok(b)) => Ok(b),
                Some(Err(())) => Err(nb::Error::Other(())),
                None => Err(nb::Error::WouldBlock),
            }
        }
    }
}
