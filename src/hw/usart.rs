// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! USART abstraction layer.
//!
//! `Usart` splits a HAL serial port into a [`UsartTx`] (blocking writes, `core::fmt::Write`) and
//! a [`UsartRx`] (non-blocking [`ByteSource`]).
//!
//! Reception is interrupt driven: the RXNE interrupt of each port moves incoming bytes into a
//! [`RxQueue`] and the tasks read them through the [`QueuedRx`] returned by
//! [`attach_console_rx`] / [`attach_bridge_rx`]. Bytes dropped on a full queue or a receive
//! error are counted and reported by [`take_rx_lost`].
//!
//! The debug console on USART1 is shared between command replies ([`Console`]) and the `log`
//! output ([`UsartLogger`]). Log records are written as `[LEVEL] message\r\n`. Output holds the
//! console lock one byte at a time so receive interrupts are never held off for a whole line.
//!
//! To access the terminal on the host machine, connect to the debug USB port and use
//! ```
//! $ screen /dev/tty.usbmodem* <baud_rate>
//! ```
//!
//! To close the debug terminal, press `Ctrl+A` then `Ctrl+\` then `y`.

use core::cell::RefCell;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::interrupt::{free, Mutex};
use cortex_m::peripheral::NVIC;
use heapless::spsc::{Producer, Queue};
use log::{LevelFilter, Log, Metadata, Record};
use nb::block;
use stm32f7xx_hal::{
    pac::{self, interrupt, USART1, USART2},
    prelude::*,
    serial::{self, Event, Instance, Pins, Rx, Serial, Tx},
};

use crate::io::{self, ByteSource, QueuedRx};

/// Receive queue depth per port, one slot is kept free.
pub const RX_QUEUE_LEN: usize = 256;

pub type RxQueue = Queue<u8, RX_QUEUE_LEN>;

pub struct Usart<U: Instance> {
    tx: Tx<U>,
    rx: Rx<U>,
}

impl<U: Instance> Usart<U> {
    /// Take over `serial` with the receive interrupt enabled at the peripheral.
    pub fn new<PINS: Pins<U>>(mut serial: Serial<U, PINS>) -> Self {
        serial.listen(Event::Rxne);
        let (tx, rx) = serial.split();
        Self { tx, rx }
    }

    pub fn split(self) -> (UsartTx<U>, UsartRx<U>) {
        (UsartTx { tx: self.tx }, UsartRx { rx: self.rx })
    }
}

pub struct UsartTx<U: Instance> {
    tx: Tx<U>,
}

impl<U: Instance> UsartTx<U> {
    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.tx.write(b));
    }

    pub fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write_byte(b);
        }
    }

    /// Write string and CRLF terminator.
    #[inline]
    pub fn println(&mut self, s: &str) {
        self.write_str(s);
        self.write_str("\r\n");
    }

    /// Block until the hardware TX FIFO/drain is flushed.
    #[inline]
    pub fn flush(&mut self) {
        let _ = block!(self.tx.flush());
    }
}

impl<U: Instance> fmt::Write for UsartTx<U> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        UsartTx::write_str(self, s);
        Ok(())
    }
}

pub struct UsartRx<U: Instance> {
    rx: Rx<U>,
}

impl<U: Instance> ByteSource for UsartRx<U> {
    type Error = serial::Error;

    #[inline]
    fn read_byte(&mut self) -> nb::Result<u8, serial::Error> {
        self.rx.read()
    }
}

struct RxPump<U: Instance> {
    rx: UsartRx<U>,
    queue: Producer<'static, u8, RX_QUEUE_LEN>,
}

type PumpSlot<U> = Mutex<RefCell<Option<RxPump<U>>>>;

static CONSOLE_RX: PumpSlot<USART1> = Mutex::new(RefCell::new(None));
static BRIDGE_RX: PumpSlot<USART2> = Mutex::new(RefCell::new(None));
static RX_LOST: AtomicU32 = AtomicU32::new(0);

/// Feed the USART1 receiver into `queue` from its interrupt.
pub fn attach_console_rx(
    rx: UsartRx<USART1>,
    queue: &'static mut RxQueue,
) -> QueuedRx<'static, RX_QUEUE_LEN> {
    attach(&CONSOLE_RX, pac::Interrupt::USART1, rx, queue)
}

/// Feed the USART2 receiver into `queue` from its interrupt.
pub fn attach_bridge_rx(
    rx: UsartRx<USART2>,
    queue: &'static mut RxQueue,
) -> QueuedRx<'static, RX_QUEUE_LEN> {
    attach(&BRIDGE_RX, pac::Interrupt::USART2, rx, queue)
}

fn attach<U: Instance>(
    slot: &PumpSlot<U>,
    irq: pac::Interrupt,
    rx: UsartRx<U>,
    queue: &'static mut RxQueue,
) -> QueuedRx<'static, RX_QUEUE_LEN> {
    let (producer, consumer) = queue.split();
    free(|cs| slot.borrow(cs).replace(Some(RxPump { rx, queue: producer })));
    // SAFETY: the handler only touches its own slot, under a critical section.
    unsafe { NVIC::unmask(irq) };
    QueuedRx::new(consumer)
}

fn service<U: Instance>(slot: &PumpSlot<U>) {
    free(|cs| {
        if let Some(pump) = slot.borrow(cs).borrow_mut().as_mut() {
            let lost = io::pump(&mut pump.rx, &mut pump.queue);
            if lost > 0 {
                RX_LOST.fetch_add(lost as u32, Ordering::Relaxed);
            }
        }
    });
}

/// Bytes dropped by the receive interrupts since the last call.
pub fn take_rx_lost() -> u32 {
    RX_LOST.swap(0, Ordering::Relaxed)
}

#[interrupt]
fn USART1() {
    service(&CONSOLE_RX);
}

#[interrupt]
fn USART2() {
    service(&BRIDGE_RX);
}

static CONSOLE: Mutex<RefCell<Option<UsartTx<USART1>>>> = Mutex::new(RefCell::new(None));

static LOGGER: UsartLogger = UsartLogger;

/// Install the USART1 transmitter as the shared console and register the logger.
pub fn init_console(tx: UsartTx<USART1>, level: LevelFilter) -> Console {
    free(|cs| CONSOLE.borrow(cs).replace(Some(tx)));
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
    Console
}

fn with_console<F: FnOnce(&mut UsartTx<USART1>)>(f: F) {
    free(|cs| {
        if let Some(tx) = CONSOLE.borrow(cs).borrow_mut().as_mut() {
            f(tx);
        }
    });
}

fn console_write(s: &str) {
    for &b in s.as_bytes() {
        with_console(|tx| tx.write_byte(b));
    }
}

/// Handle for writing command replies to the shared console.
pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        console_write(s);
        Ok(())
    }
}

/// `log` backend writing to the shared console.
pub struct UsartLogger;

impl Log for UsartLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Truncated when longer than the buffer.
        let mut line: heapless::String<160> = heapless::String::new();
        let _ = write!(line, "[{}] {}", record.level(), record.args());
        console_write(&line);
        console_write("\r\n");
    }

    fn flush(&self) {
        with_console(|tx| tx.flush());
    }
}
