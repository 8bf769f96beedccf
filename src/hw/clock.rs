// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Millisecond clock and busy-wait delay.
//!
//! SysTick fires once per millisecond and bumps a wrapping counter read by [`now`]. The relay
//! dead-time uses [`CycleDelay`], which spins on the core cycle count and does not need SysTick.

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::{syst::SystClkSource, SYST};
use cortex_m_rt::exception;
use embedded_hal::delay::DelayNs;

use crate::motion::Millis;

static MILLIS: AtomicU32 = AtomicU32::new(0);

/// Start the 1 kHz SysTick interrupt. `sysclk_hz` is the core clock.
pub fn start(mut syst: SYST, sysclk_hz: u32) {
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(sysclk_hz / 1_000 - 1);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Milliseconds since [`start`], wrapping after ~49 days.
#[inline]
pub fn now() -> Millis {
    MILLIS.load(Ordering::Relaxed)
}

#[exception]
fn SysTick() {
    MILLIS.fetch_add(1, Ordering::Relaxed);
}

/// Blocking delay counted in core cycles.
#[derive(Copy, Clone)]
pub struct CycleDelay {
    cycles_per_us: u32,
}

impl CycleDelay {
    pub fn new(sysclk_hz: u32) -> Self {
        Self {
            cycles_per_us: (sysclk_hz / 1_000_000).max(1),
        }
    }
}

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns as u64 * self.cycles_per_us as u64) / 1_000;
        cortex_m::asm::delay(cycles.max(1) as u32);
    }

    fn delay_us(&mut self, us: u32) {
        cortex_m::asm::delay(us.saturating_mul(self.cycles_per_us));
    }

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}
