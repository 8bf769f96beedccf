// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

#![no_main]
#![no_std]

use cortex_m_rt::entry;
use panic_halt as _;

use hal::{
    i2c::{BlockingI2c, Mode},
    pac,
    prelude::*,
    serial::{Config, Serial},
};
use stm32f7xx_hal as hal;

use desklift::config::DeskConfig;
use desklift::drivers::{RelayPair, Vl53l1x};
use desklift::hw::usart::{self, RxQueue};
use desklift::hw::{clock, BoardPins, CycleDelay, I2cBus, OutputLine, Usart};
use desklift::motion::MotionEngine;
use desklift::remote::SerialBridge;
use desklift::scheduler::Scheduler;

#[entry]
fn main() -> ! {
    // Peripherals
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    // Clocks
    let mut rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.freeze();
    let sysclk_hz = clocks.sysclk().raw();

    let config = DeskConfig::default();
    let pins = BoardPins::new(dp.GPIOA, dp.GPIOB, dp.GPIOD);

    let usart_cfg = Config {
        baud_rate: 115_200.bps(),
        ..Default::default()
    };

    // USART1 (DBG): command console and log output
    let serial = Serial::new(
        dp.USART1,
        (pins.usart1.tx, pins.usart1.rx),
        &clocks,
        usart_cfg,
    );
    let (console_tx, console_rx) = Usart::new(serial).split();
    let console = usart::init_console(console_tx, log::LevelFilter::Info);
    let queue = cortex_m::singleton!(: RxQueue = RxQueue::new()).unwrap();
    let console_rx = usart::attach_console_rx(console_rx, queue);

    // USART2: network co-processor
    let serial = Serial::new(
        dp.USART2,
        (pins.usart2.tx, pins.usart2.rx),
        &clocks,
        Config {
            baud_rate: 115_200.bps(),
            ..Default::default()
        },
    );
    let (bridge_tx, bridge_rx) = Usart::new(serial).split();
    let queue = cortex_m::singleton!(: RxQueue = RxQueue::new()).unwrap();
    let bridge_rx = usart::attach_bridge_rx(bridge_rx, queue);
    let bridge = SerialBridge::new(bridge_rx, bridge_tx, CycleDelay::new(sysclk_hz));

    // Relays
    let relays = RelayPair::active_low(
        OutputLine::new(pins.relays.up),
        OutputLine::new(pins.relays.down),
        CycleDelay::new(sysclk_hz),
        config.motion.dead_time_ms,
    );

    // I2C1: VL53L1X
    let i2c = BlockingI2c::i2c1(
        dp.I2C1,
        (pins.i2c1.scl, pins.i2c1.sda),
        Mode::fast(400_000.Hz()),
        &clocks,
        &mut rcc.apb1,
        50_000,
    );
    let mut sensor = Vl53l1x::new(I2cBus::new(i2c));
    if let Err(e) = sensor.init() {
        log::error!("vl53l1x init failed: {}", e);
    }

    clock::start(cp.SYST, sysclk_hz);

    let engine = MotionEngine::new(relays, sensor, config);
    let mut scheduler = Scheduler::new(engine, console_rx, console, Some(bridge), clock::now());
    scheduler.start();

    loop {
        scheduler.tick(clock::now());
        let lost = usart::take_rx_lost();
        if lost > 0 {
            log::warn!("serial rx: {} bytes dropped", lost);
        }
        cortex_m::asm::wfi();
    }
}
