// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! ST VL53L1X time-of-flight distance sensor.
//!
//! Register-level driver over I2C: boot and configure the device, start/stop continuous
//! ranging, poll the data-ready flag, and read the final range in millimeters.
//!
//! [`Vl53l1x::init`] waits for the firmware to boot, uploads the default configuration block
//! (registers `0x2D..=0x87`, ST's ULD defaults: long distance mode, 100 ms timing budget, data
//! ready interrupt active high) and runs the one-off VHV calibration measurement.
//!
//! Reads never block. [`Vl53l1x::read_distance`] returns the newest sample when one is ready,
//! otherwise the previous sample until it has been repeated `max_stale_polls` times.

use core::fmt;
use embedded_hal::i2c::I2c;

use crate::motion::HeightSensor;

/// Factory-set 7-bit address.
pub const DEFAULT_ADDRESS: u8 = 0x29;

/// Expected contents of [`reg::MODEL_ID`].
pub const MODEL_ID: u16 = 0xEACC;

// Register addresses (16-bit index)
pub mod reg {
    pub const VHV_CONFIG__TIMEOUT_MACROP_LOOP_BOUND: u16 = 0x0008;
    pub const VHV_CONFIG__INIT: u16 = 0x000B;
    /// First register of the default configuration block
    pub const DEFAULT_CONFIG_START: u16 = 0x002D;
    pub const GPIO_HV_MUX__CTRL: u16 = 0x0030;
    pub const GPIO__TIO_HV_STATUS: u16 = 0x0031;
    pub const SYSTEM__INTERRUPT_CLEAR: u16 = 0x0086;
    pub const SYSTEM__MODE_START: u16 = 0x0087;
    pub const RESULT__RANGE_STATUS: u16 = 0x0089;
    pub const RESULT__FINAL_CROSSTALK_CORRECTED_RANGE_MM_SD0: u16 = 0x0096;
    pub const FIRMWARE__SYSTEM_STATUS: u16 = 0x00E5;
    pub const MODEL_ID: u16 = 0x010F;
}

/// Default values for registers `0x2D..=0x87`.
#[rustfmt::skip]
pub const DEFAULT_CONFIGURATION: [u8; 91] = [
    0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x02, 0x08, // 0x2D
    0x00, 0x08, 0x10, 0x01, 0x01, 0x00, 0x00, 0x00, // 0x35
    0x00, 0xFF, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00, // 0x3D
    0x00, 0x20, 0x0B, 0x00, 0x00, 0x02, 0x0A, 0x21, // 0x45
    0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0xC8, // 0x4D
    0x00, 0x00, 0x38, 0xFF, 0x01, 0x00, 0x08, 0x00, // 0x55
    0x00, 0x01, 0xCC, 0x0F, 0x01, 0xF1, 0x0D, 0x01, // 0x5D
    0x68, 0x00, 0x80, 0x08, 0xB8, 0x00, 0x00, 0x00, // 0x65
    0x00, 0x0F, 0x89, 0x00, 0x00, 0x00, 0x00, 0x00, // 0x6D
    0x00, 0x00, 0x01, 0x0F, 0x0D, 0x0E, 0x0E, 0x00, // 0x75
    0x00, 0x02, 0xC7, 0xFF, 0x9B, 0x00, 0x00, 0x00, // 0x7D
    0x01, 0x00, 0x00,                               // 0x85
];

/// Status polls allowed while waiting for boot or the calibration measurement.
const MAX_INIT_POLLS: u32 = 10_000;

const MODE_START_CONTINUOUS: u8 = 0x40;
const MODE_STOP: u8 = 0x00;

/// Raw range status meaning "range valid".
const RANGE_STATUS_VALID: u8 = 0x09;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// Bus-level failure
    I2c(E),
    /// The device at the address is not a VL53L1X
    WrongModel(u16),
    /// Ranging has not been started
    NotRanging,
    /// No new sample for too many polls
    Stale,
    /// The device did not boot or finish its calibration measurement
    Timeout,
    /// The sensor flagged the sample (signal fail, wrap-around, ...)
    RangeStatus(u8),
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::I2c(e)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "i2c: {:?}", e),
            Error::WrongModel(id) => write!(f, "unexpected model id {:#06x}", id),
            Error::NotRanging => f.write_str("ranging not started"),
            Error::Stale => f.write_str("no fresh sample"),
            Error::Timeout => f.write_str("device not responding"),
            Error::RangeStatus(s) => write!(f, "range status {}", s),
        }
    }
}

pub struct Vl53l1x<I2C> {
    i2c: I2C,
    address: u8,
    ranging: bool,
    last_mm: Option<u16>,
    stale_polls: u16,
    max_stale_polls: u16,
}

impl<I2C: I2c> Vl53l1x<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            ranging: false,
            last_mm: None,
            stale_polls: 0,
            max_stale_polls: 20,
        }
    }

    /// Number of consecutive polls without a new sample before reads fail.
    pub fn with_max_stale_polls(mut self, polls: u16) -> Self {
        self.max_stale_polls = polls;
        self
    }

    pub fn free(self) -> I2C {
        self.i2c
    }

    /// Boot, configure and calibrate the device, then start continuous ranging.
    pub fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        self.poll_until(|s| Ok(s.read_u8(reg::FIRMWARE__SYSTEM_STATUS)? & 0x01 != 0))?;

        let id = self.read_u16(reg::MODEL_ID)?;
        if id != MODEL_ID {
            return Err(Error::WrongModel(id));
        }

        let mut block = [0u8; 2 + DEFAULT_CONFIGURATION.len()];
        block[..2].copy_from_slice(&reg::DEFAULT_CONFIG_START.to_be_bytes());
        block[2..].copy_from_slice(&DEFAULT_CONFIGURATION);
        self.i2c.write(self.address, &block)?;

        // One measurement for the VHV calibration, then keep its result.
        self.start_ranging()?;
        self.poll_until(Self::data_ready)?;
        self.stop_ranging()?;
        self.write_u8(reg::VHV_CONFIG__TIMEOUT_MACROP_LOOP_BOUND, 0x09)?;
        self.write_u8(reg::VHV_CONFIG__INIT, 0x00)?;

        self.start_ranging()
    }

    fn poll_until<F>(&mut self, mut done: F) -> Result<(), Error<I2C::Error>>
    where
        F: FnMut(&mut Self) -> Result<bool, Error<I2C::Error>>,
    {
        for _ in 0..MAX_INIT_POLLS {
            if done(self)? {
                return Ok(());
            }
        }
        Err(Error::Timeout)
    }

    pub fn start_ranging(&mut self) -> Result<(), Error<I2C::Error>> {
        self.clear_interrupt()?;
        self.write_u8(reg::SYSTEM__MODE_START, MODE_START_CONTINUOUS)?;
        self.ranging = true;
        self.stale_polls = 0;
        Ok(())
    }

    pub fn stop_ranging(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_u8(reg::SYSTEM__MODE_START, MODE_STOP)?;
        self.clear_interrupt()?;
        self.ranging = false;
        self.last_mm = None;
        Ok(())
    }

    #[inline]
    pub fn clear_interrupt(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_u8(reg::SYSTEM__INTERRUPT_CLEAR, 0x01)
    }

    /// `true` when a new sample is waiting.
    pub fn data_ready(&mut self) -> Result<bool, Error<I2C::Error>> {
        // Ready when the status bit equals the configured polarity (inverse of mux bit 4).
        let polarity = (self.read_u8(reg::GPIO_HV_MUX__CTRL)? & 0x10) == 0;
        let status = self.read_u8(reg::GPIO__TIO_HV_STATUS)? & 0x01;
        Ok((status != 0) == polarity)
    }

    /// Latest valid distance, polling the device once.
    pub fn poll(&mut self) -> Result<u16, Error<I2C::Error>> {
        if !self.ranging {
            return Err(Error::NotRanging);
        }

        if self.data_ready()? {
            let status = self.read_u8(reg::RESULT__RANGE_STATUS)? & 0x1F;
            let mm = self.read_u16(reg::RESULT__FINAL_CROSSTALK_CORRECTED_RANGE_MM_SD0)?;
            self.clear_interrupt()?;
            self.stale_polls = 0;

            if status != RANGE_STATUS_VALID {
                self.last_mm = None;
                return Err(Error::RangeStatus(status));
            }
            self.last_mm = Some(mm);
            return Ok(mm);
        }

        self.stale_polls = self.stale_polls.saturating_add(1);
        match self.last_mm {
            Some(mm) if self.stale_polls <= self.max_stale_polls => Ok(mm),
            _ => Err(Error::Stale),
        }
    }

    fn read_u8(&mut self, index: u16) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &index.to_be_bytes(), &mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self, index: u16) -> Result<u16, Error<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &index.to_be_bytes(), &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn write_u8(&mut self, index: u16, value: u8) -> Result<(), Error<I2C::Error>> {
        let [hi, lo] = index.to_be_bytes();
        self.i2c.write(self.address, &[hi, lo, value])?;
        Ok(())
    }
}

impl<I2C: I2c> HeightSensor for Vl53l1x<I2C> {
    type Error = Error<I2C::Error>;

    fn read_distance(&mut self) -> Result<i32, Self::Error> {
        self.poll().map(i32::from)
    }
}
