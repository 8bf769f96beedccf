// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Inter-Integrated Circuit (I2C) abstraction layer.
//!
//! `I2cBus` wraps a HAL blocking I2C instance and exposes it through the `embedded-hal` 1.0
//! [`I2c`] trait. A write followed by a read is issued as one repeated-start transfer.

use core::fmt;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};
use stm32f7xx_hal::prelude::{
    _embedded_hal_blocking_i2c_Read as BlockingRead,
    _embedded_hal_blocking_i2c_Write as BlockingWrite,
    _embedded_hal_blocking_i2c_WriteRead as BlockingWriteRead,
};

/// HAL error wrapped for `embedded-hal` 1.0.
#[derive(Copy, Clone, Debug)]
pub struct BusError<E>(pub E);

impl<E: fmt::Debug> embedded_hal::i2c::Error for BusError<E> {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct I2cBus<T> {
    i2c: T,
}

impl<T> I2cBus<T> {
    pub fn new(i2c: T) -> Self {
        Self { i2c }
    }

    pub fn free(self) -> T {
        self.i2c
    }
}

impl<T, E> ErrorType for I2cBus<T>
where
    T: BlockingRead<Error = E> + BlockingWrite<Error = E> + BlockingWriteRead<Error = E>,
    E: fmt::Debug,
{
    type Error = BusError<E>;
}

impl<T, E> I2c<SevenBitAddress> for I2cBus<T>
where
    T: BlockingRead<Error = E> + BlockingWrite<Error = E> + BlockingWriteRead<Error = E>,
    E: fmt::Debug,
{
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        BlockingRead::read(&mut self.i2c, address, read).map_err(BusError)
    }

    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        BlockingWrite::write(&mut self.i2c, address, write).map_err(BusError)
    }

    fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        BlockingWriteRead::write_read(&mut self.i2c, address, write, read).map_err(BusError)
    }

    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Read(buf) => self.read(address, buf)?,
                Operation::Write(bytes) => self.write(address, bytes)?,
            }
        }
        Ok(())
    }
}
