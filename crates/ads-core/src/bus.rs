//! Register bus transaction capability
//!
//! The hardware source only needs one primitive: write some bytes to the
//! device, then optionally read some bytes back. [`Transact`] captures that,
//! and the adapters here implement it on top of `embedded-hal` I2C buses
//! (async and blocking) bound to a fixed 7-bit device address.

use core::future::Future;

use embedded_hal::i2c::{Error as _, ErrorKind, NoAcknowledgeSource};
use thiserror_no_std::Error;

/// Default 7-bit address of an ADS1115 with ADDR tied to GND
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// Failure of a single bus transaction
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("device did not acknowledge")]
    NoAcknowledge,
    #[error("bus arbitration lost")]
    ArbitrationLoss,
    #[error("bus error")]
    Bus,
    #[error("receive overrun")]
    Overrun,
    #[error("bus transport failure")]
    Other,
}

impl From<ErrorKind> for BusError {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            | ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)
            | ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown) => Self::NoAcknowledge,
            ErrorKind::ArbitrationLoss => Self::ArbitrationLoss,
            ErrorKind::Bus => Self::Bus,
            ErrorKind::Overrun => Self::Overrun,
            _ => Self::Other,
        }
    }
}

/// Raw register access to one device.
pub trait Transact {
    /// Writes `write`, then fills `read` if it is non-empty.
    ///
    /// An empty `read` is a plain write transaction.
    fn transact(
        &mut self,
        write: &[u8],
        read: &mut [u8],
    ) -> impl Future<Output = Result<(), BusError>>;
}

/// [`Transact`] over an async `embedded-hal-async` I2C bus.
pub struct AsyncI2cBus<I> {
    i2c: I,
    address: u8,
}

impl<I> AsyncI2cBus<I> {
    #[inline]
    pub const fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Give the underlying bus back.
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I> Transact for AsyncI2cBus<I>
where
    I: embedded_hal_async::i2c::I2c,
{
    async fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        let result = if read.is_empty() {
            self.i2c.write(self.address, write).await
        } else {
            self.i2c.write_read(self.address, write, read).await
        };
        result.map_err(|e| BusError::from(e.kind()))
    }
}

/// [`Transact`] over a blocking `embedded-hal` I2C bus.
///
/// The transaction completes before the returned future is first polled to
/// completion, so the executor is held for the duration of one transfer.
pub struct BlockingI2cBus<I> {
    i2c: I,
    address: u8,
}

impl<I> BlockingI2cBus<I> {
    #[inline]
    pub const fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I> Transact for BlockingI2cBus<I>
where
    I: embedded_hal::i2c::I2c,
{
    async fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        let result = if read.is_empty() {
            self.i2c.write(self.address, write)
        } else {
            self.i2c.write_read(self.address, write, read)
        };
        result.map_err(|e| BusError::from(e.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use embassy_futures::block_on;
    use embedded_hal::i2c::{ErrorType, Operation, SevenBitAddress};

    /// Minimal register file behind a blocking I2C interface.
    #[derive(Default)]
    struct FakeI2c {
        writes: Vec<(u8, Vec<u8>)>,
        conversion: [u8; 2],
        nack: bool,
    }

    impl ErrorType for FakeI2c {
        type Error = ErrorKind;
    }

    impl embedded_hal::i2c::I2c<SevenBitAddress> for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.nack {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                    Operation::Read(buf) => buf.copy_from_slice(&self.conversion),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_blocking_write_only() {
        let mut bus = BlockingI2cBus::new(FakeI2c::default(), DEFAULT_ADDRESS);
        block_on(bus.transact(&[0x01, 0xC3, 0x83], &mut [])).unwrap();

        let i2c = bus.release();
        assert_eq!(i2c.writes, [(0x48, alloc::vec![0x01, 0xC3, 0x83])]);
    }

    #[test]
    fn test_blocking_write_read() {
        let i2c = FakeI2c {
            conversion: [0x12, 0x34],
            ..Default::default()
        };
        let mut bus = BlockingI2cBus::new(i2c, 0x49);
        let mut buf = [0u8; 2];
        block_on(bus.transact(&[0x00], &mut buf)).unwrap();

        assert_eq!(buf, [0x12, 0x34]);
        assert_eq!(bus.release().writes, [(0x49, alloc::vec![0x00])]);
    }

    impl embedded_hal_async::i2c::I2c<SevenBitAddress> for FakeI2c {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            embedded_hal::i2c::I2c::transaction(self, address, operations)
        }
    }

    #[test]
    fn test_async_write_read() {
        let i2c = FakeI2c {
            conversion: [0x80, 0x01],
            ..Default::default()
        };
        let mut bus = AsyncI2cBus::new(i2c, DEFAULT_ADDRESS);
        assert_eq!(bus.address(), 0x48);

        block_on(bus.transact(&[0x01, 0xD3, 0x83], &mut [])).unwrap();
        let mut buf = [0u8; 2];
        block_on(bus.transact(&[0x00], &mut buf)).unwrap();

        assert_eq!(buf, [0x80, 0x01]);
        assert_eq!(
            bus.release().writes,
            [
                (0x48, alloc::vec![0x01, 0xD3, 0x83]),
                (0x48, alloc::vec![0x00])
            ]
        );
    }

    #[test]
    fn test_nack_maps_to_bus_error() {
        let i2c = FakeI2c {
            nack: true,
            ..Default::default()
        };
        let mut bus = BlockingI2cBus::new(i2c, DEFAULT_ADDRESS);
        assert_eq!(
            block_on(bus.transact(&[0x00], &mut [0u8; 2])),
            Err(BusError::NoAcknowledge)
        );
    }
}
