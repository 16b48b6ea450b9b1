//! SPI NOR flash driver
//!
//! Blocking 25-series command set as used by the module's audio flash. Chip
//! select is asserted around every command; the SPI bus is flushed before
//! it is released.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::config::{FlashConfig, PAGE_SIZE};
use crate::error::{pin_err, spi_err, Error};

/// Flash command opcodes and status bits.
pub mod opcodes {
    /// Write enable
    pub const WRITE_ENABLE: u8 = 0x06;
    /// Read status register
    pub const READ_STATUS: u8 = 0x05;
    /// Chip erase
    pub const CHIP_ERASE: u8 = 0x60;
    /// Page program
    pub const PAGE_PROGRAM: u8 = 0x02;
    /// Read data
    pub const READ: u8 = 0x03;
    /// Read SFDP region
    pub const READ_SFDP: u8 = 0x5A;
    /// Filler clocked out while reading
    pub const DUMMY: u8 = 0xFF;
    /// Status register: write in progress
    pub const STATUS_WIP: u8 = 0x01;
}

use opcodes::{
    CHIP_ERASE, DUMMY, PAGE_PROGRAM, READ, READ_SFDP, READ_STATUS, STATUS_WIP, WRITE_ENABLE,
};

fn address_bytes(addr: u32) -> [u8; 3] {
    let [_, high, mid, low] = addr.to_be_bytes();
    [high, mid, low]
}

/// Flash behind a SPI bus and a chip-select line.
pub struct SpiFlash<SPI, CS> {
    spi: SPI,
    cs: CS,
    config: FlashConfig,
}

impl<SPI, CS> SpiFlash<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Wrap a bus and chip-select line.
    pub fn new(spi: SPI, cs: CS, config: FlashConfig) -> Self {
        Self { spi, cs, config }
    }

    /// Give the bus and chip-select line back.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    fn select(&mut self) -> Result<(), Error> {
        self.cs.set_low().map_err(pin_err)
    }

    fn deselect(&mut self) -> Result<(), Error> {
        self.spi.flush().map_err(spi_err)?;
        self.cs.set_high().map_err(pin_err)
    }

    /// Run `op` with chip select asserted.
    ///
    /// Chip select is released on both paths; on failure the error from
    /// `op` is returned and release errors are dropped.
    fn selected<T>(&mut self, op: impl FnOnce(&mut SPI) -> Result<T, Error>) -> Result<T, Error> {
        self.select()?;
        match op(&mut self.spi) {
            Ok(value) => {
                self.deselect()?;
                Ok(value)
            }
            Err(e) => {
                self.spi.flush().ok();
                self.cs.set_high().ok();
                Err(e)
            }
        }
    }

    /// Send a command with no data phase.
    fn command(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.selected(|spi| spi.write(bytes).map_err(spi_err))
    }

    /// Send `header`, then clock in `buf.len()` bytes.
    fn read_after(&mut self, header: &[u8], buf: &mut [u8]) -> Result<(), Error> {
        self.selected(|spi| {
            spi.write(header).map_err(spi_err)?;
            buf.fill(DUMMY);
            spi.transfer_in_place(buf).map_err(spi_err)
        })
    }

    /// Set the write-enable latch.
    pub fn write_enable(&mut self) -> Result<(), Error> {
        self.command(&[WRITE_ENABLE])
    }

    /// Read status register 1.
    pub fn read_status(&mut self) -> Result<u8, Error> {
        let mut status = [0u8];
        self.read_after(&[READ_STATUS], &mut status)?;
        let [status] = status;
        Ok(status)
    }

    /// Poll the status register until the write-in-progress bit clears.
    ///
    /// The status register is read continuously under one chip select. After
    /// `max_status_polls` busy reads chip select is released and
    /// [`Error::FlashBusyForever`] returned.
    pub fn wait_for_write_end(&mut self) -> Result<(), Error> {
        let max_polls = self.config.max_status_polls;
        let exhausted = self.selected(|spi| {
            spi.write(&[READ_STATUS]).map_err(spi_err)?;
            let mut polls: u32 = 0;
            loop {
                let mut status = [DUMMY];
                spi.transfer_in_place(&mut status).map_err(spi_err)?;
                polls = polls.saturating_add(1);
                let [status] = status;
                if status & STATUS_WIP == 0 {
                    return Ok(None);
                }
                if polls >= max_polls {
                    return Ok(Some(polls));
                }
            }
        })?;
        match exhausted {
            None => Ok(()),
            Some(polls) => {
                log!(error, "flash: still busy after {} status polls", polls);
                Err(Error::FlashBusyForever { polls })
            }
        }
    }

    /// Erase the whole device and wait for completion.
    pub fn chip_erase(&mut self) -> Result<(), Error> {
        self.write_enable()?;
        self.command(&[CHIP_ERASE])?;
        log!(info, "flash: chip erase started");
        self.wait_for_write_end()
    }

    /// Program up to one page at `addr` and wait for completion.
    ///
    /// The device wraps writes at the page boundary; callers split data so
    /// a write does not cross one.
    pub fn page_write(&mut self, addr: u32, data: &[u8]) -> Result<(), Error> {
        if data.len() > PAGE_SIZE {
            return Err(Error::PageOverflow { len: data.len() });
        }
        self.write_enable()?;
        let [high, mid, low] = address_bytes(addr);
        self.selected(|spi| {
            spi.write(&[PAGE_PROGRAM, high, mid, low]).map_err(spi_err)?;
            spi.write(data).map_err(spi_err)
        })?;
        self.wait_for_write_end()
    }

    /// Read `buf.len()` bytes starting at `addr`.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        let [high, mid, low] = address_bytes(addr);
        self.read_after(&[READ, high, mid, low], buf)
    }

    /// Read `buf.len()` bytes of the SFDP region starting at `addr`.
    pub fn read_sfdp(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        let [high, mid, low] = address_bytes(addr);
        self.read_after(&[READ_SFDP, high, mid, low, DUMMY], buf)
    }
}
