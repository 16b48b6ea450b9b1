//! Peripheral abstraction layer
//!
//! SPI and serial-stream seams used by the update driver. Both wrap the
//! standard `embedded-hal` / `embedded-io` traits with the small amount of
//! extra behaviour the module needs.

use embedded_hal::spi::SpiBus;

/// SPI port whose pins are shared with a bit-banged protocol.
///
/// On the module, SCK and MOSI are the same physical lines as the ICP clock
/// and data lines. The port only owns them between [`begin`](Self::begin) and
/// [`end`](Self::end); outside that window they are plain GPIO.
pub trait SpiPort: SpiBus<u8> {
    /// Route the shared lines to the SPI peripheral and enable it.
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Disable the peripheral and hand the shared lines back to GPIO.
    fn end(&mut self) -> Result<(), Self::Error>;

    /// Shift one byte out and return the byte shifted in.
    fn transfer_byte(&mut self, byte: u8) -> Result<u8, Self::Error> {
        let mut word = [byte];
        self.transfer_in_place(&mut word)?;
        let [received] = word;
        Ok(received)
    }
}

impl<T: SpiPort + ?Sized> SpiPort for &mut T {
    #[inline]
    fn begin(&mut self) -> Result<(), Self::Error> {
        T::begin(self)
    }

    #[inline]
    fn end(&mut self) -> Result<(), Self::Error> {
        T::end(self)
    }
}

/// Bidirectional byte stream carrying the host update protocol.
///
/// Either a hardware UART or a USB CDC serial port; the protocol does not
/// distinguish them.
pub trait ByteStream: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady {
    /// `true` when at least one byte can be read without blocking.
    fn available(&mut self) -> Result<bool, Self::Error> {
        self.read_ready()
    }

    /// Block until `buf` is completely filled.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), embedded_io::ReadExactError<Self::Error>> {
        self.read_exact(buf)
    }

    /// Send a single reply byte.
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.write_all(&[byte])?;
        self.flush()
    }
}

impl<T> ByteStream for T where T: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady {}

/// Serial line settings the host update tool expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: crate::config::HOST_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    /// 1 stop bit
    One,
    /// 2 stop bits
    Two,
}
