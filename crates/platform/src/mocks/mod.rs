//! Mock implementations for testing
//!
//! Everything here hangs off a [`MockBench`]: a shared, recorded model of the
//! module's update header. Lines, the delay source and the SPI port created
//! from the same bench append to one event log, so a test can assert the
//! exact interleaving of edges, delays and SPI bytes. The SPI side is backed
//! by a small NOR flash model that honours chip-select framing.
//!
//! [`MockSerial`] stands in for the host serial link and is independent of
//! the bench.

#![cfg(any(test, feature = "std"))]
#![allow(clippy::arithmetic_side_effects)] // test doubles, values are bounded by test inputs
#![allow(clippy::indexing_slicing)]

use core::cell::RefCell;
use core::convert::Infallible;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, PinState};
use embedded_hal::spi::{self, SpiBus};

use crate::gpio::{FlexPin, LineMode, Pull};
use crate::peripheral::SpiPort;

/// Name a line is registered under on the bench.
pub type LineName = &'static str;

/// One recorded interaction with the bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchEvent {
    /// A line changed direction
    Mode(LineName, LineMode),
    /// A line was driven to a level
    Level(LineName, PinState),
    /// A line was sampled and returned the given level
    Sample(LineName, bool),
    /// Busy-wait of the given number of microseconds
    DelayUs(u32),
    /// SPI peripheral attached to the shared lines
    SpiBegin,
    /// SPI peripheral released the shared lines
    SpiEnd,
    /// One SPI byte exchange
    SpiByte {
        /// Byte shifted out by the host
        mosi: u8,
        /// Byte shifted in from the flash
        miso: u8,
    },
}

#[derive(Debug, Clone)]
struct LineState {
    mode: LineMode,
    level: PinState,
    script: VecDeque<bool>,
}

impl Default for LineState {
    fn default() -> Self {
        Self {
            mode: LineMode::Input(Pull::Floating),
            level: PinState::Low,
            script: VecDeque::new(),
        }
    }
}

/// Default contents of the SFDP region: signature, revision 1.6, one header.
const SFDP_HEADER: [u8; 8] = [0x53, 0x46, 0x44, 0x50, 0x06, 0x01, 0x00, 0xFF];

const STATUS_WIP: u8 = 0x01;
const STATUS_WEL: u8 = 0x02;
const PAGE_MASK: u32 = 0xFF;
const ADDRESS_MASK: u32 = 0x00FF_FFFF;

/// Behavioural model of a 25-series NOR flash.
#[derive(Debug, Default)]
struct FlashModel {
    memory: BTreeMap<u32, u8>,
    sfdp: Vec<u8>,
    attached: bool,
    selected: bool,
    write_enabled: bool,
    busy_polls_per_op: u32,
    busy_remaining: u32,
    command: Vec<u8>,
    page_programs: Vec<(u32, usize)>,
    chip_erases: usize,
}

impl FlashModel {
    fn new() -> Self {
        Self {
            sfdp: SFDP_HEADER.to_vec(),
            ..Self::default()
        }
    }

    fn status(&self) -> u8 {
        let mut status = 0;
        if self.busy_remaining > 0 {
            status |= STATUS_WIP;
        }
        if self.write_enabled {
            status |= STATUS_WEL;
        }
        status
    }

    fn address(&self) -> u32 {
        let bytes = self.command.get(1..4).unwrap_or(&[0u8; 3]);
        u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
    }

    fn exchange(&mut self, mosi: u8) -> u8 {
        if !self.attached || !self.selected {
            return 0xFF;
        }
        self.command.push(mosi);
        let position = self.command.len() - 1;
        match self.command.first().copied() {
            Some(0x05) if position >= 1 => {
                let status = self.status();
                self.busy_remaining = self.busy_remaining.saturating_sub(1);
                status
            }
            Some(0x03) if position >= 4 => {
                let offset = (position - 4) as u32;
                let addr = self.address().wrapping_add(offset) & ADDRESS_MASK;
                self.memory.get(&addr).copied().unwrap_or(0xFF)
            }
            Some(0x5A) if position >= 5 => {
                let addr = self.address() as usize + (position - 5);
                self.sfdp.get(addr).copied().unwrap_or(0xFF)
            }
            _ => 0xFF,
        }
    }

    fn select(&mut self) {
        self.selected = true;
        self.command.clear();
    }

    fn deselect(&mut self) {
        if !self.selected {
            return;
        }
        self.selected = false;
        let command = core::mem::take(&mut self.command);
        let busy = self.busy_remaining > 0;
        match command.first().copied() {
            Some(0x06) => self.write_enabled = true,
            Some(0x04) => self.write_enabled = false,
            Some(0x02) if self.write_enabled && !busy && command.len() >= 4 => {
                let start = u32::from_be_bytes([0, command[1], command[2], command[3]]);
                let data = &command[4..];
                for (i, byte) in data.iter().enumerate() {
                    // page program wraps inside the addressed page
                    let column = (start + i as u32) & PAGE_MASK;
                    let addr = (start & !PAGE_MASK) | column;
                    let cell = self.memory.entry(addr).or_insert(0xFF);
                    *cell &= *byte;
                }
                self.page_programs.push((start, data.len()));
                self.write_enabled = false;
                self.busy_remaining = self.busy_polls_per_op;
            }
            Some(0x60 | 0xC7) if self.write_enabled && !busy => {
                self.memory.clear();
                self.chip_erases += 1;
                self.write_enabled = false;
                self.busy_remaining = self.busy_polls_per_op;
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
struct BenchState {
    events: Vec<BenchEvent>,
    lines: BTreeMap<LineName, LineState>,
    chip_select: Option<LineName>,
    flash: FlashModel,
    elapsed_us: u64,
}

impl BenchState {
    fn line(&mut self, name: LineName) -> &mut LineState {
        self.lines.entry(name).or_default()
    }

    fn drive(&mut self, name: LineName, level: PinState) {
        self.line(name).level = level;
        self.events.push(BenchEvent::Level(name, level));
        if self.chip_select == Some(name) {
            match level {
                PinState::Low => self.flash.select(),
                PinState::High => self.flash.deselect(),
            }
        }
    }
}

/// Shared recorded model of the module's lines, timing and flash.
///
/// Cloning is cheap; clones observe the same state.
#[derive(Debug, Clone)]
pub struct MockBench {
    state: Rc<RefCell<BenchState>>,
}

impl MockBench {
    /// Create an empty bench with an erased flash.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BenchState {
                events: Vec::new(),
                lines: BTreeMap::new(),
                chip_select: None,
                flash: FlashModel::new(),
                elapsed_us: 0,
            })),
        }
    }

    /// Register (or re-open) a line. New lines start as floating inputs.
    pub fn line(&self, name: LineName) -> MockLine {
        self.state.borrow_mut().line(name);
        MockLine {
            bench: self.clone(),
            name,
        }
    }

    /// Delay source that records every wait on the bench.
    pub fn delay(&self) -> MockDelay {
        MockDelay { bench: self.clone() }
    }

    /// SPI port wired to the flash model. `chip_select` names the line whose
    /// edges frame flash transactions.
    pub fn flash_port(&self, chip_select: LineName) -> MockSpiFlash {
        self.state.borrow_mut().chip_select = Some(chip_select);
        self.line(chip_select);
        MockSpiFlash { bench: self.clone() }
    }

    /// Queue levels returned by successive reads of `name`.
    ///
    /// Once the script is exhausted, reads of an output line return its
    /// driven level and reads of an input return low.
    pub fn script_input(&self, name: LineName, levels: &[bool]) {
        self.state
            .borrow_mut()
            .line(name)
            .script
            .extend(levels.iter().copied());
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<BenchEvent> {
        self.state.borrow().events.clone()
    }

    /// Drop all recorded events (state is kept).
    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Last level driven on `name`.
    pub fn level(&self, name: LineName) -> PinState {
        self.state.borrow_mut().line(name).level
    }

    /// Current direction of `name`.
    pub fn mode(&self, name: LineName) -> LineMode {
        self.state.borrow_mut().line(name).mode
    }

    /// Total busy-wait time recorded so far.
    pub fn elapsed_us(&self) -> u64 {
        self.state.borrow().elapsed_us
    }

    /// Number of times `name` was driven to `level`.
    pub fn count_levels(&self, name: LineName, level: PinState) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| **e == BenchEvent::Level(name, level))
            .count()
    }

    /// Bytes the host shifted out over SPI, in order.
    pub fn spi_mosi(&self) -> Vec<u8> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                BenchEvent::SpiByte { mosi, .. } => Some(*mosi),
                _ => None,
            })
            .collect()
    }

    /// Read back flash contents (erased cells read `0xFF`).
    pub fn flash_contents(&self, addr: u32, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        (0..len)
            .map(|i| {
                let a = addr + i as u32;
                state.flash.memory.get(&a).copied().unwrap_or(0xFF)
            })
            .collect()
    }

    /// Preload flash contents, bypassing the SPI protocol.
    pub fn preload_flash(&self, addr: u32, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        for (i, byte) in data.iter().enumerate() {
            state.flash.memory.insert(addr + i as u32, *byte);
        }
    }

    /// `(address, length)` of every accepted page-program command.
    pub fn page_programs(&self) -> Vec<(u32, usize)> {
        self.state.borrow().flash.page_programs.clone()
    }

    /// Number of accepted chip-erase commands.
    pub fn chip_erase_count(&self) -> usize {
        self.state.borrow().flash.chip_erases
    }

    /// Number of status polls that report write-in-progress after each
    /// program or erase.
    pub fn set_flash_busy_polls(&self, polls: u32) {
        self.state.borrow_mut().flash.busy_polls_per_op = polls;
    }

    /// Let any program or erase in progress complete immediately.
    pub fn complete_flash_operation(&self) {
        self.state.borrow_mut().flash.busy_remaining = 0;
    }

    /// Replace the SFDP region contents.
    pub fn set_sfdp(&self, bytes: &[u8]) {
        self.state.borrow_mut().flash.sfdp = bytes.to_vec();
    }

    /// Whether the SPI peripheral currently owns the shared lines.
    pub fn spi_attached(&self) -> bool {
        self.state.borrow().flash.attached
    }
}

impl Default for MockBench {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock GPIO line registered on a [`MockBench`]
#[derive(Debug, Clone)]
pub struct MockLine {
    bench: MockBench,
    name: LineName,
}

impl MockLine {
    /// Name this line was registered under
    pub fn name(&self) -> LineName {
        self.name
    }
}

impl digital::ErrorType for MockLine {
    type Error = Infallible;
}

impl digital::OutputPin for MockLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.bench.state.borrow_mut().drive(self.name, PinState::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.bench.state.borrow_mut().drive(self.name, PinState::High);
        Ok(())
    }
}

impl digital::InputPin for MockLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let mut state = self.bench.state.borrow_mut();
        let line = state.line(self.name);
        let level = match line.script.pop_front() {
            Some(level) => level,
            None => line.mode == LineMode::Output && line.level == PinState::High,
        };
        state.events.push(BenchEvent::Sample(self.name, level));
        Ok(level)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl FlexPin for MockLine {
    fn set_as_input(&mut self, pull: Pull) -> Result<(), Self::Error> {
        let mut state = self.bench.state.borrow_mut();
        state.line(self.name).mode = LineMode::Input(pull);
        state.events.push(BenchEvent::Mode(self.name, LineMode::Input(pull)));
        Ok(())
    }

    fn set_as_output(&mut self, level: PinState) -> Result<(), Self::Error> {
        let mut state = self.bench.state.borrow_mut();
        state.line(self.name).mode = LineMode::Output;
        state.events.push(BenchEvent::Mode(self.name, LineMode::Output));
        state.drive(self.name, level);
        Ok(())
    }
}

/// Mock delay source; waits are recorded, never slept.
#[derive(Debug, Clone)]
pub struct MockDelay {
    bench: MockBench,
}

impl MockDelay {
    fn record(&mut self, us: u32) {
        let mut state = self.bench.state.borrow_mut();
        state.elapsed_us += u64::from(us);
        state.events.push(BenchEvent::DelayUs(us));
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.record(ns.div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.record(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.record(ms.saturating_mul(1_000));
    }
}

/// Mock SPI port wired to the bench's flash model
#[derive(Debug, Clone)]
pub struct MockSpiFlash {
    bench: MockBench,
}

impl MockSpiFlash {
    fn exchange(&mut self, mosi: u8) -> u8 {
        let mut state = self.bench.state.borrow_mut();
        let miso = state.flash.exchange(mosi);
        state.events.push(BenchEvent::SpiByte { mosi, miso });
        miso
    }
}

impl spi::ErrorType for MockSpiFlash {
    type Error = Infallible;
}

impl SpiBus<u8> for MockSpiFlash {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.exchange(0x00);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for word in words {
            self.exchange(*word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        for i in 0..read.len().max(write.len()) {
            let miso = self.exchange(write.get(i).copied().unwrap_or(0x00));
            if let Some(slot) = read.get_mut(i) {
                *slot = miso;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.exchange(*word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl SpiPort for MockSpiFlash {
    fn begin(&mut self) -> Result<(), Self::Error> {
        let mut state = self.bench.state.borrow_mut();
        state.flash.attached = true;
        state.events.push(BenchEvent::SpiBegin);
        Ok(())
    }

    fn end(&mut self) -> Result<(), Self::Error> {
        let mut state = self.bench.state.borrow_mut();
        state.flash.attached = false;
        state.events.push(BenchEvent::SpiEnd);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SerialState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

/// Mock host serial link.
///
/// Bytes pushed with [`push_rx`](Self::push_rx) are what the driver reads;
/// everything the driver writes lands in [`tx`](Self::tx). A read with no
/// queued bytes reports end-of-stream.
#[derive(Debug, Clone, Default)]
pub struct MockSerial {
    state: Rc<RefCell<SerialState>>,
}

impl MockSerial {
    /// Create an empty link
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes from the host
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// Bytes written by the driver so far
    pub fn tx(&self) -> Vec<u8> {
        self.state.borrow().tx.clone()
    }

    /// Take and clear the bytes written by the driver
    pub fn take_tx(&self) -> Vec<u8> {
        core::mem::take(&mut self.state.borrow_mut().tx)
    }

    /// Bytes queued but not yet read
    pub fn pending_rx(&self) -> usize {
        self.state.borrow().rx.len()
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = Infallible;
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        let mut count = 0;
        for slot in buf.iter_mut() {
            match state.rx.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.state.borrow().rx.is_empty())
    }
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.state.borrow_mut().tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
