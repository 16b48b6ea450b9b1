//! End-to-end update sessions against the mock bench.
//!
//! The bench models the module's header lines and the NOR flash behind them;
//! the serial mock plays the host update tool.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use bmv31t001::config::{FlashConfig, UpdateConfig, ACK, NACK};
use bmv31t001::frame::{self, Command, FrameKind};
use bmv31t001::icp::IcpState;
use bmv31t001::lines::Lines;
use bmv31t001::{Error, FrameOutcome, UpdateResult, UpdateSession};
use platform::config::line;
use platform::mocks::{BenchEvent, MockBench, MockDelay, MockLine, MockSerial, MockSpiFlash};
use platform::{LineMode, PinState, Pull};

type Session = UpdateSession<MockSerial, MockLine, MockDelay, MockSpiFlash>;

struct Rig {
    bench: MockBench,
    serial: MockSerial,
    session: Session,
}

fn rig_with(config: UpdateConfig) -> Rig {
    let bench = MockBench::new();
    let lines = Lines::new(
        bench.line(line::POWER),
        bench.line(line::STATUS),
        bench.line(line::COMMAND),
        bench.line(line::CLOCK),
        bench.line(line::DATA),
        bench.line(line::CHIP_SELECT),
    );
    let spi = bench.flash_port(line::CHIP_SELECT);
    let serial = MockSerial::new();
    let session = UpdateSession::new(serial.clone(), lines, bench.delay(), spi, config);
    Rig {
        bench,
        serial,
        session,
    }
}

fn rig() -> Rig {
    rig_with(UpdateConfig::default())
}

impl Rig {
    /// Module acknowledges the next SPI-mode pattern word.
    fn module_answers_handshake(&self) {
        self.bench.script_input(line::DATA, &[true, true, false]);
    }

    fn send(&self, bytes: &[u8]) {
        self.serial.push_rx(bytes);
    }

    fn send_command(&self, command: Command) {
        self.send(&frame::encode_control(command).unwrap());
    }

    fn send_chunk(&self, chunk: &[u8]) {
        self.send(&frame::encode_data(chunk).unwrap());
    }

    fn poll(&mut self) -> FrameOutcome {
        self.session.poll_update_frame().unwrap()
    }

    fn start(&mut self) {
        self.module_answers_handshake();
        self.send_command(Command::SwitchToSpi);
        assert_eq!(self.poll(), FrameOutcome::Ack);
        self.serial.take_tx();
    }
}

// ─── Wire scenarios ──────────────────────────────────────────────────────────

#[test]
fn comspi_then_data_frame() {
    let mut rig = rig();
    rig.module_answers_handshake();

    rig.send(&[0xAA, 0x23, 0x06, 0x43, 0x4F, 0x4D, 0x53, 0x50, 0x49, 0x00, 0x98]);
    assert_eq!(rig.poll(), FrameOutcome::Ack);
    assert_eq!(rig.serial.take_tx(), vec![0x3E]);
    assert!(rig.session.in_spi_mode());
    assert!(rig.bench.spi_attached());
    assert_eq!(rig.session.icp_state(), IcpState::Matched);

    rig.send(&[0x55, 0x23, 0x02, 0x11, 0x22, 0x00, 0xF2]);
    assert_eq!(rig.poll(), FrameOutcome::Ack);
    assert_eq!(rig.serial.take_tx(), vec![0x3E]);
    assert_eq!(rig.session.flash_cursor(), 2);
    assert_eq!(rig.bench.flash_contents(0, 2), vec![0x11, 0x22]);
}

#[test]
fn corrupted_control_frame_is_nacked() {
    let mut rig = rig();
    let mut bytes = frame::encode_control(Command::SwitchToSpi).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    rig.send(&bytes);

    assert_eq!(rig.poll(), FrameOutcome::Nack);
    assert_eq!(rig.serial.tx(), vec![NACK]);
    assert_eq!(rig.session.icp_state(), IcpState::Idle);
    assert!(!rig.bench.spi_attached());
}

#[test]
fn corrupted_data_frame_leaves_cursor() {
    let mut rig = rig();
    rig.start();
    rig.send_chunk(&[1, 2, 3, 4]);
    assert_eq!(rig.poll(), FrameOutcome::Ack);

    let mut bytes = frame::encode_data(&[5, 6, 7, 8]).unwrap();
    bytes[4] ^= 0x10;
    rig.send(&bytes);
    assert_eq!(rig.poll(), FrameOutcome::Nack);

    assert_eq!(rig.serial.take_tx(), vec![ACK, NACK]);
    assert_eq!(rig.session.flash_cursor(), 4);
    assert_eq!(rig.session.byte_counter(), 4);
    assert_eq!(rig.bench.page_programs().len(), 1);
}

#[test]
fn truncated_frame_is_nacked() {
    let mut rig = rig();
    rig.start();
    let bytes = frame::encode_data(&[9; 8]).unwrap();
    rig.send(&bytes[..bytes.len() - 3]);

    assert_eq!(rig.poll(), FrameOutcome::Nack);
    assert_eq!(rig.serial.tx(), vec![NACK]);
    assert_eq!(rig.session.flash_cursor(), 0);
}

#[test]
fn unknown_sync_is_dropped_silently() {
    let mut rig = rig();
    rig.send(&[0x12, 0x34, 0x00]);
    assert_eq!(rig.poll(), FrameOutcome::Ignored);
    assert!(rig.serial.tx().is_empty());
}

#[test]
fn unknown_command_is_dropped_silently() {
    let mut rig = rig();
    rig.send(&frame::encode(FrameKind::Control, b"COMXYZ").unwrap());
    assert_eq!(rig.poll(), FrameOutcome::Ignored);
    assert!(rig.serial.tx().is_empty());
    assert_eq!(rig.serial.pending_rx(), 0);
}

// ─── Session lifecycle ───────────────────────────────────────────────────────

#[test]
fn handshake_failure_aborts_to_single_wire() {
    let mut rig = rig();
    rig.send_command(Command::SwitchToSpi);

    assert_eq!(rig.poll(), FrameOutcome::Nack);
    assert_eq!(rig.serial.tx(), vec![NACK]);
    assert_eq!(rig.session.icp_state(), IcpState::Failed);
    assert!(!rig.session.in_spi_mode());
    assert!(!rig.bench.spi_attached());
    assert!(!rig.bench.events().contains(&BenchEvent::SpiBegin));

    assert!(rig
        .bench
        .events()
        .windows(3)
        .any(|w| w
            == [
                BenchEvent::Level(line::POWER, PinState::Low),
                BenchEvent::DelayUs(500_000),
                BenchEvent::Level(line::POWER, PinState::High),
            ]));
    assert_eq!(rig.bench.mode(line::COMMAND), LineMode::Output);
    assert_eq!(rig.bench.level(line::COMMAND), PinState::High);
    assert_eq!(rig.bench.mode(line::STATUS), LineMode::Input(Pull::Floating));
    assert_eq!(rig.bench.mode(line::DATA), LineMode::Output);
    assert_eq!(rig.bench.mode(line::CLOCK), LineMode::Input(Pull::Floating));
}

#[test]
fn missing_sfdp_signature_aborts_after_three_reads() {
    let mut rig = rig();
    rig.bench.set_sfdp(b"NOPE");
    rig.start_expecting_nack();

    let sfdp_reads = rig.bench.spi_mosi().iter().filter(|b| **b == 0x5A).count();
    assert_eq!(sfdp_reads, 3);
    let events = rig.bench.events();
    assert!(events.contains(&BenchEvent::SpiBegin));
    assert!(events.contains(&BenchEvent::SpiEnd));
    assert!(!rig.bench.spi_attached());
    assert!(!rig.session.in_spi_mode());
}

impl Rig {
    fn start_expecting_nack(&mut self) {
        self.module_answers_handshake();
        self.send_command(Command::SwitchToSpi);
        assert_eq!(self.poll(), FrameOutcome::Nack);
        assert_eq!(self.serial.take_tx(), vec![NACK]);
    }
}

#[test]
fn spi_hand_over_writes_pin_function_register() {
    let mut rig = rig();
    rig.start();

    let events = rig.bench.events();
    let begin = events.iter().position(|e| *e == BenchEvent::SpiBegin).unwrap();
    let settle = events[begin..]
        .iter()
        .position(|e| *e == BenchEvent::DelayUs(10_000))
        .unwrap();
    assert!(events[begin..begin + settle]
        .contains(&BenchEvent::Level(line::CHIP_SELECT, PinState::High)));
    let write_cycles = events[..begin]
        .iter()
        .filter(|e| **e == BenchEvent::DelayUs(2_000))
        .count();
    // power-up wait, then one write cycle per word
    assert_eq!(write_cycles, 1 + 4);
}

#[test]
fn second_comspi_resets_cursor_and_counter() {
    let mut rig = rig();
    rig.start();
    rig.send_chunk(&[0xA5; 10]);
    assert_eq!(rig.poll(), FrameOutcome::Ack);
    assert_eq!(rig.session.flash_cursor(), 10);
    assert_eq!(rig.session.byte_counter(), 10);

    rig.start();
    assert_eq!(rig.session.flash_cursor(), 0);
    assert_eq!(rig.session.byte_counter(), 0);
}

#[test]
fn chip_erase_after_comspi() {
    let mut rig = rig();
    rig.bench.preload_flash(0x100, &[0x00; 16]);
    rig.start();

    rig.send_command(Command::ChipErase);
    assert_eq!(rig.poll(), FrameOutcome::Ack);
    assert_eq!(rig.serial.tx(), vec![ACK]);
    assert_eq!(rig.bench.chip_erase_count(), 1);
    assert_eq!(rig.bench.flash_contents(0x100, 16), vec![0xFF; 16]);
}

#[test]
fn erase_and_data_refused_before_comspi() {
    let mut rig = rig();
    rig.send_command(Command::ChipErase);
    assert_eq!(rig.poll(), FrameOutcome::Nack);
    rig.send_chunk(&[1, 2, 3]);
    assert_eq!(rig.poll(), FrameOutcome::Nack);

    assert_eq!(rig.serial.tx(), vec![NACK, NACK]);
    assert_eq!(rig.bench.chip_erase_count(), 0);
    assert!(rig.bench.page_programs().is_empty());
    assert_eq!(rig.session.byte_counter(), 0);
}

#[test]
fn comord_completes_session() {
    let mut rig = rig();
    rig.start();
    rig.send_chunk(&[7; 32]);
    assert_eq!(rig.poll(), FrameOutcome::Ack);

    rig.send_command(Command::Finish);
    assert_eq!(rig.poll(), FrameOutcome::SessionComplete);
    assert_eq!(rig.serial.take_tx(), vec![ACK, ACK]);
    assert_eq!(rig.session.flash_cursor(), 0);
    assert_eq!(rig.session.byte_counter(), 0);
    assert!(!rig.session.in_spi_mode());
    assert!(!rig.bench.spi_attached());
    assert_eq!(rig.session.icp_state(), IcpState::Idle);
    assert_eq!(rig.bench.mode(line::CLOCK), LineMode::Input(Pull::Floating));
    assert_eq!(rig.bench.level(line::POWER), PinState::High);
    assert_eq!(rig.bench.events().last(), Some(&BenchEvent::DelayUs(10_000)));
}

#[test]
fn idle_budget_is_one_hundred_milliseconds() {
    let mut rig = rig();
    assert_eq!(rig.poll(), FrameOutcome::Idle);
    assert_eq!(rig.bench.elapsed_us(), 2_000 * 50);
    assert!(rig.serial.tx().is_empty());
}

#[test]
fn update_request_follows_stream() {
    let mut rig = rig();
    rig.session.begin_update_session().unwrap();
    assert_eq!(rig.bench.level(line::COMMAND), PinState::High);
    assert!(!rig.session.is_update_requested().unwrap());
    rig.send(&[0xAA]);
    assert!(rig.session.is_update_requested().unwrap());
}

// ─── Data path ───────────────────────────────────────────────────────────────

#[test]
fn chunks_are_split_on_sub_block_boundaries() {
    let mut rig = rig();
    rig.start();
    let image: Vec<u8> = (0..300u32).map(|i| (i * 7 + 3) as u8).collect();
    for chunk in image.chunks(60) {
        rig.send_chunk(chunk);
        assert_eq!(rig.poll(), FrameOutcome::Ack);
    }

    assert_eq!(
        rig.bench.page_programs(),
        vec![
            (0, 60),
            (60, 4),
            (64, 56),
            (120, 8),
            (128, 52),
            (180, 12),
            (192, 48),
            (240, 16),
            (256, 44),
        ]
    );
    assert_eq!(rig.bench.flash_contents(0, 300), image);
    assert_eq!(rig.session.flash_cursor(), 300);
}

#[test]
fn execute_update_runs_whole_session() {
    let mut rig = rig();
    let image: Vec<u8> = (0..640u32).map(|i| (i ^ (i >> 3)) as u8).collect();

    rig.module_answers_handshake();
    rig.send_command(Command::SwitchToSpi);
    rig.send_command(Command::ChipErase);
    for chunk in image.chunks(64) {
        rig.send_chunk(chunk);
    }
    rig.send_command(Command::Finish);

    assert_eq!(rig.session.execute_update().unwrap(), UpdateResult::Completed);
    assert_eq!(rig.serial.tx(), vec![ACK; 2 + 10 + 1]);
    assert_eq!(rig.bench.flash_contents(0, 640), image);
    assert_eq!(rig.bench.page_programs().len(), 10);
}

#[test]
fn execute_update_times_out_when_host_is_quiet() {
    let mut rig = rig();
    assert_eq!(rig.session.execute_update().unwrap(), UpdateResult::TimedOut);
}

#[test]
fn stuck_flash_is_reported() {
    let mut rig = rig_with(UpdateConfig {
        flash: FlashConfig {
            max_status_polls: 1_000,
        },
        ..UpdateConfig::default()
    });
    rig.start();
    rig.bench.set_flash_busy_polls(u32::MAX);

    rig.send_command(Command::ChipErase);
    assert_eq!(
        rig.session.poll_update_frame(),
        Err(Error::FlashBusyForever { polls: 1_000 })
    );
    assert_eq!(rig.bench.level(line::CHIP_SELECT), PinState::High);
}

#[test]
fn failed_write_leaves_counter_and_cursor_together() {
    let mut rig = rig_with(UpdateConfig {
        flash: FlashConfig {
            max_status_polls: 10,
        },
        ..UpdateConfig::default()
    });
    rig.start();
    let image: Vec<u8> = (0..80u8).map(|i| i.wrapping_mul(5)).collect();

    rig.bench.set_flash_busy_polls(1_000);
    rig.send_chunk(&image[..40]);
    assert_eq!(
        rig.session.poll_update_frame(),
        Err(Error::FlashBusyForever { polls: 10 })
    );
    assert_eq!(rig.session.flash_cursor(), 0);
    assert_eq!(rig.session.byte_counter(), 0);

    // Host resends the chunk once the flash recovers.
    rig.bench.complete_flash_operation();
    rig.bench.set_flash_busy_polls(0);
    rig.send_chunk(&image[..40]);
    assert_eq!(rig.poll(), FrameOutcome::Ack);
    rig.send_chunk(&image[40..]);
    assert_eq!(rig.poll(), FrameOutcome::Ack);

    assert_eq!(rig.session.flash_cursor(), 80);
    assert_eq!(rig.session.byte_counter(), 80);
    assert_eq!(
        rig.bench.page_programs(),
        vec![(0, 40), (0, 40), (40, 24), (64, 16)]
    );
    assert_eq!(rig.bench.flash_contents(0, 80), image);
}

#[test]
fn into_parts_returns_collaborators() {
    let rig = rig();
    let (serial, lines, _delay, _spi) = rig.session.into_parts();
    assert_eq!(serial.pending_rx(), 0);
    let (power, ..) = lines.release();
    assert_eq!(power.name(), line::POWER);
}
