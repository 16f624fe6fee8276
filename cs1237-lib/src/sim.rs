//! A software CS1237 for tests and demos.
//!
//! Implements the pin and delay traits the driver is generic over, modeling
//! the chip's 46-clock transaction window: 24 conversion bits, 2 status
//! bits, the idle gap up to the command window, a 7-bit command, a
//! turnaround pulse, 8 register bits and a closing pulse. Time never
//! touches the wall clock; the injected delay just accumulates simulated
//! nanoseconds, which also drives power-down detection.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::link::{Direction, FlexPin};

const CMD_READ_CONFIG: u8 = 0x56;
const CMD_WRITE_CONFIG: u8 = 0x65;

const POWER_DOWN_THRESHOLD_NS: u64 = 100_000;
const WAKE_THRESHOLD_NS: u64 = 10_000;

#[derive(Debug)]
struct ChipState {
    preamble_clocks: u16,
    register: u8,
    next_sample: u32,
    shift_sample: u32,
    responding: bool,
    corrupt_writes: bool,

    clock_high: bool,
    host_drives_data: bool,
    host_level: bool,
    chip_level: bool,

    counter: u16,
    command: u8,
    write_shift: u8,
    writes: Vec<u8>,

    powered_down: bool,
    high_ns: u64,
    low_ns: u64,
    elapsed_ns: u64,
}

impl ChipState {
    fn new(preamble_clocks: u16) -> Self {
        Self {
            preamble_clocks,
            register: 0x00,
            next_sample: 0,
            shift_sample: 0,
            responding: true,
            corrupt_writes: false,
            clock_high: false,
            host_drives_data: false,
            host_level: true,
            chip_level: true,
            counter: 0,
            command: 0,
            write_shift: 0,
            writes: Vec::new(),
            powered_down: false,
            high_ns: 0,
            low_ns: 0,
            elapsed_ns: 0,
        }
    }

    fn set_clock(&mut self, high: bool) {
        if self.clock_high == high {
            return;
        }
        self.clock_high = high;
        if high {
            self.high_ns = 0;
            self.on_rising_edge();
        } else {
            self.low_ns = 0;
        }
    }

    fn on_rising_edge(&mut self) {
        if self.powered_down || !self.responding {
            return;
        }
        if self.counter == 0 {
            self.shift_sample = self.next_sample;
        }
        self.counter += 1;
        let c = self.counter;
        let pre = self.preamble_clocks;

        if self.host_drives_data {
            if (pre + 1..=pre + 7).contains(&c) {
                self.command = (self.command << 1) | self.host_level as u8;
            } else if (pre + 9..=pre + 16).contains(&c) && self.command == CMD_WRITE_CONFIG {
                self.write_shift = (self.write_shift << 1) | self.host_level as u8;
            }
        } else {
            self.chip_level = self.output_bit(c);
        }

        if c == pre + 17 {
            if self.command == CMD_WRITE_CONFIG {
                let mut value = self.write_shift;
                if self.corrupt_writes {
                    value ^= 0x40;
                }
                self.register = value;
                self.writes.push(value);
            }
            self.reset_transaction();
        }
    }

    fn output_bit(&self, c: u16) -> bool {
        let pre = self.preamble_clocks;
        match c {
            1..=24 => (self.shift_sample >> (24 - c)) & 1 != 0,
            // Two status bits, always zero here.
            25 | 26 => false,
            c if (pre + 9..=pre + 16).contains(&c) && self.command == CMD_READ_CONFIG => {
                let bit = 7 - (c - (pre + 9));
                (self.register >> bit) & 1 != 0
            }
            // Gap clocks and anything else: line released high.
            _ => true,
        }
    }

    fn reset_transaction(&mut self) {
        self.counter = 0;
        self.command = 0;
        self.write_shift = 0;
    }

    fn read_data(&mut self) -> bool {
        if self.host_drives_data {
            return self.host_level;
        }
        if self.powered_down || !self.responding {
            return true;
        }
        if !self.clock_high && self.counter > 0 {
            // A data read with the clock at rest is the readiness poll of a
            // new transaction; the previous one was finished or abandoned.
            self.reset_transaction();
        }
        if self.counter == 0 {
            // A conversion is always pending: ready is signalled low.
            return false;
        }
        self.chip_level
    }

    fn advance(&mut self, ns: u32) {
        let ns = ns as u64;
        self.elapsed_ns += ns;
        if self.clock_high {
            self.high_ns += ns;
            if self.high_ns >= POWER_DOWN_THRESHOLD_NS && !self.powered_down {
                self.powered_down = true;
                self.reset_transaction();
            }
        } else if self.powered_down {
            self.low_ns += ns;
            if self.low_ns >= WAKE_THRESHOLD_NS {
                self.powered_down = false;
            }
        }
    }
}

/// Handle on a simulated chip. Clone-free: hand the pins to the driver and
/// keep the handle for scripting and assertions.
#[derive(Debug)]
pub struct SimChip {
    state: Rc<RefCell<ChipState>>,
}

impl SimChip {
    /// Chip with the datasheet-faithful 29-clock command preamble.
    pub fn new() -> Self {
        Self::with_preamble(29)
    }

    /// Chip whose command window sits after `preamble_clocks` pulses, for
    /// exercising firmware variants that disagree on the count.
    pub fn with_preamble(preamble_clocks: u16) -> Self {
        Self {
            state: Rc::new(RefCell::new(ChipState::new(preamble_clocks))),
        }
    }

    /// The pin set to hand to [`BitBangLink::new`](crate::link::BitBangLink::new).
    pub fn pins(&self) -> (SimClockPin, SimDataPin, SimDelay) {
        (
            SimClockPin(Rc::clone(&self.state)),
            SimDataPin(Rc::clone(&self.state)),
            SimDelay(Rc::clone(&self.state)),
        )
    }

    /// Raw 24-bit value the next ReadSample transaction will shift out.
    pub fn set_next_sample(&self, raw: u32) {
        self.state.borrow_mut().next_sample = raw & 0xFF_FFFF;
    }

    /// When `false`, the chip never signals ready and every transaction
    /// times out.
    pub fn set_responding(&self, responding: bool) {
        self.state.borrow_mut().responding = responding;
    }

    /// When `true`, committed register writes are corrupted so read-back
    /// verification fails.
    pub fn set_corrupt_writes(&self, corrupt: bool) {
        self.state.borrow_mut().corrupt_writes = corrupt;
    }

    pub fn set_register(&self, value: u8) {
        self.state.borrow_mut().register = value;
    }

    pub fn register(&self) -> u8 {
        self.state.borrow().register
    }

    /// Every register value committed by a write transaction, in order.
    pub fn writes(&self) -> Vec<u8> {
        self.state.borrow().writes.clone()
    }

    pub fn powered_down(&self) -> bool {
        self.state.borrow().powered_down
    }

    /// Total simulated time consumed through the injected delay.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.state.borrow().elapsed_ns)
    }
}

impl Default for SimChip {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SimClockPin(Rc<RefCell<ChipState>>);

impl ErrorType for SimClockPin {
    type Error = Infallible;
}

impl OutputPin for SimClockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_clock(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_clock(true);
        Ok(())
    }
}

pub struct SimDataPin(Rc<RefCell<ChipState>>);

impl ErrorType for SimDataPin {
    type Error = Infallible;
}

impl InputPin for SimDataPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.borrow_mut().read_data())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|level| !level)
    }
}

impl OutputPin for SimDataPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().host_level = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().host_level = true;
        Ok(())
    }
}

impl FlexPin for SimDataPin {
    fn set_direction(&mut self, dir: Direction) -> Result<(), Self::Error> {
        self.0.borrow_mut().host_drives_data = dir == Direction::Output;
        Ok(())
    }
}

pub struct SimDelay(Rc<RefCell<ChipState>>);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().advance(ns);
    }
}
