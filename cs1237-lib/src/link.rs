//! Bit-level access to the CS1237's two-wire interface.
//!
//! The clock line is always host-driven and rests low. The data line is
//! shared: the chip pulls it low to signal a finished conversion and shifts
//! bits on it in both directions, so its direction must be switched
//! explicitly at runtime.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use std::time::Duration;

/// Minimum clock pulse width satisfying the chip's timing spec.
pub const MIN_PULSE_WIDTH_US: u32 = 2;

/// Wider pulse with safety margin, for hosts with imprecise delays.
pub const SAFE_PULSE_WIDTH_US: u32 = 5;

/// Direction of the shared data line, switched explicitly and only while the
/// clock is low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// A pin whose direction can be reconfigured at runtime. Required because
/// the CS1237 uses a single line for ready signalling, data input and data
/// output.
pub trait FlexPin: InputPin + OutputPin {
    fn set_direction(&mut self, dir: Direction) -> Result<(), Self::Error>;
}

/// Drives the two physical lines with the mandated pulse timing. Performs
/// exactly one primitive per call and never blocks beyond a single pulse;
/// timeout policy belongs to the protocol engine.
pub struct BitBangLink<Clk, Data, Dly> {
    clk: Clk,
    data: Data,
    delay: Dly,
    pulse_width_us: u32,
    direction: Direction,
}

impl<Clk, Data, Dly, PinErr> BitBangLink<Clk, Data, Dly>
where
    Clk: OutputPin<Error = PinErr>,
    Data: InputPin<Error = PinErr> + OutputPin<Error = PinErr> + FlexPin,
    Dly: DelayNs,
{
    /// Take ownership of the pins, leaving the clock low and the data line
    /// as an input.
    pub fn new(mut clk: Clk, mut data: Data, delay: Dly) -> Result<Self, PinErr> {
        clk.set_low()?;
        data.set_direction(Direction::Input)?;
        Ok(Self {
            clk,
            data,
            delay,
            pulse_width_us: MIN_PULSE_WIDTH_US,
            direction: Direction::Input,
        })
    }

    /// Override the clock pulse width (microseconds per phase).
    pub fn with_pulse_width(mut self, width_us: u32) -> Self {
        self.pulse_width_us = width_us;
        self
    }

    /// One full clock cycle: high for the pulse width, then low for the
    /// pulse width. Used whenever bits are shifted without the caller
    /// touching the data line.
    pub fn clock_pulse(&mut self) -> Result<(), PinErr> {
        self.clk.set_high()?;
        self.delay.delay_us(self.pulse_width_us);
        self.clk.set_low()?;
        self.delay.delay_us(self.pulse_width_us);
        Ok(())
    }

    /// Switch the data line direction. The new mode and level are applied
    /// while the clock is low, so the line cannot glitch mid-pulse. Entering
    /// output mode leaves the line driven high (the bus idle level).
    pub fn set_data_direction(&mut self, dir: Direction) -> Result<(), PinErr> {
        if self.direction == dir {
            return Ok(());
        }
        self.data.set_direction(dir)?;
        if dir == Direction::Output {
            self.data.set_high()?;
        }
        self.direction = dir;
        Ok(())
    }

    /// Current direction of the data line.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Drive one bit out: data level first, then a clock pulse.
    pub fn write_bit(&mut self, bit: bool) -> Result<(), PinErr> {
        if bit {
            self.data.set_high()?;
        } else {
            self.data.set_low()?;
        }
        self.clock_pulse()
    }

    /// Shift one bit in: raise the clock, sample the data line while the
    /// clock is high, then drop the clock.
    pub fn read_bit(&mut self) -> Result<bool, PinErr> {
        self.clk.set_high()?;
        self.delay.delay_us(self.pulse_width_us);
        let bit = self.data.is_high()?;
        self.clk.set_low()?;
        self.delay.delay_us(self.pulse_width_us);
        Ok(bit)
    }

    /// Instantaneous read of the data line without touching the clock.
    /// Only used for the readiness handshake.
    pub fn is_data_low(&mut self) -> Result<bool, PinErr> {
        self.data.is_low()
    }

    /// Drive the clock high and leave it there (power-down entry).
    pub fn clock_high(&mut self) -> Result<(), PinErr> {
        self.clk.set_high()
    }

    /// Return the clock to its low rest level (power-down exit).
    pub fn clock_low(&mut self) -> Result<(), PinErr> {
        self.clk.set_low()
    }

    /// Sleep one bounded tick. Goes through the injected delay so tests can
    /// simulate timeouts without wall-clock waits.
    pub fn sleep(&mut self, duration: Duration) {
        self.delay.delay_us(duration.as_micros() as u32);
    }
}
