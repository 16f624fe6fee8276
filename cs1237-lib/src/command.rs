//! Translation of abstract configuration requests into register writes.
//!
//! Requests arrive either as already-decoded set-frames (0xA1..0xA4) or as
//! the remote JSON command surface, an object whose `params` map may carry
//! `enable` (bool or 0/1), `pga` (1|2|64|128) and `mode` (rate code 0..3).
//! Each recognized key produces exactly one ConfigAck or Error frame for
//! the caller to forward upstream.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::{Cs1237, sample_to_volts};
use crate::error::Cs1237Error;
use crate::frame::{ConfigKind, ErrorCode, Frame};
use crate::link::FlexPin;
use crate::register::{Channel, ConfigRegister, Gain, Rate};

/// Reference voltage of the module's internal source, used for the
/// generation-2 voltage frames.
pub const DEFAULT_VREF_VOLTS: f32 = 2.5;

/// One abstract configuration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigRequest {
    /// Gate acquisition; also drives the chip into or out of power-down.
    Enable(bool),
    Gain(Gain),
    Rate(Rate),
    Channel(Channel),
    Power { down: bool },
}

#[derive(Deserialize, Default)]
struct RemoteParams {
    enable: Option<serde_json::Value>,
    pga: Option<u32>,
    mode: Option<u8>,
}

#[derive(Deserialize)]
struct RemoteCommand {
    #[serde(default)]
    params: RemoteParams,
}

impl ConfigRequest {
    /// Parse the remote JSON command surface into requests, in the fixed
    /// order enable, pga, mode. Unknown keys are ignored; recognized keys
    /// with out-of-domain values are dropped with a warning, matching the
    /// reference firmware.
    pub fn from_json(text: &str) -> Result<Vec<ConfigRequest>, serde_json::Error> {
        let command: RemoteCommand = serde_json::from_str(text)?;
        let mut requests = Vec::new();

        if let Some(enable) = command.params.enable {
            match coerce_bool(&enable) {
                Some(on) => requests.push(ConfigRequest::Enable(on)),
                None => warn!("ignoring enable with non-boolean value {enable}"),
            }
        }
        if let Some(pga) = command.params.pga {
            match Gain::from_factor(pga) {
                Some(gain) => requests.push(ConfigRequest::Gain(gain)),
                None => warn!("ignoring pga request with unsupported factor {pga}"),
            }
        }
        if let Some(mode) = command.params.mode {
            match Rate::try_from(mode) {
                Ok(rate) => requests.push(ConfigRequest::Rate(rate)),
                Err(_) => warn!("ignoring mode request with out-of-range code {mode}"),
            }
        }
        Ok(requests)
    }

    /// Map an inbound set-frame to a request, if it is one.
    pub fn from_frame(frame: &Frame) -> Option<ConfigRequest> {
        match *frame {
            Frame::SetGain { gain } => Some(ConfigRequest::Gain(gain)),
            Frame::SetRate { rate } => Some(ConfigRequest::Rate(rate)),
            Frame::SetChannel { channel } => Some(ConfigRequest::Channel(channel)),
            Frame::SetPower { down } => Some(ConfigRequest::Power { down }),
            _ => None,
        }
    }
}

/// `true`/`false`, or the 0/1 encoding some publishers use.
fn coerce_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Applies configuration requests to the chip and renders the results as
/// frames. Owns the acquisition gate and the cumulative good-read counter
/// reported in Status frames.
pub struct CommandTranslator<Clk, Data, Dly> {
    adc: Cs1237<Clk, Data, Dly>,
    vref_volts: f32,
    acquiring: bool,
    good_reads: u32,
}

impl<Clk, Data, Dly, PinErr> CommandTranslator<Clk, Data, Dly>
where
    Clk: OutputPin<Error = PinErr>,
    Data: InputPin<Error = PinErr> + OutputPin<Error = PinErr> + FlexPin,
    Dly: DelayNs,
{
    pub fn new(adc: Cs1237<Clk, Data, Dly>) -> Self {
        Self {
            adc,
            vref_volts: DEFAULT_VREF_VOLTS,
            acquiring: true,
            good_reads: 0,
        }
    }

    pub fn with_vref(mut self, vref_volts: f32) -> Self {
        self.vref_volts = vref_volts;
        self
    }

    /// Last known chip configuration, answered from the cache.
    pub fn config(&self) -> ConfigRegister {
        self.adc.config()
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    pub fn good_reads(&self) -> u32 {
        self.good_reads
    }

    /// Apply one request. The returned frame is the acknowledgement (or the
    /// in-band error report) to forward upstream; `Err` is reserved for
    /// pin-level failures.
    pub fn apply(&mut self, request: ConfigRequest) -> Result<Frame, Cs1237Error<PinErr>> {
        debug!(?request, "applying configuration request");
        match request {
            ConfigRequest::Gain(gain) => {
                let target = self.adc.config().with_gain(gain);
                self.reconfigure(target, ConfigKind::Gain, gain.into())
            }
            ConfigRequest::Rate(rate) => {
                let target = self.adc.config().with_rate(rate);
                self.reconfigure(target, ConfigKind::Rate, rate.into())
            }
            ConfigRequest::Channel(channel) => {
                // The temperature sensor is only valid at unity gain; force
                // that first with its own transaction, as the chip will not
                // accept both changes reliably in one write.
                if channel == Channel::Temperature && self.adc.config().gain() != Gain::X1 {
                    let unity = self.adc.config().with_gain(Gain::X1);
                    if let Some(error) = self.write_verified(unity)? {
                        return Ok(error);
                    }
                }
                let target = self.adc.config().with_channel(channel);
                self.reconfigure(target, ConfigKind::Channel, channel.into())
            }
            ConfigRequest::Power { down } => {
                if down {
                    self.adc.power_down()?;
                } else {
                    self.adc.wake_up()?;
                }
                Ok(Frame::ConfigAck { of: ConfigKind::Power, value: down as u8 })
            }
            ConfigRequest::Enable(on) => {
                self.acquiring = on;
                if on {
                    self.adc.wake_up()?;
                } else {
                    self.adc.power_down()?;
                }
                // Acknowledged as a power-state change: value 1 means the
                // chip is now down.
                Ok(Frame::ConfigAck { of: ConfigKind::Power, value: !on as u8 })
            }
        }
    }

    /// Apply an inbound set-frame; `None` if the frame is not a request.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Option<Frame>, Cs1237Error<PinErr>> {
        match ConfigRequest::from_frame(frame) {
            Some(request) => self.apply(request).map(Some),
            None => Ok(None),
        }
    }

    /// Apply a remote JSON command, yielding one frame per recognized key.
    pub fn handle_json(&mut self, text: &str) -> Result<Vec<Frame>, Cs1237Error<PinErr>> {
        let requests = ConfigRequest::from_json(text)?;
        let mut frames = Vec::with_capacity(requests.len());
        for request in requests {
            frames.push(self.apply(request)?);
        }
        Ok(frames)
    }

    /// Take one sample and render it as a generation-1 frame. `None` while
    /// acquisition is disabled. Timeouts and implausible reads become Error
    /// frames rather than hard failures.
    pub fn sample_frame(&mut self) -> Result<Option<Frame>, Cs1237Error<PinErr>> {
        if !self.acquiring {
            return Ok(None);
        }
        match self.adc.read_sample() {
            Ok(value) => {
                self.good_reads = self.good_reads.wrapping_add(1);
                Ok(Some(Frame::Sample { value }))
            }
            Err(Cs1237Error::Timeout) => Ok(Some(Frame::Error { code: ErrorCode::Timeout })),
            Err(Cs1237Error::InvalidResponse(_)) => {
                Ok(Some(Frame::Error { code: ErrorCode::ReadFailed }))
            }
            Err(other) => Err(other),
        }
    }

    /// Take one sample and render it as a generation-2 voltage frame.
    pub fn voltage_frame(&mut self) -> Result<Option<Frame>, Cs1237Error<PinErr>> {
        if !self.acquiring {
            return Ok(None);
        }
        match self.adc.read_sample() {
            Ok(value) => {
                self.good_reads = self.good_reads.wrapping_add(1);
                let gain = self.adc.config().gain();
                Ok(Some(Frame::Voltage {
                    volts: sample_to_volts(value, gain, self.vref_volts),
                    pga: gain.factor() as u16,
                }))
            }
            Err(Cs1237Error::Timeout) => Ok(Some(Frame::Error { code: ErrorCode::Timeout })),
            Err(Cs1237Error::InvalidResponse(_)) => {
                Ok(Some(Frame::Error { code: ErrorCode::ReadFailed }))
            }
            Err(other) => Err(other),
        }
    }

    /// Current status, answered entirely from cached state.
    pub fn status_frame(&self) -> Frame {
        let config = self.adc.config();
        Frame::Status {
            gain: config.gain(),
            rate: config.rate(),
            channel: config.channel(),
            good_reads: self.good_reads,
        }
    }

    /// Write `target`, verify by reading back, and keep the cache honest.
    /// `Ok(Some(frame))` is an in-band error report; `Ok(None)` is success.
    fn write_verified(
        &mut self,
        target: ConfigRegister,
    ) -> Result<Option<Frame>, Cs1237Error<PinErr>> {
        let previous = self.adc.config();
        match self.adc.write_config(target) {
            Ok(()) => {}
            Err(Cs1237Error::Timeout) => {
                return Ok(Some(Frame::Error { code: ErrorCode::Timeout }));
            }
            Err(other) => return Err(other),
        }
        let read_back = match self.adc.read_config() {
            Ok(config) => config,
            Err(Cs1237Error::Timeout) => {
                self.adc.restore_cached(previous);
                return Ok(Some(Frame::Error { code: ErrorCode::Timeout }));
            }
            Err(other) => return Err(other),
        };
        if read_back.encode() != target.encode() {
            warn!(
                "register verification failed: wrote {:#04x}, read back {:#04x}",
                target.encode(),
                read_back.encode()
            );
            // Memory rolls back; hardware is left alone until the operator
            // retries.
            self.adc.restore_cached(previous);
            return Ok(Some(Frame::Error { code: ErrorCode::VerificationFailed }));
        }
        Ok(None)
    }

    fn reconfigure(
        &mut self,
        target: ConfigRegister,
        of: ConfigKind,
        value: u8,
    ) -> Result<Frame, Cs1237Error<PinErr>> {
        match self.write_verified(target)? {
            Some(error) => Ok(error),
            None => Ok(Frame::ConfigAck { of, value }),
        }
    }
}
