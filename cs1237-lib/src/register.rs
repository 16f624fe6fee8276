//! The CS1237's single 8-bit configuration register.
//!
//! Bit layout: `[1:0]` channel, `[3:2]` gain, `[5:4]` output rate, `[6]`
//! reference-output disable, `[7]` reserved (zero). Every 2-bit sub-field is
//! fully enumerated by a 4-value domain, so decoding is total.

use std::time::Duration;

use modular_bitfield::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

/// Programmable gain amplifier setting.
#[derive(BitfieldSpecifier, Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
#[bits = 2]
pub enum Gain {
    #[default]
    #[strum(to_string = "x1")]
    X1 = 0,
    #[strum(to_string = "x2")]
    X2 = 1,
    #[strum(to_string = "x64")]
    X64 = 2,
    #[strum(to_string = "x128")]
    X128 = 3,
}

impl Gain {
    /// Amplification factor applied before conversion.
    pub fn factor(&self) -> u32 {
        match self {
            Gain::X1 => 1,
            Gain::X2 => 2,
            Gain::X64 => 64,
            Gain::X128 => 128,
        }
    }

    /// Map a factor as it appears on the remote command surface (1, 2, 64
    /// or 128) back to a register code.
    pub fn from_factor(factor: u32) -> Option<Gain> {
        match factor {
            1 => Some(Gain::X1),
            2 => Some(Gain::X2),
            64 => Some(Gain::X64),
            128 => Some(Gain::X128),
            _ => None,
        }
    }
}

/// Output data rate setting.
#[derive(BitfieldSpecifier, Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
#[bits = 2]
pub enum Rate {
    #[default]
    #[strum(to_string = "10 Hz")]
    Hz10 = 0,
    #[strum(to_string = "40 Hz")]
    Hz40 = 1,
    #[strum(to_string = "640 Hz")]
    Hz640 = 2,
    #[strum(to_string = "1280 Hz")]
    Hz1280 = 3,
}

impl Rate {
    /// Output rate in samples per second.
    pub fn as_hz(&self) -> u32 {
        match self {
            Rate::Hz10 => 10,
            Rate::Hz40 => 40,
            Rate::Hz640 => 640,
            Rate::Hz1280 => 1280,
        }
    }

    /// One conversion period at this rate.
    pub fn period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.as_hz() as u64)
    }

    /// Mandatory wait after a configuration change or wake-up before the
    /// next sample is trustworthy: four conversion periods for the two slow
    /// rates, three for the two fast ones.
    pub fn settling_time(&self) -> Duration {
        let periods = match self {
            Rate::Hz10 | Rate::Hz40 => 4,
            Rate::Hz640 | Rate::Hz1280 => 3,
        };
        self.period() * periods
    }
}

/// Input channel selection.
#[derive(BitfieldSpecifier, Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
#[bits = 2]
pub enum Channel {
    #[default]
    #[strum(to_string = "channel A")]
    A = 0,
    #[strum(to_string = "reserved")]
    Reserved = 1,
    /// Internal temperature sensor. Only meaningful with [`Gain::X1`]; the
    /// command translator forces unity gain before selecting it.
    #[strum(to_string = "temperature")]
    Temperature = 2,
    #[strum(to_string = "internal short")]
    InternalShort = 3,
}

/// The configuration register itself. `ConfigRegister::new()` is the chip's
/// power-on default: gain x1, 10 Hz, channel A, reference output enabled.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRegister {
    pub channel: Channel,
    pub gain: Gain,
    pub rate: Rate,
    pub ref_out_disabled: bool,
    #[skip]
    reserved: B1,
}

impl ConfigRegister {
    /// Encode the three fields into the register byte. Total: every
    /// combination is representable.
    pub fn encode(self) -> u8 {
        self.into_bytes()[0]
    }

    /// Decode a register byte. Total: unknown patterns cannot occur since
    /// all sub-fields are fully enumerated (the reserved bit is ignored).
    pub fn decode(byte: u8) -> Self {
        Self::from_bytes([byte])
    }
}

impl Default for ConfigRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_roundtrip_all_fields() {
        for g in [Gain::X1, Gain::X2, Gain::X64, Gain::X128] {
            for r in [Rate::Hz10, Rate::Hz40, Rate::Hz640, Rate::Hz1280] {
                for c in [Channel::A, Channel::Reserved, Channel::Temperature, Channel::InternalShort] {
                    let reg = ConfigRegister::new().with_gain(g).with_rate(r).with_channel(c);
                    let decoded = ConfigRegister::decode(reg.encode());
                    assert_eq!(decoded.gain(), g);
                    assert_eq!(decoded.rate(), r);
                    assert_eq!(decoded.channel(), c);
                }
            }
        }
    }

    #[test]
    fn known_register_values() {
        // Gain x128, 10 Hz, channel A is the module's shipping default.
        let reg = ConfigRegister::new().with_gain(Gain::X128);
        assert_eq!(reg.encode(), 0x0C);

        // Dropping to unity gain lands on the power-on value.
        assert_eq!(reg.with_gain(Gain::X1).encode(), 0x00);

        // Reference-output disable sits in bit 6.
        assert_eq!(ConfigRegister::new().with_ref_out_disabled(true).encode(), 0x40);
    }

    #[test]
    fn decode_ignores_reserved_bit() {
        let decoded = ConfigRegister::decode(0x8C);
        assert_eq!(decoded.gain(), Gain::X128);
        assert_eq!(decoded.channel(), Channel::A);
    }

    #[test]
    fn gain_factor_mapping() {
        assert_eq!(Gain::from_factor(128), Some(Gain::X128));
        assert_eq!(Gain::from_factor(3), None);
        assert_eq!(Gain::X64.factor(), 64);
    }

    #[test]
    fn settling_scales_with_rate() {
        assert_eq!(Rate::Hz10.settling_time(), Duration::from_millis(400));
        assert_eq!(Rate::Hz1280.settling_time(), Rate::Hz1280.period() * 3);
    }
}
