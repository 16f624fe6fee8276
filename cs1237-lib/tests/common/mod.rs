//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use cs1237_lib::command::{CommandTranslator, ConfigRequest};
#[allow(unused_imports)]
pub use cs1237_lib::engine::{Cs1237, Quirks, Timeouts, sample_to_volts, sign_extend_24};
#[allow(unused_imports)]
pub use cs1237_lib::error::Cs1237Error;
#[allow(unused_imports)]
pub use cs1237_lib::frame::{ConfigKind, ErrorCode, Frame, FrameDecoder, FrameKind};
#[allow(unused_imports)]
pub use cs1237_lib::link::BitBangLink;
#[allow(unused_imports)]
pub use cs1237_lib::register::{Channel, ConfigRegister, Gain, Rate};
#[allow(unused_imports)]
pub use cs1237_lib::sim::{SimChip, SimClockPin, SimDataPin, SimDelay};
#[allow(unused_imports)]
pub use hex;

pub type SimAdc = Cs1237<SimClockPin, SimDataPin, SimDelay>;
pub type SimTranslator = CommandTranslator<SimClockPin, SimDataPin, SimDelay>;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// Simulated chip holding `register`, with a driver attached to its pins
#[allow(dead_code)]
pub fn sim_adc_with_register(register: u8) -> (SimChip, SimAdc) {
    let chip = SimChip::new();
    chip.set_register(register);
    let (clk, data, delay) = chip.pins();
    let link = BitBangLink::new(clk, data, delay).expect("Failed to set up link");
    let adc = Cs1237::new(link).expect("Failed to attach to simulated chip");
    (chip, adc)
}

/// Same, wrapped in a command translator
#[allow(dead_code)]
pub fn sim_translator_with_register(register: u8) -> (SimChip, SimTranslator) {
    let (chip, adc) = sim_adc_with_register(register);
    (chip, CommandTranslator::new(adc))
}
