//! Tests for the remote command surface and configuration translation

mod common;

use common::*;

#[test]
fn test_json_pga_request_writes_register() {
    let (chip, mut translator) = sim_translator_with_register(0x0C);

    let frames = translator
        .handle_json(r#"{"params":{"pga":1}}"#)
        .expect("Failed to apply command");
    assert_eq!(frames, vec![Frame::ConfigAck { of: ConfigKind::Gain, value: Gain::X1.into() }]);
    assert_eq!(chip.register(), 0x00);
    assert_eq!(chip.writes(), vec![0x00], "Exactly one register write expected");
}

#[test]
fn test_json_keys_apply_in_fixed_order() {
    let (chip, mut translator) = sim_translator_with_register(0x00);

    // Key order in the JSON text does not matter: enable, pga, mode
    let frames = translator
        .handle_json(r#"{"params":{"mode":3,"pga":64,"enable":true}}"#)
        .expect("Failed to apply command");
    assert_eq!(
        frames,
        vec![
            Frame::ConfigAck { of: ConfigKind::Power, value: 0 },
            Frame::ConfigAck { of: ConfigKind::Gain, value: Gain::X64.into() },
            Frame::ConfigAck { of: ConfigKind::Rate, value: Rate::Hz1280.into() },
        ]
    );
    assert_eq!(translator.config().gain(), Gain::X64);
    assert_eq!(translator.config().rate(), Rate::Hz1280);
    assert_eq!(chip.register(), translator.config().encode());
}

#[test]
fn test_json_unknown_keys_ignored() {
    let (_chip, mut translator) = sim_translator_with_register(0x00);
    let frames = translator
        .handle_json(r#"{"params":{"brightness":9000,"pga":2},"id":17}"#)
        .expect("Failed to apply command");
    assert_eq!(frames, vec![Frame::ConfigAck { of: ConfigKind::Gain, value: Gain::X2.into() }]);
}

#[test]
fn test_json_out_of_domain_values_dropped() {
    let (chip, mut translator) = sim_translator_with_register(0x00);
    let frames = translator
        .handle_json(r#"{"params":{"pga":3,"mode":7}}"#)
        .expect("Malformed values are dropped, not errors");
    assert!(frames.is_empty());
    assert!(chip.writes().is_empty(), "No register write may happen");
}

#[test]
fn test_json_malformed_text_is_an_error() {
    let (_chip, mut translator) = sim_translator_with_register(0x00);
    assert!(matches!(
        translator.handle_json("{not json"),
        Err(Cs1237Error::RemoteCommand(_))
    ));
}

#[test]
fn test_enable_accepts_bool_and_numeric_forms() {
    let (_chip, mut translator) = sim_translator_with_register(0x00);

    translator.handle_json(r#"{"params":{"enable":0}}"#).expect("Failed to disable");
    assert!(!translator.is_acquiring());
    assert_eq!(
        translator.sample_frame().expect("Gated read must not fail"),
        None,
        "No sample frames while acquisition is disabled"
    );

    translator.handle_json(r#"{"params":{"enable":true}}"#).expect("Failed to enable");
    assert!(translator.is_acquiring());
    assert!(translator.sample_frame().expect("Failed to read").is_some());
}

#[test]
fn test_temperature_channel_forces_unity_gain() {
    let (chip, mut translator) = sim_translator_with_register(0x0C);

    let ack = translator
        .apply(ConfigRequest::Channel(Channel::Temperature))
        .expect("Failed to select temperature channel");
    assert_eq!(
        ack,
        Frame::ConfigAck { of: ConfigKind::Channel, value: Channel::Temperature.into() }
    );

    // One extra write dropping to unity gain, then the channel write
    assert_eq!(chip.writes(), vec![0x00, 0x02]);
    assert_eq!(translator.config().gain(), Gain::X1);
    assert_eq!(translator.config().channel(), Channel::Temperature);
}

#[test]
fn test_temperature_channel_at_unity_gain_writes_once() {
    let (chip, mut translator) = sim_translator_with_register(0x00);
    translator
        .apply(ConfigRequest::Channel(Channel::Temperature))
        .expect("Failed to select temperature channel");
    assert_eq!(chip.writes(), vec![0x02]);
}

#[test]
fn test_verification_failure_rolls_back_cache() {
    let (chip, mut translator) = sim_translator_with_register(0x0C);
    chip.set_corrupt_writes(true);

    let report = translator
        .apply(ConfigRequest::Gain(Gain::X1))
        .expect("Verification failure is reported in-band");
    assert_eq!(report, Frame::Error { code: ErrorCode::VerificationFailed });

    // Memory rolls back to the last verified value; the hardware is not
    // rewritten until the operator retries
    assert_eq!(translator.config().encode(), 0x0C);
    assert_eq!(chip.writes().len(), 1, "No automatic retry");
}

#[test]
fn test_power_request_round_trip() {
    let (chip, mut translator) = sim_translator_with_register(0x00);

    let ack = translator
        .apply(ConfigRequest::Power { down: true })
        .expect("Failed to power down");
    assert_eq!(ack, Frame::ConfigAck { of: ConfigKind::Power, value: 1 });
    assert!(chip.powered_down());

    let ack = translator
        .apply(ConfigRequest::Power { down: false })
        .expect("Failed to wake");
    assert_eq!(ack, Frame::ConfigAck { of: ConfigKind::Power, value: 0 });
    assert!(!chip.powered_down());
}

#[test]
fn test_set_frames_translate_like_json() {
    let (chip, mut translator) = sim_translator_with_register(0x00);

    let ack = translator
        .handle_frame(&Frame::SetGain { gain: Gain::X128 })
        .expect("Failed to apply set-frame");
    assert_eq!(
        ack,
        Some(Frame::ConfigAck { of: ConfigKind::Gain, value: Gain::X128.into() })
    );
    assert_eq!(chip.register(), 0x0C);

    // Non-request frames pass through untouched
    let none = translator
        .handle_frame(&Frame::Sample { value: 1 })
        .expect("Non-request frame must not fail");
    assert_eq!(none, None);
}

#[test]
fn test_status_frame_counts_good_reads() {
    let (chip, mut translator) = sim_translator_with_register(0x0C);

    chip.set_next_sample(0x10);
    translator.sample_frame().expect("Failed to read").expect("Frame expected");
    translator.sample_frame().expect("Failed to read").expect("Frame expected");

    assert_eq!(
        translator.status_frame(),
        Frame::Status {
            gain: Gain::X128,
            rate: Rate::Hz10,
            channel: Channel::A,
            good_reads: 2,
        }
    );
}

#[test]
fn test_voltage_frame_reports_active_pga() {
    let (chip, mut translator) = sim_translator_with_register(0x0C);

    // Full positive scale reads as vref / gain
    chip.set_next_sample(0x7F_FFFF);
    let frame = translator
        .voltage_frame()
        .expect("Failed to read")
        .expect("Frame expected");
    let Frame::Voltage { volts, pga } = frame else {
        panic!("Expected a voltage frame, got {frame:?}");
    };
    assert_eq!(pga, 128);
    assert!((volts - 2.5 / 128.0).abs() < 1e-6);
}

#[test]
fn test_timeout_reported_as_error_frame() {
    let (chip, mut translator) = sim_translator_with_register(0x00);
    chip.set_responding(false);

    let frame = translator.sample_frame().expect("Timeout is reported in-band");
    assert_eq!(frame, Some(Frame::Error { code: ErrorCode::Timeout }));
}
