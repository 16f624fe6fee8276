//! Tests for the telemetry frame codec, both generations

mod common;

use common::*;

#[test]
fn test_encode_sample_frame() {
    let frame = Frame::Sample { value: 0x12_3456 };
    assert_eq!(
        frame.encode(),
        hex_to_bytes("aa55050100123456740d0a"),
        "Encoded sample frame does not match expected bytes"
    );
}

#[test]
fn test_encode_error_frame() {
    let frame = Frame::Error { code: ErrorCode::Timeout };
    assert_eq!(frame.encode(), hex_to_bytes("aa55020303020d0a"));
}

#[test]
fn test_encode_config_ack_frame() {
    let frame = Frame::ConfigAck { of: ConfigKind::Gain, value: Gain::X128.into() };
    assert_eq!(frame.encode(), hex_to_bytes("aa5503b1a103100d0a"));
}

#[test]
fn test_decode_sample_frame() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed(&hex_to_bytes("aa55050100123456740d0a"));
    assert_eq!(frames, vec![Frame::Sample { value: 0x12_3456 }]);
    assert_eq!(decoder.pending(), 0);
}

#[test]
fn test_negative_sample_roundtrip() {
    let frame = Frame::Sample { value: -8_388_608 };
    let mut decoder = FrameDecoder::new();
    assert_eq!(decoder.feed(&frame.encode()), vec![frame]);
}

#[test]
fn test_status_frame_roundtrip() {
    let frame = Frame::Status {
        gain: Gain::X64,
        rate: Rate::Hz640,
        channel: Channel::Temperature,
        good_reads: 0xDEAD_BEEF,
    };
    let mut decoder = FrameDecoder::new();
    assert_eq!(decoder.feed(&frame.encode()), vec![frame]);
}

#[test]
fn test_set_request_roundtrips() {
    let requests = [
        Frame::SetGain { gain: Gain::X2 },
        Frame::SetRate { rate: Rate::Hz1280 },
        Frame::SetChannel { channel: Channel::A },
        Frame::SetPower { down: true },
    ];
    let mut decoder = FrameDecoder::new();
    for frame in requests {
        assert_eq!(decoder.feed(&frame.encode()), vec![frame]);
    }
}

#[test]
fn test_decoder_tolerates_garbage_prefix() {
    let mut wire = vec![0x00, 0xAA, 0x12, 0xFF];
    wire.extend_from_slice(&Frame::Sample { value: 42 }.encode());
    let mut decoder = FrameDecoder::new();
    assert_eq!(decoder.feed(&wire), vec![Frame::Sample { value: 42 }]);
    assert_eq!(decoder.pending(), 0);
}

#[test]
fn test_decoder_rejects_corrupted_checksum() {
    let mut wire = Frame::Sample { value: 42 }.encode().to_vec();
    let checksum_at = wire.len() - 3;
    wire[checksum_at] ^= 0x01;

    let mut decoder = FrameDecoder::new();
    assert!(decoder.feed(&wire).is_empty(), "Corrupted frame must not decode");

    // The decoder resynchronizes on the next good frame
    let frames = decoder.feed(&Frame::Error { code: ErrorCode::ReadFailed }.encode());
    assert_eq!(frames, vec![Frame::Error { code: ErrorCode::ReadFailed }]);
}

#[test]
fn test_decoder_handles_byte_at_a_time_delivery() {
    let wire = Frame::ConfigAck { of: ConfigKind::Rate, value: 2 }.encode();
    let mut decoder = FrameDecoder::new();
    let mut decoded = Vec::new();
    for &byte in wire.iter() {
        if let Some(frame) = decoder.push(byte) {
            decoded.push(frame);
        }
    }
    assert_eq!(decoded, vec![Frame::ConfigAck { of: ConfigKind::Rate, value: 2 }]);
}

#[test]
fn test_unknown_kind_is_surfaced_not_dropped() {
    // Kind 0x7F with a 2-byte payload, checksum 03^7f^01^02 = 0x7f
    let wire = hex_to_bytes("aa55037f01027f0d0a");
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed(&wire);
    assert_eq!(
        frames,
        vec![Frame::Unknown { kind: 0x7F, payload: Bytes::from_static(&[0x01, 0x02]) }]
    );
}

#[test]
fn test_split_frame_stays_pending() {
    let wire = Frame::Sample { value: 7 }.encode();
    let mut decoder = FrameDecoder::new();
    assert!(decoder.feed(&wire[..5]).is_empty());
    assert_eq!(decoder.pending(), 5);
    assert_eq!(decoder.feed(&wire[5..]), vec![Frame::Sample { value: 7 }]);
}

#[test]
fn test_encode_voltage_frame() {
    let frame = Frame::Voltage { volts: 1.25, pga: 128 };
    assert_eq!(
        frame.encode(),
        hex_to_bytes("aa550000a03f80000d0a"),
        "Voltage frames use the fixed little-endian layout without checksum"
    );
}

#[test]
fn test_decode_voltage_stream() {
    let mut wire = Frame::Voltage { volts: 1.25, pga: 128 }.encode().to_vec();
    wire.extend_from_slice(&Frame::Voltage { volts: -0.5, pga: 1 }.encode());

    let mut decoder = FrameDecoder::voltage_stream();
    let frames = decoder.feed(&wire);
    assert_eq!(
        frames,
        vec![
            Frame::Voltage { volts: 1.25, pga: 128 },
            Frame::Voltage { volts: -0.5, pga: 1 },
        ]
    );
}

#[test]
fn test_generations_do_not_cross_decode() {
    let voltage = Frame::Voltage { volts: 1.25, pga: 128 }.encode();
    let mut telemetry_decoder = FrameDecoder::new();
    assert!(telemetry_decoder.feed(&voltage).is_empty());

    let sample = Frame::Sample { value: 0x12_3456 }.encode();
    let mut voltage_decoder = FrameDecoder::voltage_stream();
    assert!(voltage_decoder.feed(&sample).is_empty());
}
