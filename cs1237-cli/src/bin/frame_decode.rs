use clap::Parser;
use std::error::Error;

use cs1237_lib::frame::FrameDecoder;

/// Decode a hex dump of telemetry frames captured from the serial link.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Hex-encoded bytes, e.g. aa5505011234567f0d0a
    hex: String,

    /// Treat the input as the fixed 10-byte voltage stream
    #[arg(long)]
    voltage: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let bytes = hex::decode(args.hex.trim().replace([' ', ':'], ""))?;

    let mut decoder = if args.voltage {
        FrameDecoder::voltage_stream()
    } else {
        FrameDecoder::new()
    };
    for frame in decoder.feed(&bytes) {
        println!("{frame:?}");
    }
    if decoder.pending() > 0 {
        println!("({} trailing byte(s) not part of a complete frame)", decoder.pending());
    }
    Ok(())
}
