use clap::Parser;
use std::error::Error;

use cs1237_lib::frame::{Frame, FrameDecoder};
use cs1237_lib::link::BitBangLink;
use cs1237_lib::sim::SimChip;
use cs1237_lib::{CommandTranslator, Cs1237};

/// Run an acquisition session against a simulated CS1237 and print the
/// telemetry frames it would put on the wire.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Number of samples to acquire
    #[arg(short = 'n', long, default_value_t = 5)]
    samples: u32,

    /// PGA factor to request before acquiring (1, 2, 64 or 128)
    #[arg(long, default_value_t = 128)]
    pga: u32,

    /// Emit generation-2 voltage frames instead of raw sample frames
    #[arg(long)]
    voltage: bool,

    /// Raw JSON command to apply before acquiring, e.g. '{"params":{"pga":64}}'
    #[arg(long)]
    json: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // Stand up a simulated chip and attach the driver to its pins
    let chip = SimChip::new();
    chip.set_register(0x0C);
    let (clk, data, delay) = chip.pins();
    let link = BitBangLink::new(clk, data, delay)?;
    let adc = Cs1237::new(link)?;
    let mut translator = CommandTranslator::new(adc);
    println!("Attached to simulated CS1237, register {:#04x}", chip.register());

    let command = args
        .json
        .unwrap_or_else(|| format!("{{\"params\":{{\"pga\":{}}}}}", args.pga));
    for ack in translator.handle_json(&command)? {
        println!("  ack: {:?}  ({})", ack, hex::encode(ack.encode()));
    }

    let mut decoder = if args.voltage {
        FrameDecoder::voltage_stream()
    } else {
        FrameDecoder::new()
    };

    for n in 0..args.samples {
        chip.set_next_sample(0x12_3456 + n);
        let frame = if args.voltage {
            translator.voltage_frame()?
        } else {
            translator.sample_frame()?
        };
        let Some(frame) = frame else { continue };

        // Round the frame through the wire codec, as the serial link would
        let wire = frame.encode();
        for decoded in decoder.feed(&wire) {
            match decoded {
                Frame::Sample { value } => {
                    println!("  sample {n}: {value}  ({})", hex::encode(&wire))
                }
                Frame::Voltage { volts, pga } => {
                    println!("  sample {n}: {volts:.6} V at pga {pga}  ({})", hex::encode(&wire))
                }
                other => println!("  sample {n}: {other:?}"),
            }
        }
    }

    println!("Status: {:?}", translator.status_frame());
    println!("Simulated time: {:?}", chip.elapsed());
    Ok(())
}
