// Synthetic pulse
//
// Feeds a generated pulse train through the same reader the serial link uses
// and prints the captured snapshot. No hardware required.

use clap::Parser;
use pulse_sense_rs::{AcquisitionConfig, AcquisitionContext, LinkReader};
use std::io::Cursor;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "synthetic_pulse")]
#[command(about = "Capture a trigger snapshot from a generated pulse")]
struct Args {
    #[arg(short, long, default_value_t = 500)]
    capacity: usize,

    #[arg(short, long, default_value_t = AcquisitionConfig::DEFAULT_THRESHOLD)]
    threshold: f64,

    #[arg(long, default_value_t = 50)]
    pre_trigger: usize,

    /// Sample index where the pulse starts
    #[arg(long, default_value_t = 1200)]
    pulse_at: usize,
}

fn generate(samples: usize, pulse_at: usize) -> String {
    (0..samples)
        .map(|i| {
            let in_pulse = i >= pulse_at && i < pulse_at + 100;
            let signal = if in_pulse { 650.0 } else { 40.0 + (i % 11) as f64 };
            let pwm = if in_pulse { 0.4 } else { 0.0 };
            format!("{},{signal:.1},{pwm}\n", i * 1000)
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let ctx = AcquisitionContext::new(
        AcquisitionConfig::default()
            .with_capacity(args.capacity)
            .with_pre_trigger_count(args.pre_trigger),
    )?;
    let snapshots = ctx.subscribe_to_snapshots();
    ctx.enable_trigger(args.threshold)?;

    let text = generate(args.pulse_at + 2 * args.capacity, args.pulse_at);
    let handle = LinkReader::new(Cursor::new(text.into_bytes()), ctx.clone()).spawn();

    let snapshot = snapshots.next_timeout(Duration::from_secs(10));
    ctx.stop();
    let _ = handle.join();

    match snapshot {
        Some(snapshot) => {
            let trigger = snapshot.trigger_sample().copied();
            println!(
                "Captured {} samples, {} before the trigger",
                snapshot.captured_len(),
                snapshot.pre_trigger_len()
            );
            if let Some(trigger) = trigger {
                println!("Trigger at t={} with {} mV", trigger.time, trigger.signal);
            }
            println!("{}", snapshot.to_dataframe()?);
        }
        None => println!("Signal never crossed {} mV", args.threshold),
    }
    Ok(())
}
