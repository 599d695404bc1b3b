// Live monitor
//
// Reads `time,signal[,pwm]` lines from a serial device, prints a status line
// every render tick and a summary for every trigger snapshot.

use clap::Parser;
use pulse_sense_rs::{
    AcquisitionConfig, AcquisitionContext, CommandSink, LinkReader, SerialCommandWriter,
    SerialLink,
};
use std::io::{self, Write};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "live_monitor")]
#[command(version = "1.0")]
#[command(about = "Live view of a pulse/sense device with threshold trigger")]
struct Args {
    /// Serial port of the device, e.g. /dev/ttyACM0 or COM4
    port: String,

    #[arg(short, long, default_value_t = AcquisitionConfig::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Live buffer size in samples
    #[arg(short, long, default_value_t = AcquisitionConfig::DEFAULT_CAPACITY)]
    capacity: usize,

    /// Arm the trigger at this threshold (mV)
    #[arg(short, long)]
    threshold: Option<f64>,

    #[arg(long, default_value_t = AcquisitionConfig::DEFAULT_PRE_TRIGGER)]
    pre_trigger: usize,

    /// Commands sent to the device right after connecting
    #[arg(long = "send")]
    commands: Vec<String>,

    /// Stop after this many seconds
    #[arg(long, default_value_t = 30)]
    seconds: u64,

    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let config = AcquisitionConfig::default()
        .with_baud_rate(args.baud)
        .with_capacity(args.capacity)
        .with_pre_trigger_count(args.pre_trigger);

    let (reader, writer) = SerialLink::open(&args.port, &config)?;
    let ctx = AcquisitionContext::new(config)?;
    let snapshots = ctx.subscribe_to_snapshots();
    let log_lines = ctx.subscribe_to_log();

    if let Some(threshold) = args.threshold {
        ctx.enable_trigger(threshold)?;
    }

    let handle = LinkReader::new(reader, ctx.clone()).spawn();

    let mut commands = SerialCommandWriter::new(writer, ctx.clone());
    for command in &args.commands {
        commands.send_command(command)?;
    }

    let started = Instant::now();
    let tick = ctx.config().render_interval;
    while ctx.is_running() && started.elapsed() < Duration::from_secs(args.seconds) {
        std::thread::sleep(tick);

        for event in log_lines.try_iter() {
            println!("\n[{}] {}", event.level, event.message);
        }

        for snapshot in snapshots.drain() {
            let series = snapshot.plot_series();
            let (lo, hi) = series.signal_range().unwrap_or_default();
            println!(
                "\nSnapshot: {} samples ({} before trigger), signal {:.1}..{:.1} mV",
                snapshot.captured_len(),
                snapshot.pre_trigger_len(),
                lo,
                hi
            );
            println!("{}", snapshot.to_dataframe()?.head(Some(5)));
            ctx.release_hold();
        }

        let rate = ctx.take_sample_rate();
        let tail = ctx.plot_tail(ctx.capacity());
        let last = tail.signal.last().copied().unwrap_or_default();
        print!(
            "\r{} points | {:.1} samples/s | last {:.1} mV | trigger {}   ",
            tail.len(),
            rate,
            last,
            ctx.trigger_state().as_str()
        );
        io::stdout().flush()?;
    }

    ctx.stop();
    match handle.join() {
        Ok(Ok(summary)) => println!(
            "\nReader finished: {} samples, {} rejected lines",
            summary.accepted, summary.rejected
        ),
        Ok(Err(e)) => eprintln!("\nReader failed: {e}"),
        Err(_) => eprintln!("\nReader thread panicked"),
    }
    Ok(())
}
