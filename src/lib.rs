//! # Pulse Sense RS
//!
//! Streaming sample buffer with threshold-triggered snapshot capture for
//! serial measurement devices that report `time,signal[,pwm]` lines.
//!
//! A reader thread parses incoming lines and inserts samples into a bounded
//! buffer. A trigger watches every inserted sample; when the signal rises
//! above the threshold it freezes eviction, keeps a few samples from before the
//! event and collects one full buffer's worth of samples after it. The finished
//! window is handed to the consumer as a [`Snapshot`].
//!
//! ## Features
//!
//! - **Bounded live buffer**: O(1) FIFO eviction, copy-on-read tail access
//! - **Trigger engine**: `Idle → Armed → Capturing → Held`, released by the operator
//! - **Channels instead of callbacks**: snapshots and log lines arrive over `mpsc`
//! - **Serial link**: polling reader with a cancellation flag, fire-and-forget commands
//! - **DataFrame output**: snapshots convert to `polars` frames for analysis
//!
//! ## Examples
//!
//! ### Trigger on an in-memory stream
//!
//! ```rust
//! use pulse_sense_rs::{AcquisitionConfig, AcquisitionContext, Sample};
//!
//! let ctx = AcquisitionContext::new(
//!     AcquisitionConfig::default()
//!         .with_capacity(5)
//!         .with_pre_trigger_count(2),
//! )?;
//! let snapshots = ctx.subscribe_to_snapshots();
//! ctx.enable_trigger(200.0)?;
//!
//! for (i, signal) in [50.0, 60.0, 70.0, 250.0, 80.0, 90.0, 100.0, 110.0, 120.0]
//!     .into_iter()
//!     .enumerate()
//! {
//!     ctx.insert(Sample::new(i as f64, signal));
//! }
//!
//! let snapshot = snapshots.try_next().expect("trigger fired");
//! assert_eq!(snapshot.captured_len(), 8);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Reading from a serial port
//!
//! ```rust,no_run
//! use pulse_sense_rs::{
//!     AcquisitionConfig, AcquisitionContext, CommandSink, LinkReader, SerialCommandWriter,
//!     SerialLink,
//! };
//!
//! let config = AcquisitionConfig::default();
//! let (reader, writer) = SerialLink::open("/dev/ttyACM0", &config)?;
//! let ctx = AcquisitionContext::new(config)?;
//!
//! let handle = LinkReader::new(reader, ctx.clone()).spawn();
//! let mut commands = SerialCommandWriter::new(writer, ctx.clone());
//! commands.send_command("20")?;
//!
//! let tail = ctx.plot_tail(1000);
//! println!("{} points on screen", tail.len());
//!
//! ctx.stop();
//! let _ = handle.join();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod acquisition;
pub mod config;
pub mod sample;
pub mod sample_buffer;
pub mod serial_terminal;
pub mod snapshot;
pub mod trigger_config;

// Re-export the main types for convenience
pub use acquisition::{AcquisitionContext, LogEvent};

pub use config::{AcquisitionConfig, ConfigError};

pub use sample::{parse_record, LineAssembler, ParseError, Sample};

pub use sample_buffer::{PlotSeries, SampleBuffer};

pub use serial_terminal::{
    CommandError, CommandSink, LinkError, LinkReader, ReaderSummary, SerialCommandWriter,
    SerialLink,
};

pub use snapshot::{samples_to_dataframe, snapshot_channel, Snapshot, SnapshotPublisher, SnapshotReceiver};

pub use trigger_config::{
    ReleaseOutcome, ThresholdTrigger, ThresholdTriggerBuilder, TriggerEngine, TriggerEvent,
    TriggerPhase, TriggerState,
};
