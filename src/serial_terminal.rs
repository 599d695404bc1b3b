use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::acquisition::AcquisitionContext;
use crate::config::{AcquisitionConfig, ConfigError};
use crate::sample::LineAssembler;

const READ_CHUNK: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Link is closing, command rejected")]
    Closing,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Opens the serial link to the device.
pub struct SerialLink;

impl SerialLink {
    /// Open `port` and return a reading handle plus a cloned handle for commands.
    pub fn open(
        port: &str,
        config: &AcquisitionConfig,
    ) -> Result<(Box<dyn SerialPort>, Box<dyn SerialPort>), LinkError> {
        log::debug!("Opening {} at {} baud", port, config.baud_rate);
        let serial = serialport::new(port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()?;
        serial.clear(serialport::ClearBuffer::All)?;
        let writer = serial.try_clone()?;
        Ok((serial, writer))
    }
}

/// Counters reported when the reader exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    pub accepted: u64,
    pub rejected: u64,
    /// Bytes of an unterminated line thrown away at shutdown.
    pub discarded_bytes: usize,
}

/// Producer loop: reads bytes from the link and feeds samples into the context.
pub struct LinkReader<R> {
    source: R,
    context: AcquisitionContext,
    lines: LineAssembler,
    poll_interval: Duration,
    summary: ReaderSummary,
}

impl<R: Read> LinkReader<R> {
    pub fn new(source: R, context: AcquisitionContext) -> Self {
        let poll_interval = context.config().poll_interval;
        Self {
            source,
            context,
            lines: LineAssembler::new(),
            poll_interval,
            summary: ReaderSummary::default(),
        }
    }

    /// Read until the context is stopped or the link fails.
    ///
    /// An I/O failure clears the running flag before it is returned; samples
    /// already in the buffer stay available.
    pub fn run(mut self) -> Result<ReaderSummary, LinkError> {
        let span = tracing::info_span!("link_reader");
        let _entered = span.enter();

        self.context
            .log(log::Level::Info, "Serial reader started".to_string());

        let mut chunk = [0u8; READ_CHUNK];
        while self.context.is_running() {
            if let Err(e) = self.poll_once(&mut chunk) {
                self.context
                    .log(log::Level::Error, format!("Read failed: {e}"));
                self.context.stop();
                self.finish();
                return Err(e);
            }
        }

        self.finish();
        Ok(self.summary)
    }

    /// One bounded read. Sleeps for the poll interval when nothing arrived.
    fn poll_once(&mut self, chunk: &mut [u8]) -> Result<(), LinkError> {
        match self.source.read(chunk) {
            Ok(0) => {
                thread::sleep(self.poll_interval);
                Ok(())
            }
            Ok(n) => {
                for line in self.lines.push(&chunk[..n]) {
                    match self.context.ingest_line(&line) {
                        Ok(Some(_)) => self.summary.accepted += 1,
                        Ok(None) => {}
                        Err(_) => self.summary.rejected += 1,
                    }
                }
                Ok(())
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                thread::sleep(self.poll_interval);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn finish(&mut self) {
        self.summary.discarded_bytes = self.lines.discard_pending();
        if self.summary.discarded_bytes > 0 {
            log::debug!(
                "Dropping {} bytes of an unterminated line",
                self.summary.discarded_bytes
            );
        }
        self.context.log(
            log::Level::Info,
            format!(
                "Serial reader stopped ({} samples, {} rejected lines)",
                self.summary.accepted, self.summary.rejected
            ),
        );
    }
}

impl<R: Read + Send + 'static> LinkReader<R> {
    pub fn spawn(self) -> JoinHandle<Result<ReaderSummary, LinkError>> {
        thread::spawn(move || self.run())
    }
}

/// Destination for outbound text commands.
pub trait CommandSink {
    fn send_command(&mut self, command: &str) -> Result<(), CommandError>;
}

/// Writes commands to the device, one line each, with no acknowledgement.
pub struct SerialCommandWriter<W> {
    sink: W,
    context: AcquisitionContext,
}

impl<W: Write> SerialCommandWriter<W> {
    pub fn new(sink: W, context: AcquisitionContext) -> Self {
        Self { sink, context }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> CommandSink for SerialCommandWriter<W> {
    fn send_command(&mut self, command: &str) -> Result<(), CommandError> {
        if command.contains(['\n', '\r']) {
            return Err(ConfigError::InvalidCommand(command.to_string()).into());
        }
        if !self.context.is_running() {
            self.context.log(
                log::Level::Warn,
                format!("Link closing, command not sent: {command}"),
            );
            return Err(LinkError::Closing.into());
        }

        let command_with_newline = format!("{}\n", command);
        let written = self
            .sink
            .write_all(command_with_newline.as_bytes())
            .and_then(|()| self.sink.flush());
        if let Err(e) = written {
            self.context
                .log(log::Level::Error, format!("Sending failed: {e}"));
            return Err(LinkError::from(e).into());
        }

        self.context
            .log(log::Level::Info, format!(">>> Command sent: {command}"));
        Ok(())
    }
}
