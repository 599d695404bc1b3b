/// Field separator of the inbound wire format.
pub const FIELD_SEPARATOR: char = ',';

/// One timestamped measurement as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Device clock, monotonic but unit-less (usually nanoseconds).
    pub time: f64,
    /// Measured signal in millivolts.
    pub signal: f64,
    /// Duty fraction or auxiliary channel, when the device reports one.
    pub pwm: Option<f64>,
}

impl Sample {
    pub fn new(time: f64, signal: f64) -> Self {
        Self {
            time,
            signal,
            pwm: None,
        }
    }

    pub fn with_pwm(time: f64, signal: f64, pwm: f64) -> Self {
        Self {
            time,
            signal,
            pwm: Some(pwm),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Unparsable line (expected 2 or 3 fields, got {fields}): '{line}'")]
    MalformedArity { fields: usize, line: String },

    #[error("Invalid number '{field}'")]
    InvalidNumber { field: String },
}

/// Decimal numbers only: `inf` and `NaN` spellings are rejected.
fn parse_field(raw: &str) -> Result<f64, ParseError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::InvalidNumber {
            field: raw.to_string(),
        }),
    }
}

/// Parse one record of the form `time,signal` or `time,signal,pwm`.
///
/// The line is expected to be stripped of its terminator already. Callers skip
/// empty lines before getting here; an empty string is reported as a
/// one-field record.
pub fn parse_record(line: &str) -> Result<Sample, ParseError> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();

    match fields.as_slice() {
        [time, signal] => Ok(Sample::new(parse_field(time)?, parse_field(signal)?)),
        [time, signal, pwm] => Ok(Sample::with_pwm(
            parse_field(time)?,
            parse_field(signal)?,
            parse_field(pwm)?,
        )),
        _ => Err(ParseError::MalformedArity {
            fields: fields.len(),
            line: line.to_string(),
        }),
    }
}

/// Reassembles newline-terminated records from arbitrarily fragmented reads.
///
/// Carriage returns are dropped, invalid UTF-8 is replaced rather than
/// rejected and blank lines never leave the assembler.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self
                .pending
                .drain(..=pos)
                .filter(|&b| b != b'\n' && b != b'\r')
                .collect();

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Bytes received after the last newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop an unterminated fragment, returning how many bytes were lost.
    pub fn discard_pending(&mut self) -> usize {
        let lost = self.pending.len();
        self.pending.clear();
        lost
    }
}
