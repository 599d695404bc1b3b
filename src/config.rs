use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid buffer capacity {0} (must be between 1 and 10000000)")]
    InvalidCapacity(usize),

    #[error("Invalid trigger threshold {0} (must be finite)")]
    InvalidThreshold(f64),

    #[error("Invalid command {0:?} (must be a single line)")]
    InvalidCommand(String),
}

/// Settings for one acquisition session.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Live buffer capacity in samples.
    pub capacity: usize,
    /// Trigger threshold in millivolts, used until `enable_trigger` overrides it.
    pub threshold: f64,
    /// Samples before the triggering one that go into a snapshot.
    pub pre_trigger_count: usize,
    /// How long the reader sleeps when the link has nothing to offer.
    pub poll_interval: Duration,
    pub baud_rate: u32,
    /// Serial read timeout. Keep it short, the running flag is only checked between reads.
    pub read_timeout: Duration,
    /// Advisory redraw period for consumers.
    pub render_interval: Duration,
}

impl AcquisitionConfig {
    pub const DEFAULT_CAPACITY: usize = 10_000;
    pub const DEFAULT_THRESHOLD: f64 = 200.0;
    pub const DEFAULT_PRE_TRIGGER: usize = 100;
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_pre_trigger_count(mut self, pre_trigger_count: usize) -> Self {
        self.pre_trigger_count = pre_trigger_count;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_render_interval(mut self, render_interval: Duration) -> Self {
        self.render_interval = render_interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::sample_buffer::check_capacity(self.capacity)?;
        if !self.threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            threshold: Self::DEFAULT_THRESHOLD,
            pre_trigger_count: Self::DEFAULT_PRE_TRIGGER,
            poll_interval: Duration::from_millis(1),
            baud_rate: Self::DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(10),
            render_interval: Duration::from_millis(300),
        }
    }
}
