use crate::config::ConfigError;
use crate::sample::Sample;
use crate::sample_buffer::SampleBuffer;
use crate::snapshot::Snapshot;

/// Threshold trigger settings.
///
/// A sample fires the trigger when its signal is strictly above `threshold`;
/// a sample exactly on the threshold does not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTrigger {
    pub enabled: bool,
    pub threshold: f64,
    pub pre_trigger_count: usize,
}

impl ThresholdTrigger {
    pub fn new(threshold: f64, pre_trigger_count: usize) -> Self {
        Self {
            enabled: false,
            threshold,
            pre_trigger_count,
        }
    }

    pub fn start_capturing_when() -> ThresholdTriggerBuilder {
        ThresholdTriggerBuilder {
            threshold: 0.0,
            pre_trigger_count: 0,
        }
    }

    pub fn fires_on(&self, sample: &Sample) -> bool {
        self.enabled && sample.signal > self.threshold
    }
}

#[derive(Debug)]
pub struct ThresholdTriggerBuilder {
    threshold: f64,
    pre_trigger_count: usize,
}

impl ThresholdTriggerBuilder {
    pub fn signal_above(mut self, millivolts: f64) -> Self {
        self.threshold = millivolts;
        self
    }

    /// Keep this many samples from before the event.
    pub fn keeping_before(mut self, samples: usize) -> Self {
        self.pre_trigger_count = samples;
        self
    }

    pub fn armed(self) -> Result<ThresholdTrigger, ConfigError> {
        check_threshold(self.threshold)?;
        Ok(ThresholdTrigger {
            enabled: true,
            threshold: self.threshold,
            pre_trigger_count: self.pre_trigger_count,
        })
    }
}

fn check_threshold(threshold: f64) -> Result<(), ConfigError> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold(threshold))
    }
}

/// A snapshot being filled after the trigger fired.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureWindow {
    samples: Vec<Sample>,
    pre_trigger_len: usize,
    target_len: usize,
}

impl CaptureWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.target_len
    }

    fn push(&mut self, sample: Sample) {
        if !self.is_complete() {
            self.samples.push(sample);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerState {
    Idle,
    Armed,
    Capturing(CaptureWindow),
    Held,
}

/// State of the trigger without the in-flight window, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    Armed,
    Capturing,
    Held,
}

impl TriggerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPhase::Idle => "idle",
            TriggerPhase::Armed => "armed",
            TriggerPhase::Capturing => "capturing",
            TriggerPhase::Held => "held",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    Fired {
        signal: f64,
        threshold: f64,
        seed_len: usize,
        target_len: usize,
    },
    Completed(Snapshot),
}

/// What `release` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// A capture is still running; the hold stays until it completes.
    StillCapturing,
    NotHeld,
}

/// Watches inserted samples and drives snapshot capture.
///
/// Every method takes the live buffer so that eviction is suspended and
/// resumed in the same step as the state change.
#[derive(Debug)]
pub struct TriggerEngine {
    config: ThresholdTrigger,
    state: TriggerState,
}

impl TriggerEngine {
    pub fn new(config: ThresholdTrigger) -> Self {
        let state = if config.enabled {
            TriggerState::Armed
        } else {
            TriggerState::Idle
        };
        Self { config, state }
    }

    pub fn config(&self) -> &ThresholdTrigger {
        &self.config
    }

    pub fn state(&self) -> &TriggerState {
        &self.state
    }

    pub fn phase(&self) -> TriggerPhase {
        match self.state {
            TriggerState::Idle => TriggerPhase::Idle,
            TriggerState::Armed => TriggerPhase::Armed,
            TriggerState::Capturing(_) => TriggerPhase::Capturing,
            TriggerState::Held => TriggerPhase::Held,
        }
    }

    pub fn set_pre_trigger_count(&mut self, count: usize) {
        self.config.pre_trigger_count = count;
    }

    /// Arm with a new threshold. Any capture or hold in progress is dropped.
    pub fn enable(&mut self, threshold: f64, buffer: &mut SampleBuffer) -> Result<(), ConfigError> {
        check_threshold(threshold)?;
        self.config.threshold = threshold;
        self.config.enabled = true;
        self.state = TriggerState::Armed;
        buffer.resume_eviction();
        Ok(())
    }

    pub fn disable(&mut self, buffer: &mut SampleBuffer) {
        self.config.enabled = false;
        self.state = TriggerState::Idle;
        buffer.resume_eviction();
    }

    /// Leave `Held` and go back to `Armed`. The engine can fire again on the
    /// very next sample above the threshold.
    pub fn release(&mut self, buffer: &mut SampleBuffer) -> ReleaseOutcome {
        match self.state {
            TriggerState::Held => {
                self.state = TriggerState::Armed;
                buffer.resume_eviction();
                ReleaseOutcome::Released
            }
            TriggerState::Capturing(_) => ReleaseOutcome::StillCapturing,
            TriggerState::Idle | TriggerState::Armed => ReleaseOutcome::NotHeld,
        }
    }

    /// Look at the sample just appended to `buffer` (its last element).
    ///
    /// Must run after the append and before eviction, so every sample that
    /// preceded the new one is still available for the pre-trigger seed.
    pub fn observe(&mut self, buffer: &mut SampleBuffer) -> Option<TriggerEvent> {
        let sample = *buffer.last()?;

        match &mut self.state {
            TriggerState::Armed if self.config.fires_on(&sample) => {
                let available = buffer.len() - 1;
                let pre_trigger_len = self.config.pre_trigger_count.min(available);
                let samples = buffer.tail(pre_trigger_len + 1);
                let seed_len = samples.len();
                let target_len = seed_len.saturating_add(buffer.capacity());

                buffer.suspend_eviction();
                self.state = TriggerState::Capturing(CaptureWindow {
                    samples,
                    pre_trigger_len,
                    target_len,
                });

                Some(TriggerEvent::Fired {
                    signal: sample.signal,
                    threshold: self.config.threshold,
                    seed_len,
                    target_len,
                })
            }
            TriggerState::Capturing(window) => {
                window.push(sample);
                if !window.is_complete() {
                    return None;
                }
                match std::mem::replace(&mut self.state, TriggerState::Held) {
                    TriggerState::Capturing(window) => Some(TriggerEvent::Completed(
                        Snapshot::new(window.samples, window.pre_trigger_len),
                    )),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
