use std::collections::VecDeque;

use polars::prelude::{DataFrame, PolarsResult};

use crate::config::ConfigError;
use crate::sample::Sample;
use crate::snapshot::columns_to_dataframe;

/// Bounded FIFO of the most recent samples.
///
/// The buffer normally keeps at most `capacity` samples and evicts from the
/// head. While eviction is suspended (a trigger is capturing or holding) it
/// grows past its capacity instead, so that nothing around the event is lost.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    eviction_suspended: bool,
}

impl SampleBuffer {
    /// Largest accepted capacity. Keeps `seed + capacity` and the held
    /// buffer comfortably inside addressable memory.
    pub const MAX_CAPACITY: usize = 10_000_000;

    /// Initial allocation; larger buffers grow on demand.
    const PREALLOCATE: usize = 10_000;

    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        check_capacity(capacity)?;
        Ok(Self {
            samples: VecDeque::with_capacity(capacity.min(Self::PREALLOCATE)),
            capacity,
            eviction_suspended: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Append a sample and evict down to capacity unless eviction is suspended.
    pub fn insert(&mut self, sample: Sample) -> usize {
        self.append(sample);
        self.evict_excess()
    }

    /// Append without evicting; pair with [`Self::evict_excess`].
    pub fn append(&mut self, sample: Sample) {
        self.samples.push_back(sample);
    }

    /// Drop the oldest samples until the length fits the capacity.
    /// Returns how many samples were evicted.
    pub fn evict_excess(&mut self) -> usize {
        debug_assert!(self.capacity >= 1, "buffer capacity must stay positive");
        if self.eviction_suspended || self.samples.len() <= self.capacity {
            return 0;
        }
        let excess = self.samples.len() - self.capacity;
        self.samples.drain(..excess);
        excess
    }

    /// Change the capacity. Trims immediately unless eviction is suspended.
    /// Returns the previous capacity.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<usize, ConfigError> {
        check_capacity(capacity)?;
        let old = std::mem::replace(&mut self.capacity, capacity);
        self.evict_excess();
        Ok(old)
    }

    pub fn suspend_eviction(&mut self) {
        self.eviction_suspended = true;
    }

    /// Resume FIFO eviction, trimming whatever accumulated during the hold.
    pub fn resume_eviction(&mut self) -> usize {
        self.eviction_suspended = false;
        self.evict_excess()
    }

    pub fn is_eviction_suspended(&self) -> bool {
        self.eviction_suspended
    }

    /// Remove every sample, hold or not.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Copy of the last `min(n, len)` samples in insertion order.
    pub fn tail(&self, n: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }
}

pub(crate) fn check_capacity(capacity: usize) -> Result<(), ConfigError> {
    if (1..=SampleBuffer::MAX_CAPACITY).contains(&capacity) {
        Ok(())
    } else {
        Err(ConfigError::InvalidCapacity(capacity))
    }
}

/// Column view of a run of samples, ready to hand to a plotting widget.
///
/// `time` and `signal` cover every sample. Only samples that carry a pwm value
/// contribute to `pwm`, and `pwm_time` holds their own timestamps, so each
/// pair of columns is aligned by construction whatever the mix of two- and
/// three-field records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotSeries {
    pub time: Vec<f64>,
    pub signal: Vec<f64>,
    pub pwm_time: Vec<f64>,
    pub pwm: Vec<f64>,
    /// Row in `time` of every `pwm` entry.
    pwm_rows: Vec<usize>,
}

impl PlotSeries {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let mut series = Self {
            time: Vec::with_capacity(samples.len()),
            signal: Vec::with_capacity(samples.len()),
            ..Self::default()
        };
        for (row, sample) in samples.iter().enumerate() {
            series.time.push(sample.time);
            series.signal.push(sample.signal);
            if let Some(pwm) = sample.pwm {
                series.pwm_time.push(sample.time);
                series.pwm.push(pwm);
                series.pwm_rows.push(row);
            }
        }
        series
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn has_pwm(&self) -> bool {
        !self.pwm.is_empty()
    }

    /// Smallest and largest time, for the x-axis range.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        min_max(&self.time)
    }

    /// Smallest and largest signal, for an auto-scaled y-axis.
    pub fn signal_range(&self) -> Option<(f64, f64)> {
        min_max(&self.signal)
    }

    /// One row per sample; rows without a pwm value get a null.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut pwm: Vec<Option<f64>> = vec![None; self.time.len()];
        for (&row, &value) in self.pwm_rows.iter().zip(&self.pwm) {
            if let Some(slot) = pwm.get_mut(row) {
                *slot = Some(value);
            }
        }
        columns_to_dataframe(self.time.clone(), self.signal.clone(), pwm)
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    Some((min, max))
}
