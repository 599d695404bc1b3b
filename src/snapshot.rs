use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use polars::prelude::*;

use crate::sample::Sample;
use crate::sample_buffer::PlotSeries;

const TIME_COLUMN_NAME: &str = "time";
const SIGNAL_COLUMN_NAME: &str = "signal";
const PWM_COLUMN_NAME: &str = "pwm";

/// The window captured around one trigger firing.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    samples: Vec<Sample>,
    pre_trigger_len: usize,
}

impl Snapshot {
    pub(crate) fn new(samples: Vec<Sample>, pre_trigger_len: usize) -> Self {
        Self {
            samples,
            pre_trigger_len,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn captured_len(&self) -> usize {
        self.samples.len()
    }

    /// How many samples precede the triggering one.
    pub fn pre_trigger_len(&self) -> usize {
        self.pre_trigger_len
    }

    pub fn trigger_sample(&self) -> Option<&Sample> {
        self.samples.get(self.pre_trigger_len)
    }

    pub fn plot_series(&self) -> PlotSeries {
        PlotSeries::from_samples(&self.samples)
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        samples_to_dataframe(&self.samples)
    }
}

/// Build a `time`/`signal`/`pwm` frame. Missing pwm values become nulls.
pub fn samples_to_dataframe(samples: &[Sample]) -> PolarsResult<DataFrame> {
    let time: Vec<f64> = samples.iter().map(|s| s.time).collect();
    let signal: Vec<f64> = samples.iter().map(|s| s.signal).collect();
    let pwm: Vec<Option<f64>> = samples.iter().map(|s| s.pwm).collect();
    columns_to_dataframe(time, signal, pwm)
}

pub(crate) fn columns_to_dataframe(
    time: Vec<f64>,
    signal: Vec<f64>,
    pwm: Vec<Option<f64>>,
) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(TIME_COLUMN_NAME.into(), time),
        Column::new(SIGNAL_COLUMN_NAME.into(), signal),
        Column::new(PWM_COLUMN_NAME.into(), pwm),
    ])
}

/// Create the handoff between the producer that completes snapshots and the
/// consumer that displays them.
///
/// Publishing never blocks and never overwrites: snapshots the consumer has
/// not picked up yet simply queue.
pub fn snapshot_channel() -> (SnapshotPublisher, SnapshotReceiver) {
    let (tx, rx) = mpsc::channel();
    (SnapshotPublisher { tx }, SnapshotReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    tx: Sender<Snapshot>,
}

impl SnapshotPublisher {
    /// Returns `false` when the receiving side is gone.
    pub fn publish(&self, snapshot: Snapshot) -> bool {
        self.tx.send(snapshot).is_ok()
    }
}

#[derive(Debug)]
pub struct SnapshotReceiver {
    rx: Receiver<Snapshot>,
}

impl SnapshotReceiver {
    /// Non-blocking poll, for a render tick.
    pub fn try_next(&self) -> Option<Snapshot> {
        match self.rx.try_recv() {
            Ok(snapshot) => Some(snapshot),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Snapshot> {
        match self.rx.recv_timeout(timeout) {
            Ok(snapshot) => Some(snapshot),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything published so far, oldest first.
    pub fn drain(&self) -> Vec<Snapshot> {
        self.rx.try_iter().collect()
    }
}
