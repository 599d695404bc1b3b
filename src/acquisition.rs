use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::config::{AcquisitionConfig, ConfigError};
use crate::sample::{parse_record, ParseError, Sample};
use crate::sample_buffer::{PlotSeries, SampleBuffer};
use crate::snapshot::{snapshot_channel, SnapshotPublisher, SnapshotReceiver};
use crate::trigger_config::{ReleaseOutcome, ThresholdTrigger, TriggerEngine, TriggerEvent, TriggerPhase};

/// An operator-facing log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: log::Level,
    pub message: String,
}

/// Forwards log lines to the `log` facade and to at most one subscriber.
#[derive(Debug, Default)]
struct EventLog {
    subscriber: Mutex<Option<Sender<LogEvent>>>,
}

impl EventLog {
    fn emit(&self, level: log::Level, message: String) {
        log::log!(level, "{}", message);
        let mut subscriber = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = subscriber.as_ref() {
            if tx.send(LogEvent { level, message }).is_err() {
                *subscriber = None;
            }
        }
    }

    fn subscribe(&self) -> Receiver<LogEvent> {
        let (tx, rx) = mpsc::channel();
        *self.subscriber.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }
}

/// Buffer and trigger, always mutated together under one lock.
#[derive(Debug)]
struct StreamCore {
    buffer: SampleBuffer,
    trigger: TriggerEngine,
    snapshots: Option<SnapshotPublisher>,
}

impl StreamCore {
    /// Append one sample and run the trigger. The returned line is meant to
    /// be logged once the lock is released.
    fn insert(&mut self, sample: Sample) -> Option<LogEvent> {
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!("insert"), 0));

        self.buffer.append(sample);
        let note = match self.trigger.observe(&mut self.buffer) {
            Some(TriggerEvent::Fired {
                signal,
                threshold,
                seed_len,
                target_len,
            }) => Some(LogEvent {
                level: log::Level::Info,
                message: format!(
                    "Trigger fired at {signal} (threshold {threshold}): snapshot starts with {seed_len} samples, target {target_len}"
                ),
            }),
            Some(TriggerEvent::Completed(snapshot)) => {
                let captured = snapshot.captured_len();
                let delivered = self
                    .snapshots
                    .as_ref()
                    .is_some_and(|publisher| publisher.publish(snapshot));
                Some(if delivered {
                    LogEvent {
                        level: log::Level::Info,
                        message: format!("Snapshot ready ({captured} samples)"),
                    }
                } else {
                    LogEvent {
                        level: log::Level::Warn,
                        message: format!("Snapshot of {captured} samples dropped: nobody is subscribed"),
                    }
                })
            }
            None => None,
        };
        self.buffer.evict_excess();
        note
    }
}

struct Shared {
    core: Mutex<StreamCore>,
    log: EventLog,
    running: AtomicBool,
    accepted: AtomicU64,
    rate_mark: Mutex<Instant>,
    config: AcquisitionConfig,
}

/// Everything the reader and the renderer share.
///
/// Cheap to clone; every clone refers to the same buffer, trigger and
/// channels. The producer calls [`Self::ingest_line`] or [`Self::insert`],
/// the consumer polls [`Self::snapshot_tail`] and the receivers handed out by
/// the `subscribe_*` methods.
#[derive(Clone)]
pub struct AcquisitionContext {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AcquisitionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionContext")
            .field("running", &self.is_running())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl AcquisitionContext {
    /// Build a context with the trigger disabled and the running flag set.
    pub fn new(config: AcquisitionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let buffer = SampleBuffer::new(config.capacity)?;
        let trigger = TriggerEngine::new(ThresholdTrigger::new(
            config.threshold,
            config.pre_trigger_count,
        ));

        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(StreamCore {
                    buffer,
                    trigger,
                    snapshots: None,
                }),
                log: EventLog::default(),
                running: AtomicBool::new(true),
                accepted: AtomicU64::new(0),
                rate_mark: Mutex::new(Instant::now()),
                config,
            }),
        })
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.shared.config
    }

    fn core(&self) -> MutexGuard<'_, StreamCore> {
        self.shared.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn log(&self, level: log::Level, message: String) {
        self.shared.log.emit(level, message);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Ask the reader to stop. Outbound commands are refused from now on.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    /// Parse one line and insert the sample. Blank lines are skipped.
    ///
    /// A malformed line is logged and returned as an error; buffer and
    /// trigger are left untouched.
    pub fn ingest_line(&self, line: &str) -> Result<Option<Sample>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        match parse_record(line) {
            Ok(sample) => {
                self.insert(sample);
                Ok(Some(sample))
            }
            Err(e) => {
                self.log(log::Level::Warn, e.to_string());
                Err(e)
            }
        }
    }

    pub fn insert(&self, sample: Sample) {
        let note = self.core().insert(sample);
        self.shared.accepted.fetch_add(1, Ordering::Relaxed);
        if let Some(LogEvent { level, message }) = note {
            self.log(level, message);
        }
    }

    pub fn enable_trigger(&self, threshold: f64) -> Result<(), ConfigError> {
        {
            let mut core = self.core();
            let StreamCore { buffer, trigger, .. } = &mut *core;
            trigger.enable(threshold, buffer)?;
        }
        self.log(log::Level::Info, format!("Trigger enabled, threshold = {threshold} mV"));
        Ok(())
    }

    pub fn disable_trigger(&self) {
        {
            let mut core = self.core();
            let StreamCore { buffer, trigger, .. } = &mut *core;
            trigger.disable(buffer);
        }
        self.log(log::Level::Info, "Trigger disabled".to_string());
    }

    /// Release a hold so the buffer evicts normally again.
    pub fn release_hold(&self) -> ReleaseOutcome {
        let outcome = {
            let mut core = self.core();
            let StreamCore { buffer, trigger, .. } = &mut *core;
            trigger.release(buffer)
        };
        let message = match outcome {
            ReleaseOutcome::Released => "Trigger hold released, buffer evicts normally again",
            ReleaseOutcome::StillCapturing => "Snapshot still capturing, hold kept",
            ReleaseOutcome::NotHeld => "Trigger hold is not active",
        };
        self.log(log::Level::Info, message.to_string());
        outcome
    }

    pub fn set_pre_trigger_count(&self, count: usize) {
        self.core().trigger.set_pre_trigger_count(count);
        self.log(log::Level::Info, format!("Pre-trigger count set to {count}"));
    }

    pub fn set_buffer_capacity(&self, capacity: usize) -> Result<(), ConfigError> {
        let old = self.core().buffer.set_capacity(capacity)?;
        self.log(log::Level::Info, format!("Buffer capacity changed: {old} -> {capacity}"));
        Ok(())
    }

    pub fn reset_buffer(&self) {
        self.core().buffer.clear();
        self.log(log::Level::Info, "Buffer cleared".to_string());
    }

    /// Copy of the newest `n` samples. The lock is held only for the copy.
    pub fn snapshot_tail(&self, n: usize) -> Vec<Sample> {
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!("snapshot_tail"), 0));

        self.core().buffer.tail(n)
    }

    /// Aligned columns of the newest `n` samples, for the live plot.
    pub fn plot_tail(&self, n: usize) -> PlotSeries {
        PlotSeries::from_samples(&self.snapshot_tail(n))
    }

    /// Route completed snapshots to the returned receiver. A new subscription
    /// replaces the previous one.
    pub fn subscribe_to_snapshots(&self) -> SnapshotReceiver {
        let (publisher, receiver) = snapshot_channel();
        self.core().snapshots = Some(publisher);
        receiver
    }

    /// Route operator log lines to the returned receiver. A new subscription
    /// replaces the previous one.
    pub fn subscribe_to_log(&self) -> Receiver<LogEvent> {
        self.shared.log.subscribe()
    }

    pub fn trigger_state(&self) -> TriggerPhase {
        self.core().trigger.phase()
    }

    pub fn trigger_config(&self) -> ThresholdTrigger {
        *self.core().trigger.config()
    }

    pub fn buffer_len(&self) -> usize {
        self.core().buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.core().buffer.capacity()
    }

    /// Accepted samples per second since the previous call.
    pub fn take_sample_rate(&self) -> f64 {
        let now = Instant::now();
        let mut mark = self.shared.rate_mark.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.duration_since(*mark).as_secs_f64();
        *mark = now;
        let accepted = self.shared.accepted.swap(0, Ordering::Relaxed);
        if elapsed > 0.0 {
            accepted as f64 / elapsed
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(capacity: usize, pre: usize) -> AcquisitionContext {
        AcquisitionContext::new(
            AcquisitionConfig::default()
                .with_capacity(capacity)
                .with_pre_trigger_count(pre),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(AcquisitionContext::new(AcquisitionConfig::default().with_capacity(0)).is_err());
        assert!(AcquisitionContext::new(AcquisitionConfig::default().with_threshold(f64::NAN)).is_err());
    }

    #[test]
    fn test_malformed_lines_are_dropped() {
        let ctx = context(10, 0);
        let lines = ["0,1", "abc,def", "1,2,0.5", "1,2,3,4", "", "2,3"];
        let results: Vec<bool> = lines.iter().map(|l| ctx.ingest_line(l).is_ok()).collect();
        assert_eq!(results, vec![true, false, true, false, true, true]);

        let signals: Vec<f64> = ctx.snapshot_tail(10).iter().map(|s| s.signal).collect();
        assert_eq!(signals, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_config_errors_leave_state_alone() {
        let ctx = context(4, 0);
        for i in 0..4 {
            ctx.insert(Sample::new(f64::from(i), 0.0));
        }
        assert_eq!(ctx.set_buffer_capacity(0), Err(ConfigError::InvalidCapacity(0)));
        assert_eq!(ctx.capacity(), 4);
        assert!(ctx.enable_trigger(f64::NAN).is_err());
        assert_eq!(ctx.trigger_state(), TriggerPhase::Idle);
        assert_eq!(ctx.buffer_len(), 4);
    }

    #[test]
    fn test_reset_twice_is_empty() {
        let ctx = context(4, 0);
        ctx.insert(Sample::new(0.0, 0.0));
        ctx.reset_buffer();
        assert_eq!(ctx.buffer_len(), 0);
        ctx.reset_buffer();
        assert_eq!(ctx.buffer_len(), 0);
    }

    #[test]
    fn test_snapshot_is_published_and_logged() {
        let ctx = context(2, 1);
        let snapshots = ctx.subscribe_to_snapshots();
        let log = ctx.subscribe_to_log();
        ctx.enable_trigger(10.0).unwrap();

        for (i, signal) in [0.0, 20.0, 1.0, 2.0].into_iter().enumerate() {
            ctx.insert(Sample::new(i as f64, signal));
        }

        let snapshot = snapshots.try_next().unwrap();
        assert_eq!(snapshot.captured_len(), 4);
        assert_eq!(ctx.trigger_state(), TriggerPhase::Held);

        let messages: Vec<String> = log.try_iter().map(|e| e.message).collect();
        assert!(messages.iter().any(|m| m.starts_with("Trigger fired at 20")));
        assert!(messages.iter().any(|m| m == "Snapshot ready (4 samples)"));
    }

    #[test]
    fn test_core_hands_log_lines_back_to_the_caller() {
        let mut core = StreamCore {
            buffer: SampleBuffer::new(2).unwrap(),
            trigger: TriggerEngine::new(ThresholdTrigger::new(10.0, 0)),
            snapshots: None,
        };
        let StreamCore { buffer, trigger, .. } = &mut core;
        trigger.enable(10.0, buffer).unwrap();

        assert_eq!(core.insert(Sample::new(0.0, 0.0)), None);
        let fired = core.insert(Sample::new(1.0, 20.0)).unwrap();
        assert_eq!(fired.level, log::Level::Info);
        assert!(fired.message.starts_with("Trigger fired at 20"));
        assert_eq!(core.insert(Sample::new(2.0, 0.0)), None);

        let dropped = core.insert(Sample::new(3.0, 0.0)).unwrap();
        assert_eq!(dropped.level, log::Level::Warn);
        assert_eq!(dropped.message, "Snapshot of 3 samples dropped: nobody is subscribed");
    }

    #[test]
    fn test_rejects_capacity_above_limit() {
        assert_eq!(
            AcquisitionContext::new(AcquisitionConfig::default().with_capacity(usize::MAX)).unwrap_err(),
            ConfigError::InvalidCapacity(usize::MAX)
        );

        let ctx = context(3, 0);
        assert_eq!(
            ctx.set_buffer_capacity(usize::MAX),
            Err(ConfigError::InvalidCapacity(usize::MAX))
        );
        assert_eq!(ctx.capacity(), 3);
        ctx.enable_trigger(10.0).unwrap();
        ctx.insert(Sample::new(0.0, 50.0));
        assert_eq!(ctx.trigger_state(), TriggerPhase::Capturing);
    }

    #[test]
    fn test_hold_blocks_eviction_until_release() {
        let ctx = context(3, 0);
        ctx.enable_trigger(10.0).unwrap();
        ctx.insert(Sample::new(0.0, 50.0));
        for i in 1..10 {
            ctx.insert(Sample::new(f64::from(i), 0.0));
        }
        assert_eq!(ctx.buffer_len(), 10);
        assert_eq!(ctx.snapshot_tail(1)[0].time, 9.0);
        assert_eq!(ctx.snapshot_tail(10)[0].time, 0.0);

        assert_eq!(ctx.release_hold(), ReleaseOutcome::Released);
        assert_eq!(ctx.buffer_len(), 3);
        assert_eq!(ctx.release_hold(), ReleaseOutcome::NotHeld);
    }

    #[test]
    fn test_disable_resumes_eviction() {
        let ctx = context(2, 0);
        ctx.enable_trigger(0.0).unwrap();
        for i in 0..5 {
            ctx.insert(Sample::new(f64::from(i), 1.0));
        }
        assert_eq!(ctx.trigger_state(), TriggerPhase::Held);
        ctx.disable_trigger();
        assert_eq!(ctx.trigger_state(), TriggerPhase::Idle);
        assert_eq!(ctx.buffer_len(), 2);
        assert!(!ctx.trigger_config().enabled);
    }

    #[test]
    fn test_sample_rate_counter_resets() {
        let ctx = context(2, 0);
        for i in 0..5 {
            ctx.insert(Sample::new(f64::from(i), 0.0));
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(ctx.take_sample_rate() > 0.0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(ctx.take_sample_rate(), 0.0);
    }

    #[test]
    fn test_stop_clears_running_flag() {
        let ctx = context(2, 0);
        let other = ctx.clone();
        assert!(other.is_running());
        ctx.stop();
        assert!(!other.is_running());
    }
}
