use pulse_sense_rs::{
    AcquisitionConfig, AcquisitionContext, LinkReader, ReleaseOutcome, Sample, TriggerPhase,
};
use std::collections::VecDeque;
use std::io::Read;
use std::time::{Duration, Instant};

/// Hands out pre-split chunks, then reports "no data" until the test stops it.
struct ScriptedLink {
    chunks: VecDeque<Vec<u8>>,
}

impl ScriptedLink {
    fn new(text: &str, chunk_len: usize) -> Self {
        Self {
            chunks: text
                .as_bytes()
                .chunks(chunk_len)
                .map(<[u8]>::to_vec)
                .collect(),
        }
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.chunks.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            None => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "idle")),
        }
    }
}

fn context(capacity: usize, pre: usize) -> AcquisitionContext {
    AcquisitionContext::new(
        AcquisitionConfig::default()
            .with_capacity(capacity)
            .with_pre_trigger_count(pre)
            .with_poll_interval(Duration::from_millis(1)),
    )
    .unwrap()
}

fn wait_for_len(ctx: &AcquisitionContext, len: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while ctx.buffer_len() < len && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_end_to_end_trigger_capture() {
    let ctx = context(5, 2);
    let snapshots = ctx.subscribe_to_snapshots();
    ctx.enable_trigger(200.0).unwrap();

    let signals = [50, 60, 70, 250, 80, 90, 100, 110, 120];
    let text: String = signals
        .iter()
        .enumerate()
        .map(|(t, s)| format!("{t},{s}\r\n"))
        .collect();

    let handle = LinkReader::new(ScriptedLink::new(&text, 7), ctx.clone()).spawn();

    let snapshot = snapshots
        .next_timeout(Duration::from_secs(5))
        .expect("snapshot within timeout");
    ctx.stop();
    let summary = handle.join().unwrap().unwrap();

    let values: Vec<f64> = snapshot.samples().iter().map(|s| s.signal).collect();
    assert_eq!(values, vec![60.0, 70.0, 250.0, 80.0, 90.0, 100.0, 110.0, 120.0]);
    assert_eq!(snapshot.pre_trigger_len(), 2);
    assert_eq!(snapshot.trigger_sample().unwrap().time, 3.0);
    assert_eq!(summary.accepted, 9);
    assert_eq!(ctx.trigger_state(), TriggerPhase::Held);
    assert!(snapshots.try_next().is_none());
}

#[test]
fn test_malformed_lines_do_not_stop_the_stream() {
    let ctx = context(10, 0);
    let text = "0,1\nabc,def\n1,2,0.5\n1,2,3,4\n\n2,3\n";

    let handle = LinkReader::new(ScriptedLink::new(text, 4), ctx.clone()).spawn();
    wait_for_len(&ctx, 3);
    ctx.stop();
    let summary = handle.join().unwrap().unwrap();

    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.rejected, 2);
    let kept: Vec<Sample> = ctx.snapshot_tail(10);
    assert_eq!(
        kept,
        vec![
            Sample::new(0.0, 1.0),
            Sample::with_pwm(1.0, 2.0, 0.5),
            Sample::new(2.0, 3.0),
        ]
    );
}

#[test]
fn test_release_then_refire_on_next_crossing() {
    let ctx = context(2, 0);
    let snapshots = ctx.subscribe_to_snapshots();
    ctx.enable_trigger(100.0).unwrap();

    for (t, signal) in [150.0, 0.0, 0.0, 0.0, 0.0].into_iter().enumerate() {
        ctx.insert(Sample::new(t as f64, signal));
    }
    assert_eq!(snapshots.drain().len(), 1);
    assert_eq!(ctx.buffer_len(), 5);

    assert_eq!(ctx.release_hold(), ReleaseOutcome::Released);
    assert_eq!(ctx.buffer_len(), 2);

    for (t, signal) in [101.0, 1.0, 2.0].into_iter().enumerate() {
        ctx.insert(Sample::new(10.0 + t as f64, signal));
    }
    let second = snapshots.try_next().unwrap();
    // both previous samples are available, but pre-trigger count is zero
    assert_eq!(second.captured_len(), 3);
    assert_eq!(second.samples()[0].signal, 101.0);
}

#[test]
fn test_live_tail_readable_while_reader_runs() {
    let ctx = context(50, 0);
    let text: String = (0..200).map(|t| format!("{t},{},0.5\n", t % 7)).collect();

    let handle = LinkReader::new(ScriptedLink::new(&text, 13), ctx.clone()).spawn();
    let deadline = Instant::now() + Duration::from_secs(5);
    while ctx.snapshot_tail(1).first().map(|s| s.time) != Some(199.0) && Instant::now() < deadline {
        let series = ctx.plot_tail(20);
        assert_eq!(series.pwm_time.len(), series.pwm.len());
        assert!(series.len() <= 20);
        std::thread::yield_now();
    }
    ctx.stop();
    handle.join().unwrap().unwrap();

    let tail = ctx.snapshot_tail(100);
    assert_eq!(tail.len(), 50);
    assert_eq!(tail.first().unwrap().time, 150.0);
}

#[test]
fn test_capacity_change_during_capture_keeps_window() {
    let ctx = context(4, 1);
    let snapshots = ctx.subscribe_to_snapshots();
    ctx.enable_trigger(10.0).unwrap();

    ctx.insert(Sample::new(0.0, 0.0));
    ctx.insert(Sample::new(1.0, 20.0));
    ctx.set_buffer_capacity(1).unwrap();
    assert_eq!(ctx.buffer_len(), 2);

    for t in 2..6 {
        ctx.insert(Sample::new(f64::from(t), 0.0));
    }
    let snapshot = snapshots.try_next().unwrap();
    assert_eq!(snapshot.captured_len(), 6);

    ctx.release_hold();
    assert_eq!(ctx.buffer_len(), 1);
}
