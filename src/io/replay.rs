//! Replay fix source - delivers recorded or synthetic fixes on a timer
//!
//! Stands in for a platform location provider. Fixes come from a JSON Lines
//! file (one `RawLocationFix` per line) or from `synthetic_route`. Each start
//! replays from the first fix, so device timestamps repeat across restarts.

use crate::domain::types::RawLocationFix;
use crate::infra::clock::Clock;
use crate::io::fix_source::{FixSink, FixSource, PERMISSION_DENIED_REASON};
use anyhow::Context;
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Reason reported when start is called outside a tokio runtime
pub const NO_RUNTIME_REASON: &str = "no async runtime available for location updates";

/// Load fixes from a JSON Lines file
pub fn load_fixes<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<RawLocationFix>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixes file {}", path.display()))?;
    parse_fixes(&content).with_context(|| format!("Failed to parse fixes file {}", path.display()))
}

/// Parse JSON Lines content; blank lines are skipped
pub fn parse_fixes(content: &str) -> anyhow::Result<Vec<RawLocationFix>> {
    let mut fixes = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fix: RawLocationFix =
            serde_json::from_str(line).with_context(|| format!("invalid fix on line {}", idx + 1))?;
        fixes.push(fix);
    }
    Ok(fixes)
}

/// Deterministic walk with varying accuracy and speed
///
/// Cycles through good, mediocre and unusable accuracy and through stationary,
/// moving and unknown speed, so every classification branch is exercised.
pub fn synthetic_route(
    origin: (f64, f64),
    count: usize,
    start_time_ms: u64,
    step_ms: u64,
) -> Vec<RawLocationFix> {
    const ACCURACY_M: [f32; 5] = [6.0, 14.0, 25.0, 42.0, 75.0];
    const SPEED_MPS: [Option<f32>; 5] = [Some(0.0), Some(0.3), Some(1.2), Some(1.4), None];
    // ~1.1 m per step in latitude
    const STEP_DEG: f64 = 0.00001;

    (0..count)
        .map(|i| {
            let mut fix = RawLocationFix::new(
                origin.0 + STEP_DEG * i as f64,
                origin.1 + STEP_DEG * (i / 2) as f64,
                ACCURACY_M[i % ACCURACY_M.len()],
                start_time_ms + step_ms * i as u64,
            );
            if let Some(speed) = SPEED_MPS[i % SPEED_MPS.len()] {
                fix = fix.with_speed(speed).with_bearing(30.0);
            }
            fix
        })
        .collect()
}

struct ActiveReplay {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    /// Cleared by the task before it reports completion
    running: Arc<AtomicBool>,
}

impl ActiveReplay {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

/// Fix source that replays a fixed list of fixes at a steady interval
pub struct ReplayFixSource {
    fixes: Arc<Vec<RawLocationFix>>,
    interval: Duration,
    /// Fixes handed to the sink per delivery
    batch_size: u32,
    sink: Arc<dyn FixSink>,
    clock: Arc<dyn Clock>,
    active: Mutex<Option<ActiveReplay>>,
    /// Count of replays that ran to the end
    completed_tx: watch::Sender<u64>,
}

impl ReplayFixSource {
    pub fn new(
        fixes: Vec<RawLocationFix>,
        interval: Duration,
        sink: Arc<dyn FixSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (completed_tx, _) = watch::channel(0);
        Self {
            fixes: Arc::new(fixes),
            interval: interval.max(Duration::from_millis(1)),
            batch_size: 1,
            sink,
            clock,
            active: Mutex::new(None),
            completed_tx,
        }
    }

    /// Apply provider update limits
    ///
    /// `min_interval` floors the fix cadence. Fixes are delivered in batches
    /// that span at most `max_delay`, so a delay of several intervals turns
    /// into bursts of that many fixes.
    pub fn with_update_limits(mut self, min_interval: Duration, max_delay: Duration) -> Self {
        self.interval = self.interval.max(min_interval);
        let per_batch = max_delay.as_millis() / self.interval.as_millis().max(1);
        self.batch_size = u32::try_from(per_batch).unwrap_or(u32::MAX).max(1);
        self
    }

    /// Watch the number of replays that delivered every fix
    pub fn completions(&self) -> watch::Receiver<u64> {
        self.completed_tx.subscribe()
    }
}

impl FixSource for ReplayFixSource {
    fn start(&self, has_permission: bool) {
        if !has_permission {
            warn!("replay_start_ignored: location permission not granted");
            self.sink.on_provider_error(PERMISSION_DENIED_REASON.to_string());
            return;
        }

        let mut active = self.active.lock();
        if active.as_ref().is_some_and(ActiveReplay::is_running) {
            debug!("replay_start_called_while_active: no-op");
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "replay_start_failed");
                self.sink.on_provider_error(NO_RUNTIME_REASON.to_string());
                return;
            }
        };

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let fixes = self.fixes.clone();
        let sink = self.sink.clone();
        let clock = self.clock.clone();
        let completed_tx = self.completed_tx.clone();
        let batch_size = self.batch_size;
        let period = self.interval.saturating_mul(batch_size);
        let running = Arc::new(AtomicBool::new(true));
        let task_running = running.clone();

        info!(
            fixes = fixes.len(),
            interval_ms = self.interval.as_millis() as u64,
            batch_size = %batch_size,
            "replay_started"
        );

        let handle = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for batch in fixes.chunks(batch_size as usize) {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = clock.now_ms();
                        for fix in batch {
                            sink.on_fix(fix.clone().with_ingest_time(now));
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        task_running.store(false, Ordering::SeqCst);
                        debug!("replay_interrupted");
                        return;
                    }
                }
            }

            task_running.store(false, Ordering::SeqCst);
            completed_tx.send_modify(|n| *n += 1);
            info!("replay_exhausted");
        });

        *active = Some(ActiveReplay { shutdown_tx, handle, running });
    }

    fn stop(&self) {
        match self.active.lock().take() {
            Some(replay) => {
                let _ = replay.shutdown_tx.send(true);
                info!("replay_stopped");
            }
            None => debug!("replay_stop_called_while_idle: no-op"),
        }
    }

    fn is_active(&self) -> bool {
        self.active.lock().as_ref().is_some_and(ActiveReplay::is_running)
    }
}

impl Drop for ReplayFixSource {
    fn drop(&mut self) {
        if let Some(replay) = self.active.get_mut().take() {
            replay.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::clock::ManualClock;
    use crate::io::fix_source::testing::{RecordingSink, SinkEvent};
    use tokio::time::{sleep, timeout};

    fn source(fixes: Vec<RawLocationFix>, sink: Arc<RecordingSink>) -> ReplayFixSource {
        ReplayFixSource::new(fixes, Duration::from_millis(2), sink, Arc::new(ManualClock::new(77)))
    }

    #[test]
    fn test_parse_fixes_skips_blank_lines() {
        let content = r#"
{"latitude":27.7,"longitude":85.3,"accuracy_meters":12.0,"device_time_ms":2000,"speed_mps":0.6}

{"latitude":27.8,"longitude":85.4,"accuracy_meters":60.0,"device_time_ms":3000}
"#;
        let fixes = parse_fixes(content).unwrap();

        assert_eq!(fixes.len(), 2);
        assert_eq!(fixes[0].speed_mps, Some(0.6));
        assert_eq!(fixes[1].device_time_ms, 3000);
    }

    #[test]
    fn test_parse_fixes_reports_line_number() {
        let content = "{\"latitude\":1.0,\"longitude\":2.0,\"accuracy_meters\":5.0,\"device_time_ms\":1}\nnot json\n";
        let err = parse_fixes(content).unwrap_err();

        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_load_fixes_missing_file() {
        assert!(load_fixes("/nonexistent/fixes.jsonl").is_err());
    }

    #[test]
    fn test_synthetic_route_cycles_accuracy_and_speed() {
        let route = synthetic_route((27.7, 85.3), 10, 1_000, 500);

        assert_eq!(route.len(), 10);
        assert_eq!(route[0].accuracy_meters, 6.0);
        assert_eq!(route[4].accuracy_meters, 75.0);
        assert_eq!(route[2].speed_mps, Some(1.2));
        assert!(route[4].speed_mps.is_none());
        assert_eq!(route[3].device_time_ms, 2_500);
        assert!(route.windows(2).all(|w| w[1].latitude > w[0].latitude));
    }

    #[test]
    fn test_start_without_permission_reports_error() {
        let sink = Arc::new(RecordingSink::default());
        let replay = source(synthetic_route((0.0, 0.0), 3, 0, 1), sink.clone());

        replay.start(false);

        assert!(!replay.is_active());
        assert_eq!(sink.events(), vec![SinkEvent::Error(PERMISSION_DENIED_REASON.to_string())]);
    }

    #[test]
    fn test_start_without_runtime_reports_error() {
        let sink = Arc::new(RecordingSink::default());
        let replay = source(synthetic_route((0.0, 0.0), 3, 0, 1), sink.clone());

        replay.start(true);

        assert!(!replay.is_active());
        assert_eq!(sink.events(), vec![SinkEvent::Error(NO_RUNTIME_REASON.to_string())]);
    }

    #[tokio::test]
    async fn test_replays_all_fixes_once_despite_double_start() {
        let sink = Arc::new(RecordingSink::default());
        let fixes = synthetic_route((0.0, 0.0), 5, 0, 1);
        let replay = source(fixes.clone(), sink.clone());
        let mut completions = replay.completions();

        replay.start(true);
        replay.start(true);
        assert!(replay.is_active());

        timeout(Duration::from_secs(2), completions.changed()).await.unwrap().unwrap();
        assert_eq!(*completions.borrow(), 1);

        let delivered = sink.fixes();
        assert_eq!(delivered.len(), 5);
        assert!(delivered.iter().all(|f| f.ingest_time_ms == Some(77)));
        let device_times: Vec<u64> = delivered.iter().map(|f| f.device_time_ms).collect();
        let expected: Vec<u64> = fixes.iter().map(|f| f.device_time_ms).collect();
        assert_eq!(device_times, expected);
    }

    #[tokio::test]
    async fn test_stop_halts_delivery_and_is_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let replay = ReplayFixSource::new(
            synthetic_route((0.0, 0.0), 1_000, 0, 1),
            Duration::from_millis(20),
            sink.clone(),
            Arc::new(ManualClock::new(0)),
        );

        replay.start(true);
        sleep(Duration::from_millis(50)).await;
        replay.stop();
        replay.stop();
        sleep(Duration::from_millis(10)).await;

        let delivered = sink.fixes().len();
        assert!(delivered >= 1 && delivered < 1_000);
        assert!(!replay.is_active());

        sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.fixes().len(), delivered);
    }

    #[tokio::test]
    async fn test_restart_replays_from_first_fix() {
        let sink = Arc::new(RecordingSink::default());
        let replay = source(synthetic_route((0.0, 0.0), 2, 100, 1), sink.clone());
        let mut completions = replay.completions();

        replay.start(true);
        timeout(Duration::from_secs(2), completions.changed()).await.unwrap().unwrap();
        replay.start(true);
        timeout(Duration::from_secs(2), completions.changed()).await.unwrap().unwrap();

        let device_times: Vec<u64> = sink.fixes().iter().map(|f| f.device_time_ms).collect();
        assert_eq!(device_times, vec![100, 101, 100, 101]);
    }

    #[test]
    fn test_update_limits_floor_interval_and_batch() {
        let sink = Arc::new(RecordingSink::default());
        let replay = source(synthetic_route((0.0, 0.0), 5, 0, 1), sink)
            .with_update_limits(Duration::from_millis(10), Duration::from_millis(35));

        assert_eq!(replay.interval, Duration::from_millis(10));
        assert_eq!(replay.batch_size, 3);

        // a delay shorter than one interval still delivers one fix at a time
        let sink = Arc::new(RecordingSink::default());
        let replay = source(synthetic_route((0.0, 0.0), 5, 0, 1), sink)
            .with_update_limits(Duration::from_millis(1), Duration::ZERO);
        assert_eq!(replay.batch_size, 1);
    }

    #[tokio::test]
    async fn test_batched_replay_delivers_bursts() {
        let sink = Arc::new(RecordingSink::default());
        let replay = ReplayFixSource::new(
            synthetic_route((0.0, 0.0), 5, 0, 1),
            Duration::from_millis(50),
            sink.clone(),
            Arc::new(ManualClock::new(0)),
        )
        .with_update_limits(Duration::from_millis(50), Duration::from_millis(150));
        let mut completions = replay.completions();

        replay.start(true);
        sleep(Duration::from_millis(30)).await;
        // first batch goes out on the immediate tick, the next one 150 ms later
        assert_eq!(sink.fixes().len(), 3);

        timeout(Duration::from_secs(2), completions.changed()).await.unwrap().unwrap();
        let device_times: Vec<u64> = sink.fixes().iter().map(|f| f.device_time_ms).collect();
        assert_eq!(device_times, vec![0, 1, 2, 3, 4]);
    }
}
