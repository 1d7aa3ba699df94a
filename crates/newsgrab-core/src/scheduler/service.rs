use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::cycle::Cycle;
use crate::orchestrator::FetchCycleResult;

/// Whether the scheduler runs once or repeatedly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    OneShot,
    /// Fixed period between cycle starts
    Interval(Duration),
}

impl ScheduleMode {
    pub fn from_interval(interval: Option<Duration>) -> Self {
        match interval {
            Some(period) if !period.is_zero() => ScheduleMode::Interval(period),
            _ => ScheduleMode::OneShot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Events emitted after each cycle
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    CycleCompleted(FetchCycleResult),
    /// The whole cycle failed (storage or catalog unavailable)
    CycleFailed { message: String },
}

/// Totals returned when the scheduler stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle_started: Option<DateTime<Utc>>,
}

impl SchedulerReport {
    /// At least one cycle ran to completion
    pub fn is_success(&self) -> bool {
        self.cycles_completed > 0
    }
}

/// Drives cycles one after another until the schedule ends or a stop is requested
pub struct Scheduler<C> {
    cycle: C,
    mode: ScheduleMode,
    state: watch::Sender<SchedulerState>,
    event_tx: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl<C: Cycle> Scheduler<C> {
    pub fn new(cycle: C, mode: ScheduleMode) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            cycle,
            mode,
            state,
            event_tx: None,
        }
    }

    /// Set the event sender for cycle notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn send_event(&self, event: SchedulerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                warn!("Failed to send scheduler event: receiver dropped");
            }
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }

    /// Run until the schedule ends or `shutdown` becomes true.
    ///
    /// A stop request interrupts both the wait between cycles and a running
    /// cycle; dropping the cycle abandons its in-flight fetches.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SchedulerReport {
        let mut report = SchedulerReport::default();
        let anchor = Instant::now();

        match self.mode {
            ScheduleMode::OneShot => info!("Scheduler started: one-shot"),
            ScheduleMode::Interval(period) => {
                info!("Scheduler started: every {}s", period.as_secs())
            }
        }

        loop {
            if *shutdown.borrow() {
                info!("Scheduler received shutdown signal");
                break;
            }

            let started = Instant::now();
            report.last_cycle_started = Some(Utc::now());
            self.set_state(SchedulerState::Running);

            let outcome = tokio::select! {
                outcome = self.cycle.run_cycle() => Some(outcome),
                _ = wait_for_shutdown(&mut shutdown) => None,
            };

            match outcome {
                Some(Ok(result)) => {
                    report.cycles_completed += 1;
                    self.send_event(SchedulerEvent::CycleCompleted(result));
                }
                Some(Err(e)) => {
                    report.cycles_failed += 1;
                    error!("Fetch cycle failed: {}", e);
                    self.send_event(SchedulerEvent::CycleFailed {
                        message: e.to_string(),
                    });
                }
                None => {
                    info!("Scheduler received shutdown signal during a cycle");
                    break;
                }
            }

            let period = match self.mode {
                ScheduleMode::OneShot => break,
                ScheduleMode::Interval(period) => period,
            };

            self.set_state(SchedulerState::Idle);
            let next = next_start(anchor, period, started);
            if next <= Instant::now() {
                warn!("Cycle overran the {}s interval, starting next cycle now", period.as_secs());
            }

            tokio::select! {
                _ = tokio::time::sleep_until(next) => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        self.set_state(SchedulerState::Stopped);
        info!(
            "Scheduler stopped: {} cycles completed, {} failed",
            report.cycles_completed, report.cycles_failed
        );
        report
    }
}

/// First grid point `anchor + k * period` strictly after the slot `started` belongs to.
/// Overruns yield an instant in the past, so the next cycle starts right away and
/// the one after it lands back on the grid.
pub(crate) fn next_start(anchor: Instant, period: Duration, started: Instant) -> Instant {
    let period_nanos = period.as_nanos().max(1);
    let elapsed = started.saturating_duration_since(anchor).as_nanos();
    let slot = elapsed / period_nanos + 1;
    let offset = u64::try_from(slot.saturating_mul(period_nanos)).unwrap_or(u64::MAX);
    anchor + Duration::from_nanos(offset)
}

/// Resolves once `shutdown` holds true; never resolves if the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// Sleeps for scripted durations and records when each cycle started
    struct FakeCycle {
        durations: Mutex<VecDeque<Duration>>,
        failures: Mutex<VecDeque<bool>>,
        starts: Arc<Mutex<Vec<Instant>>>,
    }

    impl FakeCycle {
        fn new(durations: &[u64], failures: &[bool]) -> (Self, Arc<Mutex<Vec<Instant>>>) {
            let starts = Arc::new(Mutex::new(Vec::new()));
            let cycle = Self {
                durations: Mutex::new(durations.iter().map(|s| Duration::from_secs(*s)).collect()),
                failures: Mutex::new(failures.iter().copied().collect()),
                starts: Arc::clone(&starts),
            };
            (cycle, starts)
        }
    }

    #[async_trait::async_trait]
    impl Cycle for FakeCycle {
        async fn run_cycle(&self) -> Result<FetchCycleResult> {
            self.starts.lock().unwrap().push(Instant::now());
            let duration = self
                .durations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Duration::from_secs(5));
            let fail = self.failures.lock().unwrap().pop_front().unwrap_or(false);

            tokio::time::sleep(duration).await;

            if fail {
                return Err(Error::Other("store unreachable".to_string()));
            }
            Ok(FetchCycleResult {
                cycle_id: Uuid::new_v4(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
                outcomes: Vec::new(),
            })
        }
    }

    /// Run the scheduler until `cycles` events arrive, then request a stop
    async fn run_for(
        cycle: FakeCycle,
        mode: ScheduleMode,
        cycles: usize,
    ) -> (SchedulerReport, Vec<SchedulerEvent>) {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Scheduler::new(cycle, mode).with_event_sender(event_tx);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        let mut events = Vec::new();
        while events.len() < cycles {
            match event_rx.recv().await {
                Some(event) => events.push(event),
                None => break,
            }
        }
        let _ = shutdown_tx.send(true);
        (handle.await.unwrap(), events)
    }

    fn gaps(starts: &[Instant]) -> Vec<u64> {
        starts.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect()
    }

    #[test]
    fn test_schedule_mode_from_interval() {
        assert_eq!(ScheduleMode::from_interval(None), ScheduleMode::OneShot);
        assert_eq!(
            ScheduleMode::from_interval(Some(Duration::ZERO)),
            ScheduleMode::OneShot
        );
        assert_eq!(
            ScheduleMode::from_interval(Some(Duration::from_secs(60))),
            ScheduleMode::Interval(Duration::from_secs(60))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_start_keeps_grid() {
        let anchor = Instant::now();
        let period = Duration::from_secs(600);

        assert_eq!(next_start(anchor, period, anchor), anchor + period);
        assert_eq!(
            next_start(anchor, period, anchor + Duration::from_secs(600)),
            anchor + Duration::from_secs(1200)
        );
        // A late start still belongs to its own slot
        assert_eq!(
            next_start(anchor, period, anchor + Duration::from_secs(700)),
            anchor + Duration::from_secs(1200)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_runs_once_and_stops() {
        let (cycle, starts) = FakeCycle::new(&[5], &[]);
        let scheduler = Scheduler::new(cycle, ScheduleMode::OneShot);
        let state = scheduler.subscribe_state();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let report = scheduler.run(shutdown_rx).await;

        assert_eq!(report.cycles_completed, 1);
        assert!(report.is_success());
        assert!(report.last_cycle_started.is_some());
        assert_eq!(starts.lock().unwrap().len(), 1);
        assert_eq!(*state.borrow(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_starts_do_not_drift() {
        let (cycle, starts) = FakeCycle::new(&[5, 5, 5], &[]);
        let (report, _) = run_for(cycle, ScheduleMode::Interval(Duration::from_secs(600)), 3).await;

        assert_eq!(report.cycles_completed, 3);
        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        for gap in gaps(&starts) {
            assert!((595..=605).contains(&gap), "gap {}s", gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_starts_immediately_then_realigns() {
        let (cycle, starts) = FakeCycle::new(&[700, 5, 5], &[]);
        run_for(cycle, ScheduleMode::Interval(Duration::from_secs(600)), 3).await;

        let starts = starts.lock().unwrap();
        assert_eq!(gaps(&starts), vec![700, 500]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_does_not_stop_scheduler() {
        let (cycle, starts) = FakeCycle::new(&[5, 5], &[true, false]);
        let (report, events) =
            run_for(cycle, ScheduleMode::Interval(Duration::from_secs(60)), 2).await;

        assert!(matches!(events[0], SchedulerEvent::CycleFailed { .. }));
        assert!(matches!(events[1], SchedulerEvent::CycleCompleted(_)));
        assert_eq!(report.cycles_failed, 1);
        assert_eq!(report.cycles_completed, 1);
        assert_eq!(starts.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_running_cycle() {
        let (cycle, _) = FakeCycle::new(&[86_400], &[]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Scheduler::new(cycle, ScheduleMode::Interval(Duration::from_secs(600)));
        let mut state = scheduler.subscribe_state();
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        state
            .wait_for(|s| *s == SchedulerState::Running)
            .await
            .unwrap();
        let requested = Instant::now();
        shutdown_tx.send(true).unwrap();

        let report = handle.await.unwrap();
        assert_eq!(report.cycles_completed, 0);
        assert!(Instant::now() - requested < Duration::from_secs(1));
        assert_eq!(*state.borrow(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_wait_between_cycles() {
        let (cycle, starts) = FakeCycle::new(&[5], &[]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Scheduler::new(cycle, ScheduleMode::Interval(Duration::from_secs(3600)));
        let mut state = scheduler.subscribe_state();
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        state
            .wait_for(|s| *s == SchedulerState::Running)
            .await
            .unwrap();
        state.wait_for(|s| *s == SchedulerState::Idle).await.unwrap();
        shutdown_tx.send(true).unwrap();

        let report = handle.await.unwrap();
        assert_eq!(report.cycles_completed, 1);
        assert_eq!(starts.lock().unwrap().len(), 1);
    }
}
