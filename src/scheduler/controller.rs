use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::actions::ActionDefinition;

use super::state::{PhaseRunState, ScheduleState, SchedulerStatus, TickOutcome};

// Set to true to trace every tick.
const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "run")]
pub enum SchedulerEvent {
    Started(PhaseRunState),
    PhaseChanged(PhaseRunState),
    Tick(PhaseRunState),
    Completed(PhaseRunState),
    Stopped(PhaseRunState),
}

/// Result of calling [`PhaseScheduler::start`].
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(PhaseRunState),
    /// The run was already in progress; no second timer was created.
    AlreadyRunning(PhaseRunState),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub status: SchedulerStatus,
    pub action_id: String,
    pub run: PhaseRunState,
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Ticker {
    fn shutdown(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Plays one routine from start to completion or cancellation.
///
/// Owns at most one timer. Events are delivered on the channel supplied at
/// construction, in order, and `Completed` is sent at most once.
pub struct PhaseScheduler {
    state: Arc<Mutex<ScheduleState>>,
    ticker: Mutex<Option<Ticker>>,
    tick_interval: Duration,
    events: mpsc::UnboundedSender<SchedulerEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl PhaseScheduler {
    pub fn new(
        action: Arc<ActionDefinition>,
        tick_interval: Duration,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScheduleState::new(action))),
            ticker: Mutex::new(None),
            tick_interval: tick_interval.clamp(Duration::from_millis(1), Duration::from_secs(1)),
            events,
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        lock(&self.state).status
    }

    /// Current position. Reading it never moves the run forward, but a run
    /// past its end reports `Complete` even before the final tick lands.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = lock(&self.state);
        let (status, run) = state.peek(Instant::now());
        SchedulerSnapshot {
            status,
            action_id: state.action.id().to_string(),
            run,
        }
    }

    /// Begin playback and immediately emit the first phase.
    ///
    /// Calling this while running is a no-op that reports `AlreadyRunning`.
    /// A finished or stopped scheduler cannot be restarted.
    pub fn start(&self) -> Result<StartOutcome> {
        let mut ticker = lock(&self.ticker);
        let (first, action_id, total_seconds) = {
            let mut state = lock(&self.state);
            match state.status {
                SchedulerStatus::Running => {
                    log_info!("start ignored: '{}' already running", state.action.id());
                    return Ok(StartOutcome::AlreadyRunning(state.run.clone()));
                }
                SchedulerStatus::Complete | SchedulerStatus::Stopped => {
                    bail!("routine '{}' already finished", state.action.id());
                }
                SchedulerStatus::Idle => {}
            }
            let first = state.begin(Utc::now(), Instant::now());
            let _ = self.events.send(SchedulerEvent::Started(first.clone()));
            (
                first,
                state.action.id().to_string(),
                state.action.total_duration_seconds(),
            )
        };

        if let Some(previous) = ticker.take() {
            previous.shutdown();
        }
        *ticker = Some(self.spawn_ticker());

        log::info!("Started routine '{action_id}' ({total_seconds}s)");
        Ok(StartOutcome::Started(first))
    }

    /// Cancel playback. Safe to call in any state, any number of times.
    ///
    /// Returns true if this call stopped a live run.
    pub fn stop(&self) -> bool {
        let stopped = {
            let mut state = lock(&self.state);
            let stopped = state.stop();
            if stopped {
                let _ = self.events.send(SchedulerEvent::Stopped(state.run.clone()));
            }
            stopped
        };

        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.shutdown();
        }

        if stopped {
            log::info!("Routine stopped");
        }
        stopped
    }

    fn spawn_ticker(&self) -> Ticker {
        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if !on_tick(&state, &events) {
                            break;
                        }
                    }
                }
            }
        });

        Ticker { handle, cancel }
    }
}

/// Advance the run and emit the outcome. Returns false once the run is over.
///
/// Emission happens under the state lock so a concurrent `stop()` is ordered
/// strictly before or after the tick.
fn on_tick(state: &Mutex<ScheduleState>, events: &mpsc::UnboundedSender<SchedulerEvent>) -> bool {
    let mut guard = lock(state);
    match guard.advance(Instant::now()) {
        TickOutcome::Inactive => false,
        TickOutcome::Progress(run) => {
            log_debug!("tick {}ms", run.elapsed_ms);
            let _ = events.send(SchedulerEvent::Tick(run));
            true
        }
        TickOutcome::PhaseChanged(run) => {
            log_debug!("phase {} cycle {}", run.phase_index, run.cycle);
            let _ = events.send(SchedulerEvent::PhaseChanged(run));
            true
        }
        TickOutcome::Completed(run) => {
            log::info!("Routine '{}' complete", guard.action.id());
            let _ = events.send(SchedulerEvent::Completed(run));
            false
        }
    }
}

impl Drop for PhaseScheduler {
    fn drop(&mut self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionCatalog, DEFAULT_ACTION_ID};

    fn scheduler() -> (PhaseScheduler, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let action = ActionCatalog::builtin()
            .unwrap()
            .get(DEFAULT_ACTION_ID)
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            PhaseScheduler::new(action, Duration::from_millis(250), tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn start_emits_first_phase_immediately() {
        let (scheduler, mut rx) = scheduler();
        let outcome = scheduler.start().unwrap();
        assert!(matches!(outcome, StartOutcome::Started(ref run) if run.seconds_remaining == 4));
        match rx.try_recv().unwrap() {
            SchedulerEvent::Started(run) => {
                assert_eq!(run.phase_index, 0);
                assert_eq!(run.cycle, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(scheduler.status(), SchedulerStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_ignored() {
        let (scheduler, mut rx) = scheduler();
        scheduler.start().unwrap();
        let again = scheduler.start().unwrap();
        assert!(matches!(again, StartOutcome::AlreadyRunning(_)));

        // Only one Started event and only one timer feeding ticks.
        assert!(matches!(rx.try_recv(), Ok(SchedulerEvent::Started(_))));
        time::sleep(Duration::from_millis(1_100)).await;
        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, SchedulerEvent::Started(_)));
            ticks += 1;
        }
        assert_eq!(ticks, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_is_rejected() {
        let (scheduler, _rx) = scheduler();
        scheduler.start().unwrap();
        assert!(scheduler.stop());
        assert!(scheduler.start().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_does_not_advance_run() {
        let (scheduler, _rx) = scheduler();
        scheduler.start().unwrap();
        time::sleep(Duration::from_millis(5_100)).await;
        for _ in 0..10 {
            let snapshot = scheduler.snapshot();
            assert_eq!(snapshot.run.phase_index, 1);
            assert_eq!(snapshot.action_id, DEFAULT_ACTION_ID);
        }
        assert_eq!(scheduler.status(), SchedulerStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_is_harmless() {
        let (scheduler, mut rx) = scheduler();
        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(matches!(rx.try_recv(), Ok(SchedulerEvent::Stopped(_))));
        assert!(rx.try_recv().is_err());
    }
}
