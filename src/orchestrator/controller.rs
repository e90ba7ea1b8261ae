use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::{
    actions::{ActionCatalog, ActionDefinition},
    analysis::{analyze_with_fallback, AnalysisOutcome, VisionAnalyzer},
    camera::{CameraHub, CameraLease},
    db::{AnalysisFacts, Database, SessionRecord, SessionStatus},
    flow::{
        resolve_route, route_for, transition, FlowEvent, FlowMachine, FlowSession, FlowState,
        RouteDecision,
    },
    haptics::{HapticDriver, HapticPattern},
    readiness::{DetectionSample, Hint, ReadinessGate, ReadinessState, ReadinessUpdate},
    scheduler::{PhaseScheduler, SchedulerEvent, SchedulerSnapshot, StartOutcome},
    settings::EngineSettings,
};

use super::events::EngineEvent;

const CAMERA_OWNER: &str = "camera-screen";

struct OrchestratorState {
    flow: FlowMachine,
    session: Option<FlowSession>,
    gate: ReadinessGate,
    last_readiness: Option<(bool, Option<Hint>)>,
    camera: Option<CameraLease>,
    /// The forwarding task drains this scheduler's events and exits after
    /// `Completed` or `Stopped`.
    routine: Option<PhaseScheduler>,
}

impl OrchestratorState {
    fn session_id(&self) -> Option<String> {
        self.session.as_ref().map(|session| session.session_id.clone())
    }

    fn release_camera(&mut self) {
        if let Some(lease) = self.camera.take() {
            lease.release();
        }
    }

    fn stop_routine(&mut self) {
        if let Some(scheduler) = self.routine.take() {
            scheduler.stop();
        }
    }

    /// Drop every live resource. Safe on any path, any number of times.
    fn teardown(&mut self) {
        self.stop_routine();
        self.release_camera();
        self.gate.reset();
        self.last_readiness = None;
    }
}

/// Glue between the camera, the readiness gate, the analysis call, the phase
/// scheduler and the flow machine.
///
/// Every screen change goes through [`FlowMachine::dispatch`]; an event the
/// current state has no edge for is refused and nothing else happens.
/// Persistence failures are logged and never block a transition.
#[derive(Clone)]
pub struct SessionOrchestrator {
    state: Arc<Mutex<OrchestratorState>>,
    camera: CameraHub,
    analyzer: Arc<dyn VisionAnalyzer>,
    haptics: Arc<dyn HapticDriver>,
    db: Database,
    catalog: ActionCatalog,
    settings: EngineSettings,
    events: mpsc::UnboundedSender<EngineEvent>,
    heartbeat_every_ticks: u32,
}

impl SessionOrchestrator {
    pub fn new(
        camera: CameraHub,
        analyzer: Arc<dyn VisionAnalyzer>,
        haptics: Arc<dyn HapticDriver>,
        db: Database,
        catalog: ActionCatalog,
        settings: EngineSettings,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let debug_mode = std::env::var("BREATHCAM_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let ticks_per_second = (1_000 / settings.scheduler.tick_interval_ms()).max(1) as u32;

        let (events, receiver) = mpsc::unbounded_channel();
        let orchestrator = Self {
            state: Arc::new(Mutex::new(OrchestratorState {
                flow: FlowMachine::new(),
                session: None,
                gate: ReadinessGate::new(settings.readiness.clone()),
                last_readiness: None,
                camera: None,
                routine: None,
            })),
            camera,
            analyzer,
            haptics,
            db,
            catalog,
            settings,
            events,
            heartbeat_every_ticks: if debug_mode { 1 } else { ticks_per_second },
        };
        (orchestrator, receiver)
    }

    pub async fn state(&self) -> FlowState {
        self.state.lock().await.flow.state()
    }

    pub async fn session(&self) -> Option<FlowSession> {
        self.state.lock().await.session.clone()
    }

    pub async fn readiness(&self) -> ReadinessState {
        self.state.lock().await.gate.state().clone()
    }

    pub async fn routine_snapshot(&self) -> Option<SchedulerSnapshot> {
        let guard = self.state.lock().await;
        guard.routine.as_ref().map(PhaseScheduler::snapshot)
    }

    /// Route to render for a navigation request against the live flow.
    pub async fn resolve_route(&self, requested: &str) -> RouteDecision {
        let current = self.state().await;
        resolve_route(Some(current), requested)
    }

    /// HOME_IDLE → CAMERA with a fresh session.
    pub async fn start_session(&self) -> Result<FlowSession> {
        self.open_session(FlowEvent::Start).await
    }

    /// ERROR → CAMERA. The failed session stays abandoned; a new one begins.
    pub async fn restart(&self) -> Result<FlowSession> {
        self.open_session(FlowEvent::Restart).await
    }

    async fn open_session(&self, event: FlowEvent) -> Result<FlowSession> {
        let session = {
            let mut guard = self.state.lock().await;
            ensure_edge(&guard.flow, event)?;

            guard.teardown();
            let lease = self
                .camera
                .acquire(CAMERA_OWNER)
                .context("camera unavailable")?;
            guard.camera = Some(lease);

            let to = self.dispatch(&mut guard, event)?;
            let session = FlowSession::begin(to);
            guard.session = Some(session.clone());
            session
        };

        info!("Session {} started", session.session_id);
        let record = SessionRecord::running(session.session_id.clone(), session.created_at);
        if let Err(err) = self.db.insert_session(&record).await {
            error!("Failed to persist session {}: {err:?}", session.session_id);
        }
        Ok(session)
    }

    /// Feed one detector sample through the readiness gate.
    ///
    /// Frames that arrive after the camera screen is gone are dropped.
    pub async fn on_detection(&self, sample: &DetectionSample) -> Option<ReadinessUpdate> {
        let mut guard = self.state.lock().await;
        if guard.flow.state() != FlowState::Camera {
            return None;
        }
        let update = guard.gate.update(sample);
        self.publish_readiness(&mut guard, &update);
        Some(update)
    }

    /// A frame arrived but the detector produced nothing usable.
    pub async fn on_missing_frame(&self, timestamp_ms: u64) -> Option<ReadinessUpdate> {
        let mut guard = self.state.lock().await;
        if guard.flow.state() != FlowState::Camera {
            return None;
        }
        let update = guard.gate.update_missing(timestamp_ms);
        self.publish_readiness(&mut guard, &update);
        Some(update)
    }

    fn publish_readiness(&self, guard: &mut OrchestratorState, update: &ReadinessUpdate) {
        let current = (update.is_ready, update.hint);
        if guard.last_readiness != Some(current) {
            guard.last_readiness = Some(current);
            let _ = self.events.send(EngineEvent::Readiness(update.clone()));
        }
    }

    /// CAMERA → ANALYZING → RESULT.
    ///
    /// Only allowed once the gate reports ready. The camera is released before
    /// the analysis call; the call itself never fails the flow.
    pub async fn capture(&self) -> Result<AnalysisOutcome> {
        let (frame, session_id) = {
            let mut guard = self.state.lock().await;
            ensure_edge(&guard.flow, FlowEvent::Captured)?;
            if !guard.gate.is_ready() {
                bail!(
                    "capture refused: face not ready ({})",
                    guard.gate.state().failure_reason.as_str()
                );
            }
            let session_id = guard
                .session_id()
                .ok_or_else(|| anyhow!("no active session to capture"))?;
            let mut lease = guard
                .camera
                .take()
                .ok_or_else(|| anyhow!("camera not held by session {session_id}"))?;

            let frame = lease.capture();
            lease.release();
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    drop(guard);
                    self.fail("camera capture failed").await?;
                    return Err(err.context("camera capture failed"));
                }
            };

            guard.gate.reset();
            guard.last_readiness = None;
            self.dispatch(&mut guard, FlowEvent::Captured)?;
            (frame, session_id)
        };

        let timeout = Duration::from_millis(self.settings.analysis.timeout_ms);
        let outcome =
            analyze_with_fallback(self.analyzer.as_ref(), &frame, timeout, &self.catalog).await;

        {
            let mut guard = self.state.lock().await;
            if guard.session_id().as_deref() != Some(session_id.as_str())
                || guard.flow.state() != FlowState::Analyzing
            {
                bail!("session {session_id} left analysis before the result arrived");
            }
            if let Some(session) = guard.session.as_mut() {
                session.analysis_state = Some(outcome.result.state.as_str().to_string());
                session.before_score = Some(outcome.result.score);
                session.action_id = Some(outcome.result.action_id.clone());
                session.used_fallback = outcome.used_fallback;
            }
            self.dispatch(&mut guard, FlowEvent::Analyzed)?;
        }

        let _ = self.events.send(EngineEvent::AnalysisReady {
            session_id: session_id.clone(),
            outcome: outcome.clone(),
        });

        let facts = AnalysisFacts {
            analysis_state: outcome.result.state.as_str().to_string(),
            action_id: outcome.result.action_id.clone(),
            before_score: outcome.result.score,
            used_fallback: outcome.used_fallback,
        };
        if let Err(err) = self.db.record_analysis(&session_id, &facts, Utc::now()).await {
            error!("Failed to record analysis for {session_id}: {err:?}");
        }

        Ok(outcome)
    }

    /// RESULT → CAMERA for another attempt within the same session.
    pub async fn retake(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        ensure_edge(&guard.flow, FlowEvent::Retake)?;
        guard.teardown();
        let lease = self
            .camera
            .acquire(CAMERA_OWNER)
            .context("camera unavailable")?;
        guard.camera = Some(lease);
        self.dispatch(&mut guard, FlowEvent::Retake)?;
        Ok(())
    }

    /// RESULT → ACTION_RUNNING, playing the recommended routine.
    pub async fn begin_action(&self) -> Result<StartOutcome> {
        let mut guard = self.state.lock().await;
        ensure_edge(&guard.flow, FlowEvent::BeginAction)?;
        let session_id = guard
            .session_id()
            .ok_or_else(|| anyhow!("no active session"))?;
        let action = self.recommended_action(guard.session.as_ref())?;

        guard.stop_routine();
        let (tx, rx) = mpsc::unbounded_channel();
        let tick = Duration::from_millis(self.settings.scheduler.tick_interval_ms());
        let scheduler = PhaseScheduler::new(action.clone(), tick, tx);
        tokio::spawn(self.clone().forward_routine(session_id.clone(), rx));

        if let Some(session) = guard.session.as_mut() {
            session.action_id = Some(action.id().to_string());
        }
        self.dispatch(&mut guard, FlowEvent::BeginAction)?;

        info!("Session {session_id} playing '{}'", action.label());
        let outcome = scheduler.start();
        guard.routine = Some(scheduler);
        outcome
    }

    fn recommended_action(&self, session: Option<&FlowSession>) -> Result<Arc<ActionDefinition>> {
        let recommended = session
            .and_then(|session| session.action_id.as_deref())
            .and_then(|id| self.catalog.get(id));
        match recommended {
            Some(action) => Ok(action),
            None => {
                warn!("No usable recommendation; playing the default routine");
                self.catalog
                    .default_action()
                    .ok_or_else(|| anyhow!("action catalog is empty"))
            }
        }
    }

    async fn forward_routine(
        self,
        session_id: String,
        mut rx: mpsc::UnboundedReceiver<SchedulerEvent>,
    ) {
        let haptics_enabled = self.settings.haptics.enabled;
        let mut ticks: u32 = 0;

        while let Some(event) = rx.recv().await {
            let finished = match &event {
                SchedulerEvent::Started(run) | SchedulerEvent::PhaseChanged(run) => {
                    if haptics_enabled {
                        self.haptics.play(HapticPattern::for_phase(run.phase_kind));
                    }
                    false
                }
                SchedulerEvent::Tick(_) => {
                    ticks = ticks.wrapping_add(1);
                    if ticks % self.heartbeat_every_ticks != 0 {
                        continue;
                    }
                    false
                }
                SchedulerEvent::Completed(_) => {
                    if haptics_enabled {
                        self.haptics.play(HapticPattern::Success);
                    }
                    true
                }
                SchedulerEvent::Stopped(_) => true,
            };

            let completed = matches!(event, SchedulerEvent::Completed(_));
            let _ = self.events.send(EngineEvent::Routine {
                session_id: session_id.clone(),
                event,
            });

            if completed {
                self.finish_action(&session_id).await;
            }
            if finished {
                break;
            }
        }
    }

    /// ACTION_RUNNING → FEEDBACK, driven only by the scheduler's completion.
    async fn finish_action(&self, session_id: &str) {
        let mut guard = self.state.lock().await;
        if guard.session_id().as_deref() != Some(session_id) {
            warn!("Routine for {session_id} completed after its session ended");
            return;
        }
        if guard.flow.state() != FlowState::ActionRunning {
            warn!(
                "Routine completion ignored in {}",
                guard.flow.state().as_str()
            );
            return;
        }
        guard.routine = None;
        if let Err(err) = self.dispatch(&mut guard, FlowEvent::ActionDone) {
            warn!("Routine completion ignored: {err}");
        }
    }

    /// FEEDBACK → SHARE_PROMPT, closing out the session record.
    pub async fn submit_feedback(&self, after_score: u8, feedback: Option<String>) -> Result<()> {
        if after_score > 100 {
            bail!("after score {after_score} out of range");
        }
        let session_id = {
            let mut guard = self.state.lock().await;
            ensure_edge(&guard.flow, FlowEvent::FeedbackGiven)?;
            if let Some(session) = guard.session.as_mut() {
                session.after_score = Some(after_score);
                session.feedback = feedback.clone();
            }
            self.dispatch(&mut guard, FlowEvent::FeedbackGiven)?;
            guard.session_id()
        };

        if let Some(session_id) = session_id {
            if let Err(err) = self
                .db
                .complete_session(&session_id, Some(after_score), feedback, Utc::now())
                .await
            {
                error!("Failed to complete session {session_id}: {err:?}");
            }
        }
        Ok(())
    }

    /// SHARE_PROMPT → SHARE_CARD.
    pub async fn accept_share(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        self.dispatch(&mut guard, FlowEvent::AcceptShare)?;
        Ok(())
    }

    /// SHARE_PROMPT → HOME_IDLE.
    pub async fn decline_share(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        self.dispatch(&mut guard, FlowEvent::Decline)?;
        guard.session = None;
        Ok(())
    }

    /// SHARE_CARD → HOME_IDLE.
    pub async fn share_done(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        self.dispatch(&mut guard, FlowEvent::ShareDone)?;
        guard.session = None;
        Ok(())
    }

    /// HOME_IDLE → HISTORY, returning the most recent completed sessions.
    pub async fn open_history(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        {
            let mut guard = self.state.lock().await;
            self.dispatch(&mut guard, FlowEvent::OpenHistory)?;
        }
        match self.db.list_completed_sessions(limit).await {
            Ok(records) => Ok(records),
            Err(err) => {
                error!("Failed to load session history: {err:?}");
                Ok(Vec::new())
            }
        }
    }

    /// Leave the current screen for HOME_IDLE, abandoning any unfinished
    /// session.
    pub async fn go_home(&self) -> Result<()> {
        let abandoned = {
            let mut guard = self.state.lock().await;
            let from = guard.flow.state();
            self.dispatch(&mut guard, FlowEvent::GoHome)?;
            guard.teardown();
            let session = guard.session.take();
            session.filter(|_| is_unfinished(from)).map(|s| s.session_id)
        };

        if let Some(session_id) = abandoned {
            self.mark_abandoned(&session_id).await;
        }
        Ok(())
    }

    /// Any mid-flow state → ERROR. Stops playback, frees the camera and marks
    /// the session abandoned.
    pub async fn fail(&self, reason: &str) -> Result<()> {
        let abandoned = {
            let mut guard = self.state.lock().await;
            let from = guard.flow.state();
            self.dispatch(&mut guard, FlowEvent::Error)?;
            guard.teardown();
            warn!("Session failed in {}: {reason}", from.as_str());
            guard
                .session
                .as_ref()
                .filter(|_| is_unfinished(from))
                .map(|s| s.session_id.clone())
        };

        if let Some(session_id) = abandoned {
            self.mark_abandoned(&session_id).await;
        }
        Ok(())
    }

    async fn mark_abandoned(&self, session_id: &str) {
        if let Err(err) = self
            .db
            .mark_session_status(session_id, SessionStatus::Abandoned, Utc::now())
            .await
        {
            error!("Failed to mark session {session_id} abandoned: {err:?}");
        }
    }

    fn dispatch(&self, guard: &mut OrchestratorState, event: FlowEvent) -> Result<FlowState> {
        let from = guard.flow.state();
        let to = guard.flow.dispatch(event)?;
        if let Some(session) = guard.session.as_mut() {
            session.state = to;
        }
        let _ = self.events.send(EngineEvent::FlowChanged {
            session_id: guard.session_id(),
            from,
            event,
            to,
            route: route_for(to),
        });
        Ok(to)
    }
}

/// Check an edge before doing any side effect that should only happen if the
/// transition will be accepted.
fn ensure_edge(flow: &FlowMachine, event: FlowEvent) -> Result<()> {
    transition(flow.state(), event)?;
    Ok(())
}

/// States where the session record has not been closed out yet.
fn is_unfinished(state: FlowState) -> bool {
    matches!(
        state,
        FlowState::Camera
            | FlowState::Analyzing
            | FlowState::Result
            | FlowState::ActionRunning
            | FlowState::Feedback
    )
}
