//! Pairing session controller
//!
//! Converts user input, remote responses and timer ticks into
//! [`SessionEvent`]s, runs them through the [`SessionStateMachine`] and
//! executes the actions it returns.
//!
//! ```text
//! open / acknowledge_policy / request_code / close
//! begin_pairing + poll_status responses
//! PollLoop + RecoveryMonitor ticks
//!   ↓
//! ControllerShared::dispatch (serialised by one async mutex)
//!   ↓
//! SessionStateMachine::handle_event (pure transitions)
//!   ↓
//! SessionActions (timers, remote calls, lifecycle events)
//! ```
//!
//! Remote calls never run under the lock: the spawned task awaits the
//! client, then re-acquires the lock and checks the session generation
//! before dispatching the result.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::AbortHandle;
use tracing::{info_span, Instrument};

use dl_core::config::PairingConfig;
use dl_core::ids::{DeviceId, SessionId};
use dl_core::pairing::{
    CloseReason, PairingError, PairingLifecycleEvent, SessionAction, SessionEvent,
    SessionOptions, SessionSnapshot, SessionStateMachine,
};
use dl_core::ports::{PairingClientPort, PairingEventPort};

use super::poll_loop::PollLoop;
use super::recovery_monitor;
use super::PairingSessionFacade;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Owns the single pairing session of a dialog and every timer attached to it.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<ControllerShared>,
}

pub(crate) struct ControllerShared {
    pub(crate) config: PairingConfig,
    pub(crate) client: Arc<dyn PairingClientPort>,
    pub(crate) context: Mutex<SessionContext>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

pub(crate) struct SessionContext {
    pub(crate) machine: SessionStateMachine,
    /// Bumped on every `open`; tasks from an older session drop their results.
    pub(crate) generation: u64,
    pub(crate) poll_loop: PollLoop,
    monitor: Option<AbortHandle>,
    pending_request: Option<AbortHandle>,
    pending_close: Option<AbortHandle>,
    subscribers: Vec<mpsc::Sender<PairingLifecycleEvent>>,
}

impl SessionContext {
    fn new(max_attempts: u32) -> Self {
        Self {
            machine: SessionStateMachine::new(max_attempts),
            generation: 0,
            poll_loop: PollLoop::new(),
            monitor: None,
            pending_request: None,
            pending_close: None,
            subscribers: Vec::new(),
        }
    }

    fn active_timer_count(&self) -> usize {
        let live = |handle: &Option<AbortHandle>| {
            usize::from(handle.as_ref().is_some_and(|h| !h.is_finished()))
        };
        self.poll_loop.active_handles()
            + live(&self.monitor)
            + live(&self.pending_request)
            + live(&self.pending_close)
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        abort(self.monitor.take());
        abort(self.pending_request.take());
        abort(self.pending_close.take());
    }
}

fn abort(handle: Option<AbortHandle>) {
    if let Some(handle) = handle {
        handle.abort();
    }
}

impl ControllerShared {
    /// Reduce one event and run the resulting actions under the session lock.
    pub(crate) fn dispatch(self: &Arc<Self>, ctx: &mut SessionContext, event: SessionEvent) {
        let actions = ctx.machine.handle_event(event);
        for action in actions {
            self.execute_action(ctx, action);
        }
        self.publish_snapshot(ctx);
    }

    fn execute_action(self: &Arc<Self>, ctx: &mut SessionContext, action: SessionAction) {
        match action {
            SessionAction::RequestCode { target_device_id } => {
                self.spawn_begin_request(ctx, target_device_id);
            }
            SessionAction::StartPolling => {
                ctx.poll_loop
                    .start(self, ctx.generation, self.config.settle_delay);
            }
            SessionAction::ResumePolling => {
                if !ctx.poll_loop.is_running() {
                    ctx.poll_loop
                        .start(self, ctx.generation, self.config.settle_delay);
                }
            }
            SessionAction::StopPolling => ctx.poll_loop.stop(),
            SessionAction::StartMonitor => {
                abort(ctx.monitor.take());
                ctx.monitor = Some(recovery_monitor::spawn(self, ctx.generation));
            }
            SessionAction::StopMonitor => abort(ctx.monitor.take()),
            SessionAction::ScheduleClose { reason } => {
                abort(ctx.pending_close.take());
                ctx.pending_close = Some(self.spawn_scheduled_close(ctx.generation, reason));
            }
            SessionAction::CancelPendingRequest => abort(ctx.pending_request.take()),
            SessionAction::CancelScheduledClose => abort(ctx.pending_close.take()),
            SessionAction::Emit(event) => {
                tracing::info!(event = ?event, "Emitting pairing lifecycle event");
                Self::emit_event_to_subscribers(&mut ctx.subscribers, event);
            }
            SessionAction::LogTransition {
                session_id,
                old_stage,
                event,
                new_stage,
            } => {
                tracing::debug!(
                    session_id = session_id.as_ref().map(SessionId::as_str).unwrap_or("-"),
                    ?old_stage,
                    ?new_stage,
                    %event,
                    "pairing session transition"
                );
            }
        }
    }

    fn spawn_begin_request(self: &Arc<Self>, ctx: &mut SessionContext, target: Option<DeviceId>) {
        if ctx
            .pending_request
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            tracing::debug!("begin_pairing already in flight, skipping duplicate request");
            return;
        }

        let shared = Arc::downgrade(self);
        let client = self.client.clone();
        let generation = ctx.generation;
        let span = info_span!(
            "pairing.begin",
            generation,
            target = target.as_ref().map(DeviceId::as_str).unwrap_or("-")
        );
        let handle = tokio::spawn(
            async move {
                let result = client.begin_pairing(target).await;

                let Some(shared) = shared.upgrade() else {
                    return;
                };
                let mut ctx = shared.context.lock().await;
                if ctx.generation != generation {
                    tracing::debug!("discarding begin_pairing response from a previous session");
                    return;
                }
                ctx.pending_request = None;

                let event = match result {
                    Ok(response) => {
                        tracing::info!(message = ?response.message, "pairing code issued");
                        SessionEvent::CodeIssued {
                            code: response.code,
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "begin_pairing failed");
                        SessionEvent::CodeRequestFailed {
                            message: err.to_string(),
                        }
                    }
                };
                shared.dispatch(&mut ctx, event);
            }
            .instrument(span),
        );
        ctx.pending_request = Some(handle.abort_handle());
    }

    fn spawn_scheduled_close(self: &Arc<Self>, generation: u64, reason: CloseReason) -> AbortHandle {
        let shared = Arc::downgrade(self);
        let delay = self.config.terminal_close_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut ctx = shared.context.lock().await;
            if ctx.generation != generation {
                return;
            }
            // Released before dispatch so CancelScheduledClose does not target this task.
            ctx.pending_close = None;
            tracing::info!(?reason, "closing pairing session after terminal status");
            shared.dispatch(&mut ctx, SessionEvent::Closed { reason });
        })
        .abort_handle()
    }

    fn emit_event_to_subscribers(
        subscribers: &mut Vec<mpsc::Sender<PairingLifecycleEvent>>,
        event: PairingLifecycleEvent,
    ) {
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Pairing event subscriber is full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Pairing event receiver dropped");
                false
            }
        });
    }

    fn publish_snapshot(&self, ctx: &SessionContext) {
        let snapshot = ctx.machine.session().snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

impl SessionController {
    /// Zero timer periods in `config` are raised to 1 ms, see
    /// [`PairingConfig::normalized`].
    pub fn new(config: PairingConfig, client: Arc<dyn PairingClientPort>) -> Self {
        let config = config.normalized();
        let context = SessionContext::new(config.max_attempts);
        let (snapshot_tx, _) = watch::channel(context.machine.session().snapshot());
        Self {
            shared: Arc::new(ControllerShared {
                config,
                client,
                context: Mutex::new(context),
                snapshot_tx,
            }),
        }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.shared.config
    }

    /// Start a fresh session.
    ///
    /// Renewals and `skip_policy` sessions request a code immediately; other
    /// sessions wait for [`acknowledge_policy`](Self::acknowledge_policy).
    pub async fn open(&self, options: SessionOptions) -> Result<SessionId, PairingError> {
        let span = info_span!(
            "pairing.open",
            renewal = options.is_renewal,
            skip_policy = options.skip_policy
        );
        async {
            let mut ctx = self.shared.context.lock().await;
            if ctx.machine.session().is_open() {
                return Err(PairingError::AlreadyOpen);
            }

            ctx.generation += 1;
            let session_id = SessionId::generate();
            tracing::info!(
                session_id = %session_id,
                generation = ctx.generation,
                "Opening pairing session"
            );
            self.shared.dispatch(
                &mut ctx,
                SessionEvent::Opened {
                    session_id: session_id.clone(),
                    options,
                },
            );
            Ok(session_id)
        }
        .instrument(span)
        .await
    }

    /// No-op outside of `AwaitingPolicy`.
    pub async fn acknowledge_policy(&self) -> Result<(), PairingError> {
        let mut ctx = self.shared.context.lock().await;
        if !ctx.machine.session().is_open() {
            return Err(PairingError::NotOpen);
        }
        self.shared.dispatch(&mut ctx, SessionEvent::PolicyAcked);
        Ok(())
    }

    /// Ask for a new code, e.g. after the first request failed.
    pub async fn request_code(&self) -> Result<(), PairingError> {
        let mut ctx = self.shared.context.lock().await;
        if !ctx.machine.session().is_open() {
            return Err(PairingError::NotOpen);
        }
        self.shared.dispatch(&mut ctx, SessionEvent::CodeRequested);
        Ok(())
    }

    /// Close the session and release every timer.
    ///
    /// Idempotent. Refused with [`PairingError::CloseWhileInitializing`] while
    /// the remote device is initializing.
    pub async fn close(&self, reason: CloseReason) -> Result<(), PairingError> {
        let span = info_span!("pairing.close", ?reason);
        async {
            let mut ctx = self.shared.context.lock().await;
            let session = ctx.machine.session();
            if !session.is_open() {
                return Ok(());
            }
            if !session.can_close() {
                tracing::warn!("Refusing to close pairing session while the device is initializing");
                return Err(PairingError::CloseWhileInitializing);
            }
            self.shared.dispatch(&mut ctx, SessionEvent::Closed { reason });
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receiver that sees every snapshot change.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Timers and background tasks currently alive for the session.
    pub async fn active_timer_count(&self) -> usize {
        self.shared.context.lock().await.active_timer_count()
    }

    pub async fn is_polling(&self) -> bool {
        self.shared.context.lock().await.poll_loop.is_running()
    }
}

#[async_trait::async_trait]
impl PairingSessionFacade for SessionController {
    async fn open(&self, options: SessionOptions) -> Result<SessionId, PairingError> {
        Self::open(self, options).await
    }

    async fn acknowledge_policy(&self) -> Result<(), PairingError> {
        Self::acknowledge_policy(self).await
    }

    async fn request_code(&self) -> Result<(), PairingError> {
        Self::request_code(self).await
    }

    async fn close(&self, reason: CloseReason) -> Result<(), PairingError> {
        Self::close(self, reason).await
    }

    fn snapshot(&self) -> SessionSnapshot {
        Self::snapshot(self)
    }

    fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        Self::watch(self)
    }
}

#[async_trait::async_trait]
impl PairingEventPort for SessionController {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PairingLifecycleEvent>> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut ctx = self.shared.context.lock().await;
        ctx.subscribers.push(event_tx);
        Ok(event_rx)
    }
}
