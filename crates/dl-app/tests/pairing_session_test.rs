use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dl_app::{PairingSessionFacade, SessionController};
use dl_core::config::PairingConfig;
use dl_core::ids::{DeviceId, PairingCode};
use dl_core::pairing::{
    CloseReason, DeviceStatus, PairingError, PairingLifecycleEvent, SessionOptions, Stage,
};
use dl_core::ports::{
    BeginPairingResponse, PairingClientError, PairingClientPort, PairingEventPort, StatusReport,
};
use tokio::sync::mpsc;

/// Scripted remote service.
///
/// `begin_pairing` issues `code-1`, `code-2`, ... unless a scripted failure is
/// queued. `poll_status` pops the next scripted status, falling back to
/// `AWAITING_SCAN`.
#[derive(Default)]
struct ScriptedClient {
    begin_calls: Mutex<Vec<Option<DeviceId>>>,
    begin_failures: Mutex<VecDeque<bool>>,
    statuses: Mutex<VecDeque<Result<StatusReport, PairingClientError>>>,
    poll_calls: AtomicUsize,
    poll_delay: Option<Duration>,
}

impl ScriptedClient {
    fn with_statuses(statuses: Vec<Result<StatusReport, PairingClientError>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Self::default()
        }
    }

    fn fail_begin_calls(self, script: Vec<bool>) -> Self {
        *self.begin_failures.lock().unwrap() = script.into();
        self
    }

    fn begin_calls(&self) -> Vec<Option<DeviceId>> {
        self.begin_calls.lock().unwrap().clone()
    }

    fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PairingClientPort for ScriptedClient {
    async fn begin_pairing(
        &self,
        target: Option<DeviceId>,
    ) -> Result<BeginPairingResponse, PairingClientError> {
        let n = {
            let mut calls = self.begin_calls.lock().unwrap();
            calls.push(target);
            calls.len()
        };
        let fail = self
            .begin_failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);
        if fail {
            return Err(PairingClientError::Transport("connection reset".to_string()));
        }
        Ok(BeginPairingResponse {
            code: PairingCode::from(format!("code-{n}")),
            message: None,
        })
    }

    async fn poll_status(&self) -> Result<StatusReport, PairingClientError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.poll_delay {
            tokio::time::sleep(delay).await;
        }
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(status(DeviceStatus::AwaitingScan)))
    }
}

fn status(status: DeviceStatus) -> StatusReport {
    StatusReport {
        status,
        code: None,
        message: None,
    }
}

fn config(max_attempts: u32) -> PairingConfig {
    PairingConfig {
        poll_interval: Duration::from_secs(1),
        max_attempts,
        progress_interval: Duration::from_millis(100),
        settle_delay: Duration::from_millis(100),
        terminal_close_delay: Duration::from_millis(500),
        recovery_check_interval: Duration::from_secs(5),
        recovery_debounce: Duration::from_secs(1),
    }
}

async fn build(
    max_attempts: u32,
    client: ScriptedClient,
) -> (
    SessionController,
    Arc<ScriptedClient>,
    mpsc::Receiver<PairingLifecycleEvent>,
) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dl_app=debug,dl_core=debug")
        .with_test_writer()
        .try_init();
    tokio::time::pause();

    let client = Arc::new(client);
    let controller = SessionController::new(config(max_attempts), client.clone());
    let events = controller.subscribe().await.expect("subscribe");
    (controller, client, events)
}

async fn run_for(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

fn drain(events: &mut mpsc::Receiver<PairingLifecycleEvent>) -> Vec<PairingLifecycleEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn new_device_waits_for_policy_then_begins_pairing_once() {
    let (controller, client, _events) = build(10, ScriptedClient::default()).await;

    controller
        .open(SessionOptions::new_device())
        .await
        .expect("open");
    run_for(2_000).await;

    assert_eq!(controller.snapshot().stage, Stage::AwaitingPolicy);
    assert!(client.begin_calls().is_empty());
    assert_eq!(client.poll_calls(), 0);

    controller.acknowledge_policy().await.expect("ack");
    controller.acknowledge_policy().await.expect("second ack is a no-op");
    run_for(50).await;

    assert_eq!(client.begin_calls(), vec![None]);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.stage, Stage::Polling);
    assert_eq!(snapshot.code, Some(PairingCode::from("code-1")));
}

#[tokio::test]
async fn renewal_begins_immediately_with_target() {
    let (controller, client, mut events) = build(10, ScriptedClient::default()).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    assert_eq!(controller.snapshot().stage, Stage::AwaitingCode);
    run_for(50).await;

    assert_eq!(client.begin_calls(), vec![Some(DeviceId::from("dev-1"))]);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.stage, Stage::Polling);
    assert_eq!(snapshot.device_status, DeviceStatus::Initializing);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [PairingLifecycleEvent::CodeIssued { .. }]
    ));
}

#[tokio::test]
async fn skip_policy_begins_without_target() {
    let (controller, client, _events) = build(10, ScriptedClient::default()).await;

    controller
        .open(SessionOptions::new_device().with_skip_policy())
        .await
        .expect("open");
    run_for(50).await;

    assert_eq!(client.begin_calls(), vec![None]);
    assert_eq!(controller.snapshot().stage, Stage::Polling);
}

#[tokio::test]
async fn exhausted_budget_replaces_code() {
    let (controller, client, _events) = build(3, ScriptedClient::default()).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    // Polls at 0.1s, 1.1s and 2.1s; the third exhausts the budget.
    run_for(1_500).await;
    assert_eq!(controller.snapshot().attempt, 2);
    assert_eq!(client.begin_calls().len(), 1);

    run_for(650).await;

    assert_eq!(client.poll_calls(), 3);
    assert_eq!(client.begin_calls().len(), 2);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.attempt, 0);
    assert_eq!(snapshot.elapsed_ratio, 0.0);
    assert_eq!(snapshot.code, Some(PairingCode::from("code-2")));
    assert_eq!(snapshot.stage, Stage::Polling);
}

#[tokio::test]
async fn attempt_never_exceeds_max_attempts() {
    let (controller, _client, _events) = build(2, ScriptedClient::default()).await;
    let mut snapshots = controller.watch();

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");

    for _ in 0..20 {
        run_for(500).await;
        let snapshot = snapshots.borrow_and_update().clone();
        assert!(snapshot.attempt <= snapshot.max_attempts);
    }
}

#[tokio::test]
async fn connected_emits_once_and_auto_closes() {
    let client = ScriptedClient::with_statuses(vec![
        Ok(status(DeviceStatus::AwaitingScan)),
        Ok(StatusReport {
            status: DeviceStatus::Connected,
            code: None,
            message: Some("linked".to_string()),
        }),
        Ok(status(DeviceStatus::Connected)),
    ]);
    let (controller, client, mut events) = build(10, client).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    // Connected arrives on the 1.1s poll.
    run_for(1_200).await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.stage, Stage::Terminal);
    assert_eq!(snapshot.device_status, DeviceStatus::Connected);
    assert!(!controller.is_polling().await);

    // Closes 500ms after the terminal status.
    run_for(500).await;

    let snapshot = controller.snapshot();
    assert!(!snapshot.is_open);
    assert_eq!(snapshot.stage, Stage::AwaitingCode);
    assert_eq!(snapshot.code, None);
    assert_eq!(controller.active_timer_count().await, 0);
    assert_eq!(client.poll_calls(), 2);

    let events = drain(&mut events);
    let connected: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, PairingLifecycleEvent::Connected { .. }))
        .collect();
    assert_eq!(connected.len(), 1);
    assert!(matches!(
        connected[0],
        PairingLifecycleEvent::Connected { message: Some(m), .. } if m == "linked"
    ));
    assert!(!events
        .iter()
        .any(|event| matches!(event, PairingLifecycleEvent::Cancelled { .. })));
}

#[tokio::test]
async fn disconnected_emits_and_auto_closes() {
    let client = ScriptedClient::with_statuses(vec![Ok(status(DeviceStatus::Disconnected))]);
    let (controller, _client, mut events) = build(10, client).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    run_for(1_000).await;

    assert!(!controller.snapshot().is_open);
    assert_eq!(controller.active_timer_count().await, 0);
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, PairingLifecycleEvent::Disconnected { .. })));
}

#[tokio::test]
async fn close_is_refused_while_initializing() {
    let (controller, _client, _events) = build(10, ScriptedClient::default()).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    run_for(50).await;
    let before = controller.snapshot();
    assert_eq!(before.device_status, DeviceStatus::Initializing);

    let err = controller
        .close(CloseReason::UserCancelled)
        .await
        .unwrap_err();

    assert!(matches!(err, PairingError::CloseWhileInitializing));
    assert_eq!(controller.snapshot(), before);
    assert!(controller.active_timer_count().await > 0);
}

#[tokio::test]
async fn close_after_awaiting_scan_resets_and_releases_timers() {
    let (controller, _client, mut events) = build(10, ScriptedClient::default()).await;

    controller
        .open(SessionOptions::new_device())
        .await
        .expect("open");
    controller.acknowledge_policy().await.expect("ack");
    run_for(300).await;
    assert_eq!(
        controller.snapshot().device_status,
        DeviceStatus::AwaitingScan
    );

    controller
        .close(CloseReason::UserCancelled)
        .await
        .expect("close");

    let snapshot = controller.snapshot();
    assert!(!snapshot.is_open);
    assert_eq!(snapshot.stage, Stage::AwaitingPolicy);
    assert_eq!(snapshot.code, None);
    assert_eq!(snapshot.attempt, 0);
    assert_eq!(snapshot.elapsed_ratio, 0.0);
    assert_eq!(controller.active_timer_count().await, 0);
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, PairingLifecycleEvent::Cancelled { .. })));

    controller
        .close(CloseReason::UserCancelled)
        .await
        .expect("second close is a no-op");
}

#[tokio::test]
async fn close_from_policy_stage_leaves_no_timers() {
    let (controller, _client, _events) = build(10, ScriptedClient::default()).await;

    controller
        .open(SessionOptions::new_device())
        .await
        .expect("open");
    assert!(controller.active_timer_count().await > 0);

    controller
        .close(CloseReason::UserCancelled)
        .await
        .expect("close");

    assert_eq!(controller.active_timer_count().await, 0);
}

#[tokio::test]
async fn poll_transport_errors_are_not_charged() {
    let client = ScriptedClient::with_statuses(vec![
        Err(PairingClientError::Transport("timeout".to_string())),
        Err(PairingClientError::Timeout),
        Ok(status(DeviceStatus::AwaitingScan)),
    ]);
    let (controller, client, _events) = build(3, client).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    run_for(2_200).await;

    assert_eq!(client.poll_calls(), 3);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.attempt, 1);
    assert_eq!(snapshot.stage, Stage::Polling);
    assert!(controller.is_polling().await);
}

#[tokio::test]
async fn failed_first_begin_surfaces_transient_error_and_allows_retry() {
    let client = ScriptedClient::default().fail_begin_calls(vec![true]);
    let (controller, client, mut events) = build(3, client).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    run_for(50).await;

    let snapshot = controller.snapshot();
    assert!(snapshot.is_open);
    assert_eq!(snapshot.stage, Stage::AwaitingCode);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [PairingLifecycleEvent::TransientError { .. }]
    ));

    controller.request_code().await.expect("retry");
    run_for(50).await;

    assert_eq!(client.begin_calls().len(), 2);
    assert_eq!(controller.snapshot().stage, Stage::Polling);
}

#[tokio::test]
async fn failed_replacement_retries_on_next_tick() {
    let client = ScriptedClient::default().fail_begin_calls(vec![false, true]);
    let (controller, client, _events) = build(2, client).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    // Polls at 0.1s and 1.1s exhaust the budget; the replacement fails.
    run_for(1_200).await;
    assert_eq!(client.begin_calls().len(), 2);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.attempt, 1);
    assert_eq!(snapshot.code, Some(PairingCode::from("code-1")));

    // The 2.1s poll retries the replacement.
    run_for(1_000).await;

    assert_eq!(client.begin_calls().len(), 3);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.code, Some(PairingCode::from("code-3")));
    assert_eq!(snapshot.attempt, 0);
}

#[tokio::test]
async fn slow_polls_never_overlap() {
    let client = ScriptedClient {
        poll_delay: Some(Duration::from_millis(2_500)),
        ..ScriptedClient::default()
    };
    let (controller, client, _events) = build(10, client).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    // First poll starts at 0.1s and resolves at 2.6s; ticks at 1.1s and 2.1s are skipped.
    run_for(2_400).await;
    assert_eq!(client.poll_calls(), 1);

    run_for(800).await;
    assert_eq!(client.poll_calls(), 2);
    assert_eq!(controller.snapshot().attempt, 1);
}

#[tokio::test]
async fn restarting_poll_loop_keeps_single_cadence() {
    let (controller, client, _events) = build(10, ScriptedClient::default()).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    run_for(50).await;
    // Second code request restarts the loop.
    controller.request_code().await.expect("request");
    run_for(50).await;
    assert_eq!(client.begin_calls().len(), 2);

    // One poll after the settle delay, then one per interval.
    run_for(3_000).await;

    assert_eq!(client.poll_calls(), 3);
    // Status ticker, progress ticker and the recovery monitor.
    assert_eq!(controller.active_timer_count().await, 3);
}

#[tokio::test]
async fn zero_timer_periods_are_raised_and_session_stays_closable() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dl_app=debug,dl_core=debug")
        .with_test_writer()
        .try_init();
    tokio::time::pause();
    let client = Arc::new(ScriptedClient::default());
    let controller = SessionController::new(
        PairingConfig {
            poll_interval: Duration::ZERO,
            progress_interval: Duration::ZERO,
            recovery_check_interval: Duration::ZERO,
            ..config(10)
        },
        client.clone(),
    );
    assert_eq!(controller.config().poll_interval, Duration::from_millis(1));
    assert_eq!(controller.config().progress_interval, Duration::from_millis(1));
    assert_eq!(
        controller.config().recovery_check_interval,
        Duration::from_millis(1)
    );

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    run_for(105).await;

    assert!(client.poll_calls() > 0);
    assert!(controller.is_polling().await);
    assert_eq!(controller.snapshot().device_status, DeviceStatus::AwaitingScan);

    controller
        .close(CloseReason::UserCancelled)
        .await
        .expect("close");
    assert!(!controller.snapshot().is_open);
    assert_eq!(controller.active_timer_count().await, 0);
}

#[tokio::test]
async fn progress_advances_only_after_initializing() {
    let client = ScriptedClient::with_statuses(vec![
        Ok(status(DeviceStatus::Initializing)),
        Ok(status(DeviceStatus::Initializing)),
    ]);
    let (controller, _client, _events) = build(10, client).await;

    controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    run_for(2_000).await;
    assert_eq!(controller.snapshot().elapsed_ratio, 0.0);
    assert_eq!(controller.snapshot().attempt, 0);

    // AWAITING_SCAN from the 2.1s poll unfreezes the indicator.
    run_for(1_100).await;

    let snapshot = controller.snapshot();
    assert!(snapshot.elapsed_ratio > 0.0);
    assert!(snapshot.elapsed_ratio <= 1.0);
}

#[tokio::test]
async fn reopening_starts_fresh_session() {
    let (controller, client, _events) = build(10, ScriptedClient::default()).await;

    let first = controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("open");
    run_for(300).await;
    controller
        .close(CloseReason::UserCancelled)
        .await
        .expect("close");

    let second = controller
        .open(SessionOptions::renewal("dev-1"))
        .await
        .expect("reopen");
    assert_ne!(first, second);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.stage, Stage::AwaitingCode);
    assert_eq!(snapshot.code, None);
    assert_eq!(snapshot.attempt, 0);

    run_for(50).await;
    assert_eq!(client.begin_calls().len(), 2);
    assert_eq!(controller.snapshot().code, Some(PairingCode::from("code-2")));
}

#[tokio::test]
async fn facade_drives_session_through_trait_object() {
    let (controller, client, mut events) = build(10, ScriptedClient::default()).await;
    let facade: Arc<dyn PairingSessionFacade> = Arc::new(controller);
    let mut snapshots = facade.watch();

    facade
        .open(SessionOptions::new_device())
        .await
        .expect("open");
    assert_eq!(facade.snapshot().stage, Stage::AwaitingPolicy);

    facade.acknowledge_policy().await.expect("ack");
    run_for(150).await;
    assert!(snapshots.has_changed().expect("sender alive"));
    assert_eq!(snapshots.borrow_and_update().stage, Stage::Polling);
    assert_eq!(client.begin_calls(), vec![None]);

    facade
        .close(CloseReason::UserCancelled)
        .await
        .expect("close");
    assert!(!facade.snapshot().is_open);
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, PairingLifecycleEvent::Cancelled { .. })));
    assert!(matches!(
        facade.acknowledge_policy().await,
        Err(PairingError::NotOpen)
    ));
}
