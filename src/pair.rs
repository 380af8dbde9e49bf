//! The `pair` command: drive one pairing session from open to close.

use std::future::Future;
use std::process::ExitCode;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::Instant;

use dl_app::SessionController;
use dl_core::pairing::{
    CloseReason, DeviceStatus, PairingError, PairingLifecycleEvent, SessionOptions, Stage,
};
use dl_core::ports::PairingEventPort;

use crate::cli::PairArgs;
use crate::presenter::{render_event, Presenter, POLICY_PROMPT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    Connected,
    Disconnected,
    Cancelled,
}

impl PairOutcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Connected => ExitCode::SUCCESS,
            Self::Disconnected => ExitCode::from(1),
            Self::Cancelled => ExitCode::from(130),
        }
    }
}

pub fn session_options(args: &PairArgs) -> SessionOptions {
    let options = match &args.renew {
        Some(device_id) => SessionOptions::renewal(device_id.as_str()),
        None => SessionOptions::new_device(),
    };
    if args.skip_policy {
        options.with_skip_policy()
    } else {
        options
    }
}

/// Run a pairing session to completion.
///
/// `input` answers the policy prompt; `shutdown` resolving is treated as a
/// cancel request, which is retried while the device is initializing.
pub async fn run_pair<R, S>(
    controller: &SessionController,
    args: &PairArgs,
    mut input: R,
    shutdown: S,
) -> anyhow::Result<PairOutcome>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut events = controller
        .subscribe()
        .await
        .context("Failed to subscribe to pairing events")?;
    let mut snapshots = controller.watch();
    let mut presenter = Presenter::new();
    tokio::pin!(shutdown);

    let session_id = controller.open(session_options(args)).await?;
    tracing::info!(%session_id, "Pairing session opened");

    if controller.snapshot().stage == Stage::AwaitingPolicy {
        let accepted = if args.yes {
            true
        } else {
            print!("{POLICY_PROMPT}");
            flush_stdout();
            let mut answer = String::new();
            tokio::select! {
                read = input.read_line(&mut answer) => {
                    read.context("Failed to read policy answer")?;
                    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
                }
                _ = &mut shutdown => false,
            }
        };
        if !accepted {
            controller.close(CloseReason::UserCancelled).await?;
            println!("Pairing cancelled");
            return Ok(PairOutcome::Cancelled);
        }
        controller.acknowledge_policy().await?;
    }

    let retry_delay = controller.config().poll_interval;
    let mut retry_request_at: Option<Instant> = None;
    let mut shutdown_seen = false;
    let mut cancel_pending = false;
    let mut outcome: Option<PairOutcome> = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    anyhow::bail!("pairing event stream closed unexpectedly");
                };
                if event.session_id() != &session_id {
                    continue;
                }
                println!("{}", render_event(&event));
                outcome = outcome.or_else(|| terminal_outcome(&event));
                match event {
                    PairingLifecycleEvent::Cancelled { .. } => return Ok(PairOutcome::Cancelled),
                    PairingLifecycleEvent::TransientError { .. } => {
                        // Without a code there is nothing to poll; ask again later.
                        if controller.snapshot().code.is_none() {
                            retry_request_at = Some(Instant::now() + retry_delay);
                        }
                    }
                    PairingLifecycleEvent::CodeIssued { .. } => retry_request_at = None,
                    PairingLifecycleEvent::Connected { .. }
                    | PairingLifecycleEvent::Disconnected { .. } => {}
                }
            }
            changed = snapshots.changed() => {
                changed.context("pairing controller went away")?;
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(line) = presenter.render_snapshot(&snapshot) {
                    println!("{line}");
                }
                if !snapshot.is_open {
                    // Events are emitted before the close that follows them.
                    while let Ok(event) = events.try_recv() {
                        if event.session_id() == &session_id {
                            println!("{}", render_event(&event));
                            outcome = outcome.or_else(|| terminal_outcome(&event));
                        }
                    }
                    return Ok(outcome.unwrap_or(PairOutcome::Cancelled));
                }
                if cancel_pending && snapshot.device_status != DeviceStatus::Initializing {
                    cancel_pending = try_cancel(controller).await?;
                }
            }
            _ = &mut shutdown, if !shutdown_seen => {
                shutdown_seen = true;
                cancel_pending = try_cancel(controller).await?;
            }
            _ = tokio::time::sleep_until(retry_request_at.unwrap_or_else(Instant::now)),
                if retry_request_at.is_some() => {
                retry_request_at = None;
                tracing::info!("Retrying code request");
                controller.request_code().await?;
            }
        }
    }
}

fn terminal_outcome(event: &PairingLifecycleEvent) -> Option<PairOutcome> {
    match event {
        PairingLifecycleEvent::Connected { .. } => Some(PairOutcome::Connected),
        PairingLifecycleEvent::Disconnected { .. } => Some(PairOutcome::Disconnected),
        PairingLifecycleEvent::Cancelled { .. } => Some(PairOutcome::Cancelled),
        _ => None,
    }
}

/// Returns `true` when the close was refused and must be retried.
async fn try_cancel(controller: &SessionController) -> anyhow::Result<bool> {
    match controller.close(CloseReason::UserCancelled).await {
        Ok(()) => Ok(false),
        Err(PairingError::CloseWhileInitializing) => {
            println!("The device is initializing; cancelling once it is done");
            Ok(true)
        }
        Err(err) => Err(err.into()),
    }
}

fn flush_stdout() {
    use std::io::Write;
    if let Err(err) = std::io::stdout().flush() {
        tracing::debug!(error = %err, "Failed to flush stdout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_arguments() {
        let renewal = session_options(&PairArgs {
            renew: Some("dev-1".to_string()),
            skip_policy: false,
            yes: false,
        });
        assert!(renewal.is_renewal);
        assert_eq!(renewal.target_device_id.as_ref().map(|id| id.as_str()), Some("dev-1"));

        let fresh = session_options(&PairArgs {
            skip_policy: true,
            ..PairArgs::default()
        });
        assert!(!fresh.is_renewal);
        assert!(fresh.skip_policy);
    }

    #[test]
    fn terminal_events_map_to_outcomes() {
        let session_id = dl_core::ids::SessionId::from("s-1");
        let disconnected = PairingLifecycleEvent::Disconnected {
            session_id: session_id.clone(),
            message: None,
        };
        let error = PairingLifecycleEvent::TransientError {
            session_id,
            message: "boom".to_string(),
        };

        assert_eq!(terminal_outcome(&disconnected), Some(PairOutcome::Disconnected));
        assert_eq!(terminal_outcome(&error), None);
    }
}
