//! Plain-text rendering of snapshots and lifecycle events.

use dl_core::ids::PairingCode;
use dl_core::pairing::{DeviceStatus, PairingLifecycleEvent, SessionSnapshot, Stage};

const BAR_WIDTH: usize = 20;

pub const POLICY_PROMPT: &str = "Linking gives the remote client access to your messages \
on this device. Continue? [y/N] ";

/// Fields that warrant a new status line. Progress alone does not.
#[derive(Debug, Clone, PartialEq)]
struct Visible {
    stage: Stage,
    status: DeviceStatus,
    code: Option<PairingCode>,
    attempt: u32,
    is_open: bool,
}

impl From<&SessionSnapshot> for Visible {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            stage: snapshot.stage,
            status: snapshot.device_status,
            code: snapshot.code.clone(),
            attempt: snapshot.attempt,
            is_open: snapshot.is_open,
        }
    }
}

#[derive(Debug, Default)]
pub struct Presenter {
    last: Option<Visible>,
}

impl Presenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a status line if anything visible changed since the last call.
    pub fn render_snapshot(&mut self, snapshot: &SessionSnapshot) -> Option<String> {
        let visible = Visible::from(snapshot);
        if self.last.as_ref() == Some(&visible) {
            return None;
        }
        self.last = Some(visible);

        if !snapshot.is_open {
            return Some("session closed".to_string());
        }
        Some(format!(
            "{:<15} {:<13} {} attempt {}/{}",
            stage_label(snapshot.stage),
            status_label(snapshot.device_status),
            progress_bar(snapshot.elapsed_ratio),
            snapshot.attempt,
            snapshot.max_attempts,
        ))
    }
}

pub fn render_event(event: &PairingLifecycleEvent) -> String {
    match event {
        PairingLifecycleEvent::CodeIssued { code, .. } => {
            format!("Scan this code with the remote client:\n\n    {code}\n")
        }
        PairingLifecycleEvent::Connected { message, .. } => {
            with_message("Device linked", message.as_deref())
        }
        PairingLifecycleEvent::Disconnected { message, .. } => {
            with_message("Device disconnected", message.as_deref())
        }
        PairingLifecycleEvent::Cancelled { .. } => "Pairing cancelled".to_string(),
        PairingLifecycleEvent::TransientError { message, .. } => {
            format!("Pairing service error: {message}")
        }
    }
}

fn with_message(headline: &str, message: Option<&str>) -> String {
    match message {
        Some(message) if !message.is_empty() => format!("{headline}: {message}"),
        _ => headline.to_string(),
    }
}

pub fn progress_bar(ratio: f64) -> String {
    let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
    let filled = (ratio * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        (ratio * 100.0).round() as u32
    )
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::AwaitingPolicy => "awaiting-policy",
        Stage::AwaitingCode => "awaiting-code",
        Stage::Polling => "polling",
        Stage::Terminal => "terminal",
    }
}

fn status_label(status: DeviceStatus) -> &'static str {
    match status {
        DeviceStatus::Idle => "-",
        DeviceStatus::Initializing => "initializing",
        DeviceStatus::AwaitingScan => "awaiting-scan",
        DeviceStatus::Connected => "connected",
        DeviceStatus::Disconnected => "disconnected",
    }
}
