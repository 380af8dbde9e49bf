use serde::{Deserialize, Serialize};

use super::budget::RetryBudget;
use crate::ids::{DeviceId, PairingCode, SessionId};

/// Coarse phase of a pairing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for the user to acknowledge the linking policy.
    AwaitingPolicy,
    /// Waiting for the remote service to issue a code.
    AwaitingCode,
    /// A code is displayed and the status endpoint is being polled.
    Polling,
    /// The remote reported a terminal status; the session is about to close.
    Terminal,
}

/// Fine-grained status reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// No status reported yet for this session.
    Idle,
    /// The remote is still preparing the code. Attempts are not charged.
    Initializing,
    /// The code is ready and waiting to be scanned.
    AwaitingScan,
    /// The remote client is linked.
    Connected,
    /// The remote client dropped the link.
    Disconnected,
}

impl DeviceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeviceStatus::Connected | DeviceStatus::Disconnected)
    }
}

/// Inputs the presentation layer supplies when opening a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Re-establish a previously paired device instead of pairing a new one.
    pub is_renewal: bool,
    /// Device being renewed. Ignored unless `is_renewal` is set.
    pub target_device_id: Option<DeviceId>,
    /// Skip the policy acknowledgement stage.
    pub skip_policy: bool,
}

impl SessionOptions {
    pub fn new_device() -> Self {
        Self::default()
    }

    pub fn renewal(target_device_id: impl Into<DeviceId>) -> Self {
        Self {
            is_renewal: true,
            target_device_id: Some(target_device_id.into()),
            skip_policy: false,
        }
    }

    pub fn with_skip_policy(mut self) -> Self {
        self.skip_policy = true;
        self
    }

    /// Whether the session starts directly at [`Stage::AwaitingCode`].
    pub fn skips_policy_stage(&self) -> bool {
        self.is_renewal || self.skip_policy
    }

    /// The device id passed to `begin_pairing`; only renewals send one.
    pub fn begin_target(&self) -> Option<DeviceId> {
        if self.is_renewal {
            self.target_device_id.clone()
        } else {
            None
        }
    }

    /// The stage a session with these options rests in before and after it runs.
    pub fn resting_stage(&self) -> Stage {
        if self.skips_policy_stage() {
            Stage::AwaitingCode
        } else {
            Stage::AwaitingPolicy
        }
    }
}

/// The central entity: one per open dialog.
///
/// Fields are only mutated by [`SessionStateMachine`](super::SessionStateMachine).
#[derive(Debug, Clone, PartialEq)]
pub struct PairingSession {
    pub(crate) session_id: Option<SessionId>,
    pub(crate) stage: Stage,
    pub(crate) device_status: DeviceStatus,
    pub(crate) code: Option<PairingCode>,
    pub(crate) budget: RetryBudget,
    pub(crate) elapsed_ratio: f64,
    pub(crate) options: SessionOptions,
    pub(crate) is_open: bool,
}

impl PairingSession {
    pub(crate) fn closed(max_attempts: u32) -> Self {
        let options = SessionOptions::default();
        Self {
            session_id: None,
            stage: options.resting_stage(),
            device_status: DeviceStatus::Idle,
            code: None,
            budget: RetryBudget::new(max_attempts),
            elapsed_ratio: 0.0,
            options,
            is_open: false,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.device_status
    }

    pub fn code(&self) -> Option<&PairingCode> {
        self.code.as_ref()
    }

    pub fn attempt(&self) -> u32 {
        self.budget.attempt()
    }

    pub fn max_attempts(&self) -> u32 {
        self.budget.max_attempts()
    }

    pub fn elapsed_ratio(&self) -> f64 {
        self.elapsed_ratio
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Closing is refused while the remote is initializing: the in-flight
    /// remote operation cannot be cancelled.
    pub fn can_close(&self) -> bool {
        self.device_status != DeviceStatus::Initializing
    }

    /// `Polling` with a held code and a non-terminal status: a poll loop must
    /// be running.
    pub fn expects_polling(&self) -> bool {
        self.is_open
            && self.stage == Stage::Polling
            && self.code.is_some()
            && !self.device_status.is_terminal()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            stage: self.stage,
            device_status: self.device_status,
            code: self.code.clone(),
            elapsed_ratio: self.elapsed_ratio,
            attempt: self.budget.attempt(),
            max_attempts: self.budget.max_attempts(),
            is_open: self.is_open,
        }
    }
}

/// What the presentation layer renders, published on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub stage: Stage,
    pub device_status: DeviceStatus,
    pub code: Option<PairingCode>,
    pub elapsed_ratio: f64,
    pub attempt: u32,
    pub max_attempts: u32,
    pub is_open: bool,
}
