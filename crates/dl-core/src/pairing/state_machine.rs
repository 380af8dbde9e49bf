//! Pairing session state machine.
//!
//! Every transition goes through [`SessionStateMachine::handle_event`]: a
//! named event is reduced against the current [`PairingSession`] and the
//! caller receives the actions to execute. The machine never touches timers
//! or the network itself.
//!
//! ```text
//! AwaitingPolicy --PolicyAcked--> AwaitingCode --CodeIssued--> Polling --terminal TickResult--> Terminal
//!        ^                             ^                          |                                |
//!        +-----------------------------+---------- Closed --------+--------------------------------+
//! ```
//!
//! The controller (dl-app) feeds user input, remote responses and timer
//! ticks in as [`SessionEvent`]s and performs the returned [`SessionAction`]s.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::event::PairingLifecycleEvent;
use super::session::{DeviceStatus, PairingSession, SessionOptions, Stage};
use crate::ids::{DeviceId, PairingCode, SessionId};

/// Why a session is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    UserCancelled,
    Connected,
    Disconnected,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened {
        session_id: SessionId,
        options: SessionOptions,
    },
    PolicyAcked,
    /// Explicit request for a (new) code.
    CodeRequested,
    CodeIssued {
        code: PairingCode,
    },
    CodeRequestFailed {
        message: String,
    },
    TickResult {
        status: DeviceStatus,
        code: Option<PairingCode>,
        message: Option<String>,
    },
    TickFailed {
        error: String,
    },
    /// Raised internally when a charged tick exhausts the budget.
    BudgetExhausted,
    ProgressTick {
        step: f64,
    },
    Closed {
        reason: CloseReason,
    },
}

/// Side effects the controller must perform.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Call `begin_pairing`, passing the target only for renewals.
    RequestCode { target_device_id: Option<DeviceId> },
    /// (Re)start the poll loop after the settle delay. Stops any running loop first.
    StartPolling,
    /// Start the poll loop only if it is not already running.
    ResumePolling,
    StopPolling,
    StartMonitor,
    StopMonitor,
    /// Close the session with `reason` after the terminal close delay.
    ScheduleClose { reason: CloseReason },
    CancelPendingRequest,
    CancelScheduledClose,
    Emit(PairingLifecycleEvent),
    LogTransition {
        session_id: Option<SessionId>,
        old_stage: Stage,
        event: String,
        new_stage: Stage,
    },
}

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    session: PairingSession,
    max_attempts: u32,
}

impl SessionStateMachine {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            session: PairingSession::closed(max_attempts),
            max_attempts,
        }
    }

    pub fn session(&self) -> &PairingSession {
        &self.session
    }

    /// Reduce `event` against the current session and return the actions to run.
    pub fn handle_event(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        let old_stage = self.session.stage;
        let is_progress = matches!(event, SessionEvent::ProgressTick { .. });
        let event_debug = if is_progress {
            String::new()
        } else {
            format!("{:?}", event)
        };

        let actions = self.transition(event);

        if is_progress {
            return actions;
        }

        let mut all_actions = vec![SessionAction::LogTransition {
            session_id: self.session.session_id.clone(),
            old_stage,
            event: event_debug,
            new_stage: self.session.stage,
        }];
        all_actions.extend(actions);
        all_actions
    }

    fn transition(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        match event {
            SessionEvent::Opened {
                session_id,
                options,
            } => self.on_opened(session_id, options),
            SessionEvent::PolicyAcked => {
                if !self.session.is_open || self.session.stage != Stage::AwaitingPolicy {
                    return Vec::new();
                }
                self.session.stage = Stage::AwaitingCode;
                vec![self.request_code()]
            }
            SessionEvent::CodeRequested => {
                if !self.session.is_open
                    || !matches!(self.session.stage, Stage::AwaitingCode | Stage::Polling)
                {
                    return Vec::new();
                }
                vec![self.request_code()]
            }
            SessionEvent::CodeIssued { code } => self.on_code_issued(code),
            SessionEvent::CodeRequestFailed { message } => self.on_code_request_failed(message),
            SessionEvent::TickResult {
                status,
                code,
                message,
            } => self.on_tick_result(status, code, message),
            // Transport failures are skipped; the loop keeps its cadence.
            SessionEvent::TickFailed { .. } => Vec::new(),
            SessionEvent::BudgetExhausted => {
                if !self.session.is_open || self.session.stage != Stage::Polling {
                    return Vec::new();
                }
                self.session.budget.reset();
                self.session.elapsed_ratio = 0.0;
                vec![self.request_code()]
            }
            SessionEvent::ProgressTick { step } => {
                if self.session.is_open
                    && self.session.stage == Stage::Polling
                    && self.session.device_status != DeviceStatus::Initializing
                {
                    self.session.elapsed_ratio = (self.session.elapsed_ratio + step).clamp(0.0, 1.0);
                }
                Vec::new()
            }
            SessionEvent::Closed { reason } => self.on_closed(reason),
        }
    }

    fn on_opened(&mut self, session_id: SessionId, options: SessionOptions) -> Vec<SessionAction> {
        if self.session.is_open {
            warn!(?session_id, "open ignored: a session is already open");
            return Vec::new();
        }

        let mut session = PairingSession::closed(self.max_attempts);
        session.stage = options.resting_stage();
        session.session_id = Some(session_id);
        session.options = options;
        session.is_open = true;
        self.session = session;

        let mut actions = vec![SessionAction::StartMonitor];
        if self.session.stage == Stage::AwaitingCode {
            actions.push(self.request_code());
        }
        actions
    }

    fn on_code_issued(&mut self, code: PairingCode) -> Vec<SessionAction> {
        if !self.session.is_open
            || !matches!(self.session.stage, Stage::AwaitingCode | Stage::Polling)
        {
            debug!(stage = ?self.session.stage, "discarding code issued outside of code stages");
            return Vec::new();
        }

        self.session.device_status = DeviceStatus::Initializing;
        self.session.stage = Stage::Polling;
        let mut actions = self.replace_code(code);
        actions.push(SessionAction::StartPolling);
        actions
    }

    fn on_code_request_failed(&mut self, message: String) -> Vec<SessionAction> {
        let Some(session_id) = self.open_session_id() else {
            return Vec::new();
        };

        let mut actions = vec![SessionAction::Emit(PairingLifecycleEvent::TransientError {
            session_id,
            message,
        })];

        if self.session.stage == Stage::Polling && self.session.code.is_some() {
            self.session.budget.rearm_after_failed_replacement();
            actions.push(SessionAction::ResumePolling);
        }
        actions
    }

    fn on_tick_result(
        &mut self,
        status: DeviceStatus,
        code: Option<PairingCode>,
        message: Option<String>,
    ) -> Vec<SessionAction> {
        if !self.session.is_open || self.session.stage != Stage::Polling {
            return Vec::new();
        }
        let Some(session_id) = self.session.session_id.clone() else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        let mut replaced = false;
        if let Some(code) = code {
            if self.session.code.as_ref() != Some(&code) {
                actions.extend(self.replace_code(code));
                replaced = true;
            }
        }

        self.session.device_status = status;

        match status {
            DeviceStatus::Connected | DeviceStatus::Disconnected => {
                self.session.stage = Stage::Terminal;
                let (event, reason) = if status == DeviceStatus::Connected {
                    (
                        PairingLifecycleEvent::Connected {
                            session_id,
                            message,
                        },
                        CloseReason::Connected,
                    )
                } else {
                    (
                        PairingLifecycleEvent::Disconnected {
                            session_id,
                            message,
                        },
                        CloseReason::Disconnected,
                    )
                };
                actions.push(SessionAction::StopPolling);
                actions.push(SessionAction::Emit(event));
                actions.push(SessionAction::ScheduleClose { reason });
            }
            _ if replaced => {}
            _ => {
                self.session.budget.record_attempt(status);
                if self.session.budget.is_exhausted() {
                    actions.extend(self.handle_event(SessionEvent::BudgetExhausted));
                }
            }
        }
        actions
    }

    fn on_closed(&mut self, reason: CloseReason) -> Vec<SessionAction> {
        if !self.session.is_open {
            return Vec::new();
        }

        let mut actions = vec![
            SessionAction::StopPolling,
            SessionAction::StopMonitor,
            SessionAction::CancelPendingRequest,
            SessionAction::CancelScheduledClose,
        ];
        if reason == CloseReason::UserCancelled && self.session.stage != Stage::Terminal {
            if let Some(session_id) = self.session.session_id.clone() {
                actions.push(SessionAction::Emit(PairingLifecycleEvent::Cancelled {
                    session_id,
                }));
            }
        }

        let options = std::mem::take(&mut self.session.options);
        let mut session = PairingSession::closed(self.max_attempts);
        session.stage = options.resting_stage();
        session.options = options;
        self.session = session;
        actions
    }

    /// Overwrite the code wholesale and reset the budget for it.
    fn replace_code(&mut self, code: PairingCode) -> Vec<SessionAction> {
        self.session.code = Some(code.clone());
        self.session.budget.reset();
        self.session.elapsed_ratio = 0.0;
        match self.session.session_id.clone() {
            Some(session_id) => vec![SessionAction::Emit(PairingLifecycleEvent::CodeIssued {
                session_id,
                code,
            })],
            None => Vec::new(),
        }
    }

    fn request_code(&self) -> SessionAction {
        SessionAction::RequestCode {
            target_device_id: self.session.options.begin_target(),
        }
    }

    fn open_session_id(&self) -> Option<SessionId> {
        if self.session.is_open {
            self.session.session_id.clone()
        } else {
            None
        }
    }
}
