use serde::{Deserialize, Serialize};

use crate::ids::{PairingCode, SessionId};

/// Lifecycle events published to the presentation layer.
///
/// `Connected` and `Disconnected` are emitted at most once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PairingLifecycleEvent {
    /// A fresh code is available for display.
    CodeIssued {
        session_id: SessionId,
        code: PairingCode,
    },
    /// The remote client is linked.
    Connected {
        session_id: SessionId,
        message: Option<String>,
    },
    /// The remote client dropped the link.
    Disconnected {
        session_id: SessionId,
        message: Option<String>,
    },
    /// The user cancelled before a terminal status arrived.
    Cancelled { session_id: SessionId },
    /// A remote call failed. The session keeps going.
    TransientError {
        session_id: SessionId,
        message: String,
    },
}

impl PairingLifecycleEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::CodeIssued { session_id, .. }
            | Self::Connected { session_id, .. }
            | Self::Disconnected { session_id, .. }
            | Self::Cancelled { session_id }
            | Self::TransientError { session_id, .. } => session_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::Disconnected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = PairingLifecycleEvent::Connected {
            session_id: SessionId::from("s-1"),
            message: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["session_id"], "s-1");
    }

    #[test]
    fn only_connected_and_disconnected_are_terminal() {
        let id = SessionId::from("s-1");
        assert!(PairingLifecycleEvent::Disconnected {
            session_id: id.clone(),
            message: None
        }
        .is_terminal());
        assert!(!PairingLifecycleEvent::Cancelled { session_id: id }.is_terminal());
    }
}
