use serde::{Deserialize, Serialize};

use super::id_macro::impl_id;

/// Opaque pairing payload rendered as a scannable code.
///
/// Issued by the remote service and replaced wholesale on refresh; the
/// client never inspects or mutates its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingCode(String);

impl_id!(PairingCode);
