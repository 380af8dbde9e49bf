use serde::{Deserialize, Serialize};

use super::id_macro::impl_id;

/// Identifier of a device that was paired before.
///
/// Only referenced by renewal sessions; the controller never owns the
/// device's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl_id!(DeviceId);
