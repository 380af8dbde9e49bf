use serde::{Deserialize, Serialize};

use super::id_macro::impl_id;

/// Pairing session identifier, one per `open`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl_id!(SessionId);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
