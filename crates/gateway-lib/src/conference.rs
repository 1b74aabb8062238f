// ============================
// crates/gateway-lib/src/conference.rs
// ============================
//! Video conference credential issuing.
//!
//! The gateway only hands each entering member a join token; media
//! itself never touches this process. The trait seam lets the binary
//! wire in a real conferencing provider while tests use the static
//! issuer.

use studyroom_common::UserId;

pub trait CredentialIssuer: Send + Sync {
    /// Issue a join token scoped to one member of one room.
    fn issue(&self, room: &str, user: UserId) -> String;
}

/// Deterministic issuer pointing at a fixed conference endpoint.
pub struct StaticIssuer {
    endpoint: String,
}

impl StaticIssuer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for StaticIssuer {
    fn default() -> Self {
        Self::new("wss://conference.local")
    }
}

impl CredentialIssuer for StaticIssuer {
    fn issue(&self, room: &str, user: UserId) -> String {
        format!("{}/rooms/{}/tokens/{}", self.endpoint, room, user)
    }
}
