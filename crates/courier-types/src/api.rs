use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared across courier-api (REST middleware) and courier-gateway
/// (WebSocket authentication). Tokens are minted by the external auth
/// service; this system only validates and reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    /// Reference string for an already-uploaded image, resolved by the
    /// object-storage service. Never raw bytes.
    #[serde(default)]
    pub image_ref: Option<String>,
}

// -- Partners --

/// One conversation partner in the sidebar listing: who they are, how many
/// of their messages the caller has not seen, and whether they are online
/// right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerEntry {
    pub user_id: Uuid,
    pub unseen: u64,
    pub online: bool,
}
