//! Client-side reconciliation for the courier relay.
//!
//! `ChatState` is the pure reconciliation core: conversation view, per-peer
//! unseen counters, and the online set, all derived caches over server state.
//! `ChatClient` drives it over REST + the WebSocket push channel.

pub mod client;
pub mod state;

pub use client::{ChatClient, ClientConfig, SessionState};
pub use state::{ChatState, PushOutcome};
