use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_types::api::{PartnerEntry, SendMessageRequest};
use courier_types::events::GatewayEvent;
use courier_types::models::Message;

use crate::state::{ChatState, PushOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base, e.g. `http://127.0.0.1:3000`.
    pub server_url: String,
    /// Push channel endpoint, e.g. `ws://127.0.0.1:3000/gateway`.
    pub gateway_url: String,
    /// Bearer token minted by the external auth service.
    pub token: String,
}

/// Async driver for `ChatState`: REST calls over reqwest, one long-lived
/// push subscription over the WebSocket gateway. Exactly one subscription is
/// live at a time; reconnecting tears the previous one down first.
pub struct ChatClient {
    http: reqwest::Client,
    config: ClientConfig,
    state: Arc<Mutex<ChatState>>,
    session: Arc<Mutex<SessionState>>,
    listener: Option<JoinHandle<()>>,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            state: Arc::new(Mutex::new(ChatState::new())),
            session: Arc::new(Mutex::new(SessionState::Disconnected)),
            listener: None,
        }
    }

    pub fn session(&self) -> SessionState {
        *self.session.lock().expect("session lock poisoned")
    }

    /// Read-only access to the reconciliation state.
    pub fn with_state<T>(&self, f: impl FnOnce(&ChatState) -> T) -> T {
        f(&self.state.lock().expect("state lock poisoned"))
    }

    /// Connect (or reconnect): tear down any previous subscription, seed the
    /// partner/unseen snapshot, then open the one inbound-push subscription.
    pub async fn connect(&mut self) -> Result<()> {
        self.set_session(SessionState::Connecting);

        // A prior subscription must be gone before a new one opens,
        // otherwise pushes would be handled twice.
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }

        let result = self.establish().await;
        match result {
            Ok(listener) => {
                self.listener = Some(listener);
                self.set_session(SessionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_session(SessionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<JoinHandle<()>> {
        // Partner snapshot seeds the per-peer counters
        let partners: Vec<PartnerEntry> = self
            .http
            .get(format!("{}/partners", self.config.server_url))
            .bearer_auth(&self.config.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("fetching partner snapshot")?;

        self.state
            .lock()
            .expect("state lock poisoned")
            .apply_partners(&partners);

        let url = format!("{}?token={}", self.config.gateway_url, self.config.token);
        let (ws, _) = connect_async(&url).await.context("opening gateway")?;
        info!("Gateway subscription open");

        let (_write, mut read) = ws.split();
        let state = self.state.clone();
        let session = self.session.clone();
        let http = self.http.clone();
        let server_url = self.config.server_url.clone();
        let token = self.config.token.clone();

        let listener = tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                let WsMessage::Text(text) = msg else { continue };

                let event = match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Bad gateway event: {} -- raw: {}", e, truncate_for_log(text.as_str(), 200));
                        continue;
                    }
                };

                match event {
                    GatewayEvent::PresenceSnapshot { online } => {
                        state.lock().expect("state lock poisoned").apply_presence(online);
                    }
                    GatewayEvent::NewMessage { message } => {
                        let outcome = state
                            .lock()
                            .expect("state lock poisoned")
                            .handle_push(message);

                        if let PushOutcome::AckSeen(message_id) = outcome {
                            // Close the loop so the sender's later reads
                            // observe seen = true
                            let ack = http
                                .put(format!("{}/messages/{}/seen", server_url, message_id))
                                .bearer_auth(&token)
                                .send()
                                .await;
                            if let Err(e) = ack {
                                debug!("Seen ack for {} failed: {}", message_id, e);
                            }
                        }
                    }
                }
            }

            // Transport gone: drop the online set, keep everything else
            state.lock().expect("state lock poisoned").on_disconnect();
            *session.lock().expect("session lock poisoned") = SessionState::Disconnected;
            info!("Gateway subscription closed");
        });

        Ok(listener)
    }

    /// Switch the active conversation: zero the counter optimistically, then
    /// replace the local view with a fresh fetch (which marks the peer's
    /// messages seen server-side).
    pub async fn select_conversation(&mut self, peer_id: Uuid) -> Result<()> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .select_peer(peer_id);

        let messages: Vec<Message> = self
            .http
            .get(format!("{}/conversations/{}", self.config.server_url, peer_id))
            .bearer_auth(&self.config.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("fetching conversation")?;

        self.state
            .lock()
            .expect("state lock poisoned")
            .apply_conversation(messages);

        Ok(())
    }

    /// Submit a message. The server response is the durable record; it joins
    /// the local view when the receiver is the selected peer.
    pub async fn send_message(
        &self,
        receiver_id: Uuid,
        text: Option<String>,
        image_ref: Option<String>,
    ) -> Result<Message> {
        let message: Message = self
            .http
            .post(format!("{}/messages/{}", self.config.server_url, receiver_id))
            .bearer_auth(&self.config.token)
            .json(&SendMessageRequest { text, image_ref })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("submitting message")?;

        self.state
            .lock()
            .expect("state lock poisoned")
            .append_sent(message.clone());

        Ok(message)
    }

    /// Drop the push subscription and the online set. History and counters
    /// stay put and resume from server state on reconnect.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
        self.state
            .lock()
            .expect("state lock poisoned")
            .on_disconnect();
        self.set_session(SessionState::Disconnected);
    }

    fn set_session(&self, next: SessionState) {
        *self.session.lock().expect("session lock poisoned") = next;
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

/// Cap a log snippet at `max` bytes without splitting a UTF-8 character.
/// Slicing at a raw byte index panics on non-boundary indices, which would
/// kill the listener task.
fn truncate_for_log(raw: &str, max: usize) -> &str {
    let mut end = raw.len().min(max);
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}
