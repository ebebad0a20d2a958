use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use courier_types::api::PartnerEntry;
use courier_types::models::Message;

/// What a caller must do after handing an inbound push to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The message belongs to the selected conversation and was appended and
    /// marked seen locally. The caller must acknowledge it upstream so the
    /// sender's later reads observe seen = true.
    AckSeen(Uuid),

    /// The message belongs to another conversation; its sender's unseen
    /// counter was incremented. Nothing to do upstream.
    Counted,
}

/// Local conversation state for one connected client.
///
/// Everything here is a cache recomputed from server state at defined
/// invalidation points — selection change replaces the view via a fetch,
/// reconnect reseeds the counters from the partner snapshot. It is never a
/// source of truth.
#[derive(Debug, Default)]
pub struct ChatState {
    conversation: Vec<Message>,
    selected_peer: Option<Uuid>,
    unseen: HashMap<Uuid, u64>,
    online: HashSet<Uuid>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed per-peer counters and online flags from the partner snapshot
    /// requested on entering the connected state.
    pub fn apply_partners(&mut self, partners: &[PartnerEntry]) {
        self.unseen = partners.iter().map(|p| (p.user_id, p.unseen)).collect();
        self.online = partners
            .iter()
            .filter(|p| p.online)
            .map(|p| p.user_id)
            .collect();
    }

    /// Replace the online set with a presence snapshot. Snapshots are full,
    /// so no merging with the previous set.
    pub fn apply_presence(&mut self, online: Vec<Uuid>) {
        self.online = online.into_iter().collect();
    }

    /// Reconcile one inbound push against the current selection.
    pub fn handle_push(&mut self, message: Message) -> PushOutcome {
        if self.selected_peer == Some(message.sender_id) {
            let id = message.id;
            let mut message = message;
            message.seen = true;
            self.conversation.push(message);
            PushOutcome::AckSeen(id)
        } else {
            *self.unseen.entry(message.sender_id).or_insert(0) += 1;
            PushOutcome::Counted
        }
    }

    /// Append a message this client just sent. The view only tracks the
    /// selected conversation, so pushes for other receivers are dropped.
    pub fn append_sent(&mut self, message: Message) {
        if self.selected_peer == Some(message.receiver_id) {
            self.conversation.push(message);
        }
    }

    /// Change the active conversation. Zeroes the peer's unseen counter
    /// optimistically; the caller follows up with a fetch and
    /// `apply_conversation` to replace the view.
    pub fn select_peer(&mut self, peer: Uuid) {
        self.selected_peer = Some(peer);
        self.unseen.insert(peer, 0);
    }

    /// Replace the conversation view with a fetch result.
    pub fn apply_conversation(&mut self, messages: Vec<Message>) {
        self.conversation = messages;
    }

    /// Transport lost: only the online set is discarded. Conversation
    /// history and counters resume from server state on reconnect.
    pub fn on_disconnect(&mut self) {
        self.online.clear();
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn selected_peer(&self) -> Option<Uuid> {
        self.selected_peer
    }

    pub fn unseen_count(&self, peer: Uuid) -> u64 {
        self.unseen.get(&peer).copied().unwrap_or(0)
    }

    pub fn is_online(&self, peer: Uuid) -> bool {
        self.online.contains(&peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender_id: Uuid, receiver_id: Uuid, text: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            text: Some(text.into()),
            image_ref: None,
            seen: false,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn push_for_selected_peer_appends_and_requests_ack() {
        let mut state = ChatState::new();
        let (me, alice) = (Uuid::new_v4(), Uuid::new_v4());

        state.select_peer(alice);
        let incoming = message(alice, me, "hi");
        let id = incoming.id;

        assert_eq!(state.handle_push(incoming), PushOutcome::AckSeen(id));
        assert_eq!(state.conversation().len(), 1);
        assert!(state.conversation()[0].seen); // marked locally
        assert_eq!(state.unseen_count(alice), 0);
    }

    #[test]
    fn push_for_other_peer_only_counts() {
        let mut state = ChatState::new();
        let (me, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        state.select_peer(alice);
        assert_eq!(state.handle_push(message(bob, me, "one")), PushOutcome::Counted);
        assert_eq!(state.handle_push(message(bob, me, "two")), PushOutcome::Counted);

        assert_eq!(state.unseen_count(bob), 2);
        assert!(state.conversation().is_empty()); // view untouched
    }

    #[test]
    fn selection_change_zeroes_counter_and_replaces_view() {
        let mut state = ChatState::new();
        let (me, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        state.select_peer(alice);
        state.handle_push(message(bob, me, "while away"));
        assert_eq!(state.unseen_count(bob), 1);

        // Switch to bob: counter zeroed optimistically, then the fetch result
        // replaces whatever was in the view
        state.select_peer(bob);
        assert_eq!(state.unseen_count(bob), 0);

        state.apply_conversation(vec![message(bob, me, "while away")]);
        assert_eq!(state.conversation().len(), 1);
    }

    #[test]
    fn partner_snapshot_seeds_counters_and_online_flags() {
        let mut state = ChatState::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        state.apply_partners(&[
            PartnerEntry { user_id: alice, unseen: 3, online: true },
            PartnerEntry { user_id: bob, unseen: 0, online: false },
        ]);

        assert_eq!(state.unseen_count(alice), 3);
        assert_eq!(state.unseen_count(bob), 0);
        assert!(state.is_online(alice));
        assert!(!state.is_online(bob));
    }

    #[test]
    fn presence_snapshot_fully_replaces_online_set() {
        let mut state = ChatState::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        state.apply_presence(vec![alice, bob]);
        assert!(state.is_online(alice) && state.is_online(bob));

        state.apply_presence(vec![alice]);
        assert!(state.is_online(alice));
        assert!(!state.is_online(bob));
    }

    #[test]
    fn disconnect_keeps_history_and_counters() {
        let mut state = ChatState::new();
        let (me, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        state.select_peer(alice);
        state.apply_conversation(vec![message(alice, me, "hello")]);
        state.handle_push(message(bob, me, "unread"));
        state.apply_presence(vec![alice, bob]);

        state.on_disconnect();

        assert!(!state.is_online(alice));
        assert!(!state.is_online(bob));
        assert_eq!(state.conversation().len(), 1); // history retained
        assert_eq!(state.unseen_count(bob), 1); // counters retained
    }

    #[test]
    fn sent_messages_append_only_to_the_selected_view() {
        let mut state = ChatState::new();
        let (me, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        state.select_peer(alice);
        state.append_sent(message(me, alice, "to alice"));
        state.append_sent(message(me, bob, "to bob"));

        assert_eq!(state.conversation().len(), 1);
        assert_eq!(state.conversation()[0].text.as_deref(), Some("to alice"));
    }
}
