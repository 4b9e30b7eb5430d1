//! Conversation state.
//!
//! A [`Conversation`] is an append-only list of messages plus the typing
//! indicator and unread counter for one peer. Mutation is crate-private:
//! only the pipeline changes a conversation, everyone else works from a
//! [`ConversationSnapshot`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{
    DeliveryStatus, Message, MessageBody, MessageId, MessageKind, Origin, SenderIdentity,
};

/// Conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The other side of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Sender id used for the peer's messages.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Presence flag shown in the chat list.
    #[serde(default)]
    pub is_online: bool,
    /// Whether this is a group chat.
    #[serde(default)]
    pub is_group: bool,
    /// Verification badge tier, if verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_tier: Option<String>,
}

impl Contact {
    /// Create a contact that is offline, not a group, and unverified.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_online: false,
            is_group: false,
            verification_tier: None,
        }
    }

    /// Identity the peer's messages are sent under.
    pub fn identity(&self) -> SenderIdentity {
        SenderIdentity::new(self.id.clone(), self.name.clone())
    }
}

/// Whether the peer is shown as typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TypingIndicator {
    /// Nothing shown.
    #[default]
    Hidden,
    /// "typing..." shown.
    Visible,
}

impl TypingIndicator {
    /// Check if the indicator is shown.
    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }
}

/// A message about to be appended.
///
/// Remote drafts always carry `Read`; there is no way to build a remote
/// draft in any other status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    sender: SenderIdentity,
    body: MessageBody,
    kind: MessageKind,
    origin: Origin,
    status: DeliveryStatus,
    attachment_failure: Option<String>,
}

impl MessageDraft {
    /// A locally composed message, starting in `Sending`.
    pub fn local(kind: MessageKind, body: MessageBody) -> Self {
        Self {
            sender: SenderIdentity::local(),
            body,
            kind,
            origin: Origin::Local,
            status: DeliveryStatus::Sending,
            attachment_failure: None,
        }
    }

    /// A locally composed message already acknowledged up to `status`,
    /// for seeding history.
    pub fn local_with_status(kind: MessageKind, body: MessageBody, status: DeliveryStatus) -> Self {
        Self {
            status,
            ..Self::local(kind, body)
        }
    }

    /// A message received from `sender`, already `Read`.
    pub fn remote(sender: SenderIdentity, kind: MessageKind, body: MessageBody) -> Self {
        Self {
            sender,
            body,
            kind,
            origin: Origin::Remote,
            status: DeliveryStatus::Read,
            attachment_failure: None,
        }
    }

    /// Record that the attachment could not be resolved.
    #[must_use]
    pub fn with_attachment_failure(mut self, reason: impl Into<String>) -> Self {
        self.attachment_failure = Some(reason.into());
        self
    }
}

/// Why a status transition was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The message is already at or past the requested status.
    #[error("Stale transition for message {message}: already {current}, requested {requested}")]
    Stale {
        message: MessageId,
        current: DeliveryStatus,
        requested: DeliveryStatus,
    },

    /// No message with that id in the conversation.
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),
}

/// One conversation with a peer.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: ConversationId,
    peer: Contact,
    messages: Vec<Message>,
    typing: TypingIndicator,
    unread_count: u32,
    next_message_id: u64,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new(id: ConversationId, peer: Contact) -> Self {
        Self {
            id,
            peer,
            messages: Vec::new(),
            typing: TypingIndicator::Hidden,
            unread_count: 0,
            next_message_id: 1,
        }
    }

    /// Start a new, empty conversation with `peer` under a fresh id.
    pub fn start(peer: Contact) -> Self {
        Self::new(ConversationId::generate(), peer)
    }

    /// Start with `count` unread messages, as reported by the chat list.
    #[must_use]
    pub fn with_unread(mut self, count: u32) -> Self {
        self.unread_count = count;
        self
    }

    /// Seed a received text message into the history.
    #[must_use]
    pub fn with_received(mut self, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        let draft = MessageDraft::remote(
            self.peer.identity(),
            MessageKind::Text,
            MessageBody::text(text),
        );
        self.push(draft, at);
        self
    }

    /// Seed a text message sent by this device into the history.
    #[must_use]
    pub fn with_sent(
        mut self,
        text: impl Into<String>,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Self {
        let draft =
            MessageDraft::local_with_status(MessageKind::Text, MessageBody::text(text), status);
        self.push(draft, at);
        self
    }

    /// Conversation id.
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// The peer.
    pub fn peer(&self) -> &Contact {
        &self.peer
    }

    /// Messages in chronological order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Look up a message.
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.index_of(id).map(|i| &self.messages[i])
    }

    /// The most recent message.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Typing indicator state.
    pub fn typing(&self) -> TypingIndicator {
        self.typing
    }

    /// Unread messages reported for the chat list.
    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    /// Read-only copy for the presentation layer.
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            id: self.id.clone(),
            peer_name: self.peer.name.clone(),
            messages: self.messages.clone(),
            typing: self.typing,
            unread_count: self.unread_count,
        }
    }

    /// Chat-list row for this conversation.
    pub fn summary(&self) -> ConversationSummary {
        let last = self.last_message();
        ConversationSummary {
            id: self.id.clone(),
            name: self.peer.name.clone(),
            is_online: self.peer.is_online,
            is_group: self.peer.is_group,
            verification_tier: self.peer.verification_tier.clone(),
            last_message: last.map(|m| m.body.preview(m.kind)),
            last_activity: last.map(|m| m.created_at),
            unread_count: self.unread_count,
            typing: self.typing,
        }
    }

    /// Append a message, assigning the next id.
    pub(crate) fn push(&mut self, draft: MessageDraft, created_at: DateTime<Utc>) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;
        self.messages.push(Message {
            id,
            sender: draft.sender,
            body: draft.body,
            kind: draft.kind,
            origin: draft.origin,
            status: draft.status,
            created_at,
            attachment_failure: draft.attachment_failure,
        });
        id
    }

    /// Move a message to `status` if that is strictly higher in rank than
    /// its current status. Returns the previous status.
    pub(crate) fn advance_status(
        &mut self,
        id: MessageId,
        status: DeliveryStatus,
    ) -> Result<DeliveryStatus, TransitionError> {
        let index = self
            .index_of(id)
            .ok_or(TransitionError::UnknownMessage(id))?;
        let message = &mut self.messages[index];
        let current = message.status;
        if status.rank() <= current.rank() {
            return Err(TransitionError::Stale {
                message: id,
                current,
                requested: status,
            });
        }
        message.status = status;
        Ok(current)
    }

    /// Mark every remote message `Read` and clear the unread counter.
    /// Returns how many messages changed status.
    pub(crate) fn mark_read(&mut self) -> usize {
        let mut changed = 0;
        for message in &mut self.messages {
            if message.origin == Origin::Remote && message.status < DeliveryStatus::Read {
                message.status = DeliveryStatus::Read;
                changed += 1;
            }
        }
        self.unread_count = 0;
        changed
    }

    /// Set the typing indicator. Returns `true` if it changed.
    pub(crate) fn set_typing(&mut self, typing: TypingIndicator) -> bool {
        let changed = self.typing != typing;
        self.typing = typing;
        changed
    }

    fn index_of(&self, id: MessageId) -> Option<usize> {
        // Ids are assigned in append order, so the list is sorted by id.
        self.messages.binary_search_by_key(&id, |m| m.id).ok()
    }
}

/// Read-only copy of a conversation handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Conversation id.
    pub id: ConversationId,
    /// Peer display name.
    pub peer_name: String,
    /// Messages in chronological order.
    pub messages: Vec<Message>,
    /// Typing indicator state.
    pub typing: TypingIndicator,
    /// Unread counter.
    pub unread_count: u32,
}

impl ConversationSnapshot {
    /// Look up a message.
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The most recent message.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Chat-list row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: ConversationId,
    /// Peer display name.
    pub name: String,
    /// Presence flag.
    pub is_online: bool,
    /// Group chat flag.
    pub is_group: bool,
    /// Verification badge tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_tier: Option<String>,
    /// Preview of the latest message.
    pub last_message: Option<String>,
    /// Time of the latest message.
    pub last_activity: Option<DateTime<Utc>>,
    /// Unread counter.
    pub unread_count: u32,
    /// Whether the peer is shown as typing.
    pub typing: TypingIndicator,
}

/// Largest unread count shown verbatim on a badge.
pub const MAX_BADGE_COUNT: u32 = 99;

impl ConversationSummary {
    /// Unread badge text, or `None` when there is nothing unread.
    pub fn badge(&self) -> Option<String> {
        match self.unread_count {
            0 => None,
            n if n > MAX_BADGE_COUNT => Some(format!("{MAX_BADGE_COUNT}+")),
            n => Some(n.to_string()),
        }
    }

    /// Case-insensitive match of `query` against the peer name.
    pub fn matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(&query.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation::new(ConversationId::new("1"), Contact::new("espn", "ESPN"))
    }

    fn local_text(text: &str) -> MessageDraft {
        MessageDraft::local(MessageKind::Text, MessageBody::text(text))
    }

    #[test]
    fn test_started_conversations_get_fresh_ids() {
        let first = Conversation::start(Contact::new("a", "Alice"));
        let second = Conversation::start(Contact::new("a", "Alice"));

        assert_ne!(first.id(), second.id());
        assert!(Uuid::parse_str(first.id().as_str()).is_ok());
        assert!(first.messages().is_empty());
        assert_eq!(first.unread_count(), 0);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut conv = conversation();
        let now = Utc::now();
        let a = conv.push(local_text("a"), now);
        let b = conv.push(local_text("b"), now);
        let c = conv.push(local_text("c"), now);
        assert!(a < b && b < c);
        assert_eq!(conv.messages().len(), 3);
        assert_eq!(conv.message(b).unwrap().body, MessageBody::text("b"));
    }

    #[test]
    fn test_remote_drafts_are_read() {
        let conv = conversation().with_received("Breaking news", Utc::now());
        let message = conv.last_message().unwrap();
        assert_eq!(message.origin, Origin::Remote);
        assert_eq!(message.status, DeliveryStatus::Read);
        assert_eq!(message.sender.display_name, "ESPN");
    }

    #[test]
    fn test_advance_status_is_rank_guarded() {
        let mut conv = conversation();
        let id = conv.push(local_text("hi"), Utc::now());

        assert_eq!(
            conv.advance_status(id, DeliveryStatus::Delivered),
            Ok(DeliveryStatus::Sending)
        );
        assert_eq!(
            conv.advance_status(id, DeliveryStatus::Sent),
            Err(TransitionError::Stale {
                message: id,
                current: DeliveryStatus::Delivered,
                requested: DeliveryStatus::Sent,
            })
        );
        assert!(conv.advance_status(id, DeliveryStatus::Delivered).is_err());
        assert_eq!(conv.message(id).unwrap().status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_advance_unknown_message() {
        let mut conv = conversation();
        assert_eq!(
            conv.advance_status(MessageId(42), DeliveryStatus::Sent),
            Err(TransitionError::UnknownMessage(MessageId(42)))
        );
    }

    #[test]
    fn test_mark_read_clears_unread_and_is_idempotent() {
        let mut conv = conversation()
            .with_unread(3)
            .with_received("one", Utc::now());
        let own = conv.push(local_text("mine"), Utc::now());

        conv.mark_read();
        assert_eq!(conv.unread_count(), 0);
        assert_eq!(conv.mark_read(), 0);
        // Local messages keep their own delivery status.
        assert_eq!(conv.message(own).unwrap().status, DeliveryStatus::Sending);
    }

    #[test]
    fn test_set_typing_reports_change() {
        let mut conv = conversation();
        assert!(conv.set_typing(TypingIndicator::Visible));
        assert!(!conv.set_typing(TypingIndicator::Visible));
        assert!(conv.set_typing(TypingIndicator::Hidden));
    }

    #[test]
    fn test_summary_and_badge() {
        let mut summary = conversation()
            .with_received("Trade deadline tonight", Utc::now())
            .with_unread(12)
            .summary();
        assert_eq!(summary.last_message.as_deref(), Some("Trade deadline tonight"));
        assert_eq!(summary.badge().as_deref(), Some("12"));

        summary.unread_count = 150;
        assert_eq!(summary.badge().as_deref(), Some("99+"));

        summary.unread_count = 0;
        assert_eq!(summary.badge(), None);
    }

    #[test]
    fn test_summary_matches_case_insensitive() {
        let summary = conversation().summary();
        assert!(summary.matches("esp"));
        assert!(summary.matches("ESPN"));
        assert!(!summary.matches("nba"));
        assert!(summary.matches(""));
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let mut conv = conversation();
        let snapshot = conv.snapshot();
        conv.push(local_text("later"), Utc::now());
        assert!(snapshot.messages.is_empty());
        assert_eq!(conv.snapshot().messages.len(), 1);
    }
}
