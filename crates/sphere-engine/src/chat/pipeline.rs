//! Message lifecycle pipeline.
//!
//! [`MessagePipeline`] owns every open conversation and simulates delivery
//! without a network: local messages are appended optimistically and walk
//! `Sending → Sent → Delivered` on timers, and requested replies show a
//! typing indicator before landing as already-read remote messages.
//!
//! All mutation goes through the pipeline's [`TimerQueue`], so transitions
//! for a conversation are applied one at a time in firing order. Each status
//! transition is additionally rank-guarded: a transition that arrives after
//! a higher status is already set is discarded, never applied.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::attachment::{Attachment, AttachmentError, AttachmentSource};
use super::conversation::{
    Conversation, ConversationId, ConversationSnapshot, ConversationSummary, MessageDraft,
    TypingIndicator,
};
use super::message::{DeliveryStatus, MessageBody, MessageId, MessageKind};
use crate::clock::{Scheduler, TimerQueue};
use crate::config::DeliveryConfig;
use crate::notify::{Notification, Notifier, Toast};

/// A state change waiting on the timer queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move a message to a higher delivery status.
    Status {
        conversation: ConversationId,
        message: MessageId,
        status: DeliveryStatus,
    },
    /// Show the typing indicator for a pending reply.
    ShowTyping { conversation: ConversationId },
    /// Hide the typing indicator and append the reply.
    DeliverReply { conversation: ConversationId },
}

impl Transition {
    /// Conversation the transition belongs to.
    pub fn conversation(&self) -> &ConversationId {
        match self {
            Self::Status { conversation, .. }
            | Self::ShowTyping { conversation }
            | Self::DeliverReply { conversation } => conversation,
        }
    }
}

/// Callbacks into the presentation layer.
pub trait ConversationObserver: Send {
    /// A conversation's messages, typing state or unread count changed.
    fn on_conversation_changed(&mut self, _snapshot: &ConversationSnapshot) {}

    /// The typing indicator of a conversation was shown or hidden.
    fn on_typing_indicator_changed(&mut self, _conversation: &ConversationId, _visible: bool) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unobserved;

impl ConversationObserver for Unobserved {}

/// Pipeline output as a value, for channel-based hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// See [`ConversationObserver::on_conversation_changed`].
    ConversationChanged(ConversationSnapshot),
    /// See [`ConversationObserver::on_typing_indicator_changed`].
    TypingChanged {
        conversation: ConversationId,
        visible: bool,
    },
    /// A toast the pipeline wants shown.
    Notification(Notification),
    /// A toast went on screen. Emitted by the pipeline task in place of
    /// [`PipelineEvent::Notification`].
    ToastShown(Toast),
    /// A toast's lifetime elapsed and it left the screen.
    ToastDismissed(Toast),
}

impl ConversationObserver for mpsc::UnboundedSender<PipelineEvent> {
    fn on_conversation_changed(&mut self, snapshot: &ConversationSnapshot) {
        let _ = self.send(PipelineEvent::ConversationChanged(snapshot.clone()));
    }

    fn on_typing_indicator_changed(&mut self, conversation: &ConversationId, visible: bool) {
        let _ = self.send(PipelineEvent::TypingChanged {
            conversation: conversation.clone(),
            visible,
        });
    }
}

impl Notifier for mpsc::UnboundedSender<PipelineEvent> {
    fn notify(&mut self, notification: Notification) {
        let _ = self.send(PipelineEvent::Notification(notification));
    }
}

/// Errors returned by pipeline operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// No open conversation with that id.
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// A conversation with that id is already open.
    #[error("Conversation already open: {0}")]
    AlreadyOpen(ConversationId),

    /// Blank messages are not sent.
    #[error("Message is empty")]
    EmptyMessage,

    /// The pipeline task is no longer running.
    #[error("Pipeline stopped")]
    Stopped,
}

/// Result of submitting an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Id of the appended message.
    pub message: MessageId,
    /// Why the attachment could not be resolved, if it could not. The
    /// message is appended and progresses either way.
    pub attachment_error: Option<AttachmentError>,
}

/// Counters for what the pipeline has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Status transitions applied.
    pub transitions_applied: u64,
    /// Status transitions discarded by the rank guard.
    pub stale_discarded: u64,
    /// Timers cancelled by closing conversations.
    pub timers_cancelled: u64,
    /// Simulated replies appended.
    pub replies_delivered: u64,
}

/// Owns open conversations and drives their simulated delivery.
pub struct MessagePipeline {
    config: DeliveryConfig,
    epoch: DateTime<Utc>,
    timers: TimerQueue<Transition>,
    conversations: HashMap<ConversationId, Conversation>,
    order: Vec<ConversationId>,
    observer: Box<dyn ConversationObserver>,
    notifier: Option<Box<dyn Notifier>>,
    stats: PipelineStats,
}

impl MessagePipeline {
    /// Create a pipeline whose clock starts now.
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            epoch: Utc::now(),
            timers: TimerQueue::new(),
            conversations: HashMap::new(),
            order: Vec::new(),
            observer: Box::new(Unobserved),
            notifier: None,
            stats: PipelineStats::default(),
        }
    }

    /// Use `epoch` as the wall-clock time of clock zero.
    #[must_use]
    pub fn with_epoch(mut self, epoch: DateTime<Utc>) -> Self {
        self.epoch = epoch;
        self
    }

    /// Attach presentation callbacks.
    #[must_use]
    pub fn with_observer(mut self, observer: impl ConversationObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Attach a notifier for attachment toasts.
    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Delivery timings in use.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Current pipeline clock.
    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    /// Wall-clock time corresponding to the pipeline clock.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(self.timers.now())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.epoch + offset
    }

    /// Deadline of the next scheduled transition.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Number of scheduled transitions.
    pub fn pending_transitions(&self) -> usize {
        self.timers.len()
    }

    /// Counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Open a conversation view.
    pub fn open_conversation(&mut self, conversation: Conversation) -> Result<(), PipelineError> {
        let id = conversation.id().clone();
        if self.conversations.contains_key(&id) {
            return Err(PipelineError::AlreadyOpen(id));
        }
        debug!(conversation = %id, "Opening conversation");
        self.conversations.insert(id.clone(), conversation);
        self.order.push(id.clone());
        self.emit_changed(&id);
        Ok(())
    }

    /// Leave a conversation view. Every pending transition for it,
    /// including a pending reply, is cancelled. Returns the final state.
    pub fn close_conversation(&mut self, id: &ConversationId) -> Result<Conversation, PipelineError> {
        let conversation = self
            .conversations
            .remove(id)
            .ok_or_else(|| PipelineError::UnknownConversation(id.clone()))?;
        self.order.retain(|c| c != id);

        let cancelled = self.timers.cancel_where(|t| t.conversation() == id);
        self.stats.timers_cancelled += cancelled as u64;
        debug!(conversation = %id, cancelled, "Closed conversation");
        Ok(conversation)
    }

    /// Read-only copy of an open conversation.
    pub fn snapshot(&self, id: &ConversationId) -> Option<ConversationSnapshot> {
        self.conversations.get(id).map(Conversation::snapshot)
    }

    /// Borrow an open conversation.
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// Chat-list rows for open conversations, in the order they were
    /// opened, optionally filtered by peer name.
    pub fn summaries(&self, query: Option<&str>) -> Vec<ConversationSummary> {
        self.order
            .iter()
            .filter_map(|id| self.conversations.get(id))
            .map(Conversation::summary)
            .filter(|s| query.is_none_or(|q| s.matches(q)))
            .collect()
    }

    /// Append a local message and schedule its delivery transitions.
    ///
    /// The message is visible immediately in `Sending`.
    pub fn submit_local_message(
        &mut self,
        id: &ConversationId,
        kind: MessageKind,
        body: MessageBody,
    ) -> Result<MessageId, PipelineError> {
        if body.is_blank() {
            return Err(PipelineError::EmptyMessage);
        }
        self.append_local(id, MessageDraft::local(kind, body))
    }

    /// Append a local text message.
    pub fn submit_text(
        &mut self,
        id: &ConversationId,
        text: impl Into<String>,
    ) -> Result<MessageId, PipelineError> {
        self.submit_local_message(id, MessageKind::Text, MessageBody::text(text))
    }

    /// Resolve `attachment` through `source` and append it as a local
    /// message.
    ///
    /// A resolution failure does not stop the message: it is appended in
    /// `Sending` with the failure recorded, progresses like any other, and
    /// the error is returned in the receipt.
    pub fn submit_attachment(
        &mut self,
        id: &ConversationId,
        attachment: &Attachment,
        source: &mut dyn AttachmentSource,
    ) -> Result<SubmitReceipt, PipelineError> {
        self.open(id)?;
        let kind = attachment.kind();

        let (draft, attachment_error) = match source.resolve(attachment) {
            Ok(reference) => {
                self.notify(Notification::success(format!("{kind} uploaded successfully!")));
                (
                    MessageDraft::local(kind, attachment.resolved_body(reference)),
                    None,
                )
            }
            Err(e) => {
                warn!(conversation = %id, error = %e, "Attachment could not be resolved");
                self.notify(Notification::error(e.to_string()));
                let draft = MessageDraft::local(kind, attachment.unresolved_body())
                    .with_attachment_failure(e.to_string());
                (draft, Some(e))
            }
        };

        let message = self.append_local(id, draft)?;
        Ok(SubmitReceipt {
            message,
            attachment_error,
        })
    }

    /// Schedule a simulated reply from the peer: the typing indicator shows
    /// first, then the reply lands and the indicator hides in the same step.
    ///
    /// With several replies outstanding, each one hides the indicator as it
    /// lands and it is shown again for the next.
    pub fn request_simulated_reply(&mut self, id: &ConversationId) -> Result<(), PipelineError> {
        self.open(id)?;
        self.timers.schedule_after(
            self.config.typing_after(),
            Transition::ShowTyping {
                conversation: id.clone(),
            },
        );
        self.timers.schedule_after(
            self.config.reply_after(),
            Transition::DeliverReply {
                conversation: id.clone(),
            },
        );
        Ok(())
    }

    /// Mark every remote message read and clear the unread counter.
    /// Returns how many messages changed status.
    pub fn mark_conversation_read(&mut self, id: &ConversationId) -> Result<usize, PipelineError> {
        let conversation = self.open_mut(id)?;
        let had_unread = conversation.unread_count() > 0;
        let changed = conversation.mark_read();
        if changed > 0 || had_unread {
            self.emit_changed(id);
        }
        Ok(changed)
    }

    /// Apply every transition due at or before `now`, in firing order.
    /// Returns how many timers fired.
    pub fn advance_to(&mut self, now: Duration) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due(now) {
            fired += 1;
            self.apply(timer.payload);
        }
        self.timers.advance_to(now);
        fired
    }

    /// Advance the pipeline clock by `elapsed`.
    pub fn advance_by(&mut self, elapsed: Duration) -> usize {
        let now = self.timers.now() + elapsed;
        self.advance_to(now)
    }

    fn append_local(
        &mut self,
        id: &ConversationId,
        draft: MessageDraft,
    ) -> Result<MessageId, PipelineError> {
        let created_at = self.timestamp();
        let message = self.open_mut(id)?.push(draft, created_at);

        for (delay, status) in [
            (self.config.sent_after(), DeliveryStatus::Sent),
            (self.config.delivered_after(), DeliveryStatus::Delivered),
        ] {
            self.timers.schedule_after(
                delay,
                Transition::Status {
                    conversation: id.clone(),
                    message,
                    status,
                },
            );
        }

        self.emit_changed(id);
        Ok(message)
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Status {
                conversation,
                message,
                status,
            } => {
                let Some(target) = self.conversations.get_mut(&conversation) else {
                    self.stats.stale_discarded += 1;
                    return;
                };
                match target.advance_status(message, status) {
                    Ok(_) => {
                        self.stats.transitions_applied += 1;
                        self.emit_changed(&conversation);
                    }
                    Err(e) => {
                        self.stats.stale_discarded += 1;
                        debug!(conversation = %conversation, error = %e, "Discarding transition");
                    }
                }
            }
            Transition::ShowTyping { conversation } => {
                let Some(target) = self.conversations.get_mut(&conversation) else {
                    return;
                };
                if target.set_typing(TypingIndicator::Visible) {
                    self.observer
                        .on_typing_indicator_changed(&conversation, true);
                    self.emit_changed(&conversation);
                }
            }
            Transition::DeliverReply { conversation } => {
                let created_at = self.timestamp();
                let reply = MessageBody::text(self.config.reply_text.clone());
                let Some(target) = self.conversations.get_mut(&conversation) else {
                    return;
                };
                let hidden = target.set_typing(TypingIndicator::Hidden);
                let draft = MessageDraft::remote(target.peer().identity(), MessageKind::Text, reply);
                target.push(draft, created_at);
                self.stats.replies_delivered += 1;

                self.emit_changed(&conversation);
                if hidden {
                    self.observer
                        .on_typing_indicator_changed(&conversation, false);
                }

                let another_pending = self.timers.any(|t| {
                    matches!(t, Transition::DeliverReply { conversation: c } if *c == conversation)
                });
                if another_pending {
                    self.timers.schedule_after(
                        self.config.typing_after(),
                        Transition::ShowTyping { conversation },
                    );
                }
            }
        }
    }

    fn open(&self, id: &ConversationId) -> Result<&Conversation, PipelineError> {
        self.conversations
            .get(id)
            .ok_or_else(|| PipelineError::UnknownConversation(id.clone()))
    }

    fn open_mut(&mut self, id: &ConversationId) -> Result<&mut Conversation, PipelineError> {
        self.conversations
            .get_mut(id)
            .ok_or_else(|| PipelineError::UnknownConversation(id.clone()))
    }

    fn emit_changed(&mut self, id: &ConversationId) {
        if let Some(conversation) = self.conversations.get(id) {
            self.observer.on_conversation_changed(&conversation.snapshot());
        }
    }

    fn notify(&mut self, notification: Notification) {
        if let Some(notifier) = self.notifier.as_mut() {
            notifier.notify(notification);
        }
    }
}

impl std::fmt::Debug for MessagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePipeline")
            .field("now", &self.timers.now())
            .field("conversations", &self.order)
            .field("pending_transitions", &self.timers.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
