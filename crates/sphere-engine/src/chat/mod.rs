//! Direct-message conversations and their simulated delivery.

pub mod attachment;
pub mod conversation;
pub mod message;
pub mod pipeline;
pub mod sample;

pub use attachment::{Attachment, AttachmentError, AttachmentSource, ObjectUrlSource};
pub use conversation::{
    Contact, Conversation, ConversationId, ConversationSnapshot, ConversationSummary,
    MessageDraft, TransitionError, TypingIndicator, MAX_BADGE_COUNT,
};
pub use message::{
    DeliveryStatus, Message, MessageBody, MessageId, MessageKind, Origin, SenderIdentity,
};
pub use pipeline::{
    ConversationObserver, MessagePipeline, PipelineError, PipelineEvent, PipelineStats,
    SubmitReceipt, Transition, Unobserved,
};
