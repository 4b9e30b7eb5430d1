//! sphere-engine: Interaction core for the sphere sports feed client
//!
//! This crate provides the headless logic behind the feed and chat surfaces:
//! - Pull-to-refresh gesture recognition
//! - Simulated message delivery with typing indicators and replies
//! - Toast notifications
//! - A deterministic timer queue and an async driver on top of it

pub mod chat;
pub mod clock;
pub mod config;
pub mod notify;
pub mod refresh;
pub mod runtime;

// Re-export commonly used types
pub use chat::{
    Attachment, AttachmentError, AttachmentSource, Contact, Conversation, ConversationId,
    ConversationObserver, ConversationSnapshot, ConversationSummary, DeliveryStatus, Message,
    MessageBody, MessageId, MessageKind, MessagePipeline, ObjectUrlSource, PipelineError,
    PipelineEvent, PipelineStats, SubmitReceipt, TypingIndicator,
};
pub use clock::{Scheduler, TimerHandle, TimerQueue};
pub use config::{ConfigError, DeliveryConfig, EngineConfig, RefreshConfig, ToastConfig};
pub use notify::{Notification, Notifier, Toast, ToastLevel, ToastQueue};
pub use refresh::{
    GestureIgnored, MoveOutcome, PendingRefresh, PointerSample, RefreshCompletion,
    RefreshController, RefreshEvent, RefreshFailed, RefreshObserver, RefreshOperation,
    RefreshOutcome, RefreshPhase, Release, StartOutcome,
};
pub use runtime::{start_pipeline, PipelineHandle};

/// Returns the engine version.
pub fn engine_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_version() {
        let version = engine_version();
        assert!(!version.is_empty());
        assert!(version.starts_with("0."));
    }
}
