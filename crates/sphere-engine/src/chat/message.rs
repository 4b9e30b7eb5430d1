//! Chat message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message identifier, unique and increasing within one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Delivery status of a message.
///
/// Variants are declared in rank order; the derived `Ord` is the status
/// rank, and a message's status only ever moves up it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Appended locally, not yet acknowledged.
    #[default]
    Sending,
    /// Accepted by the (simulated) server.
    Sent,
    /// Reached the recipient's device.
    Delivered,
    /// Seen by the recipient. Terminal.
    Read,
}

impl DeliveryStatus {
    /// Position in the delivery order.
    pub fn rank(self) -> u8 {
        match self {
            Self::Sending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
        }
    }

    /// Check if no further transition is possible.
    pub fn is_terminal(self) -> bool {
        self == Self::Read
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// An image attachment.
    Image,
    /// A video attachment.
    Video,
}

impl MessageKind {
    /// Classify an attachment by MIME type. Anything that is not an image or
    /// a video is sent as text naming the file.
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else {
            Self::Text
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageBody {
    /// Text content.
    Text(String),
    /// Reference to resolved media (e.g. an object URL).
    Media { reference: String },
    /// Media that could not be resolved; only its label is known.
    Unresolved { label: String },
}

impl MessageBody {
    /// Create a text body.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Short single-line preview for conversation lists.
    pub fn preview(&self, kind: MessageKind) -> String {
        match self {
            Self::Text(text) => text.lines().next().unwrap_or_default().to_string(),
            Self::Media { .. } | Self::Unresolved { .. } => match kind {
                MessageKind::Image => "Photo".into(),
                MessageKind::Video => "Video".into(),
                MessageKind::Text => "Attachment".into(),
            },
        }
    }

    /// Check if the body has no visible content.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Media { reference } => reference.is_empty(),
            Self::Unresolved { label } => label.is_empty(),
        }
    }
}

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Composed on this device.
    Local,
    /// Received from the peer.
    Remote,
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    /// Stable sender id.
    pub id: String,
    /// Name shown next to the message.
    pub display_name: String,
}

impl SenderIdentity {
    /// Create a sender identity.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// The user of this device.
    pub fn local() -> Self {
        Self::new("me", "You")
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier within the conversation.
    pub id: MessageId,
    /// Author.
    pub sender: SenderIdentity,
    /// Payload.
    pub body: MessageBody,
    /// Payload kind.
    pub kind: MessageKind,
    /// Local or remote.
    pub origin: Origin,
    /// Delivery status.
    pub status: DeliveryStatus,
    /// When the message was appended.
    pub created_at: DateTime<Utc>,
    /// Why the attachment could not be resolved, if it could not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_failure: Option<String>,
}

impl Message {
    /// Check if this message was composed locally.
    pub fn is_own(&self) -> bool {
        self.origin == Origin::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rank_order() {
        let ordered = [
            DeliveryStatus::Sending,
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Read,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].rank() < pair[1].rank());
        }
        assert!(DeliveryStatus::Read.is_terminal());
        assert!(!DeliveryStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_kind_from_mime() {
        assert_eq!(MessageKind::from_mime("image/png"), MessageKind::Image);
        assert_eq!(MessageKind::from_mime("VIDEO/mp4"), MessageKind::Video);
        assert_eq!(MessageKind::from_mime("application/pdf"), MessageKind::Text);
        assert_eq!(MessageKind::from_mime(""), MessageKind::Text);
    }

    #[test]
    fn test_body_preview() {
        assert_eq!(
            MessageBody::text("Game day!\nsecond line").preview(MessageKind::Text),
            "Game day!"
        );
        let media = MessageBody::Media {
            reference: "blob:1".into(),
        };
        assert_eq!(media.preview(MessageKind::Image), "Photo");
        assert_eq!(media.preview(MessageKind::Video), "Video");
    }

    #[test]
    fn test_blank_body() {
        assert!(MessageBody::text("   \n").is_blank());
        assert!(!MessageBody::text("hi").is_blank());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&DeliveryStatus::Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
    }
}
