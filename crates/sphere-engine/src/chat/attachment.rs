//! Attachment resolution.
//!
//! Turning a picked file into something a message can reference is an
//! injected step, so hosts can plug in whatever media store they have and
//! tests can make it fail on demand.

use serde::{Deserialize, Serialize};

use super::message::{MessageBody, MessageKind};

/// A file the user picked to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name, shown when the file is not an image or a video.
    pub file_name: String,
    /// MIME type reported by the picker.
    pub mime_type: String,
}

impl Attachment {
    /// Create an attachment description.
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Message kind this attachment will be sent as.
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_mime(&self.mime_type)
    }

    /// Body to use when the attachment resolved to `reference`.
    ///
    /// Non-media files are sent as text naming the file.
    pub fn resolved_body(&self, reference: String) -> MessageBody {
        match self.kind() {
            MessageKind::Text => MessageBody::text(self.file_name.clone()),
            MessageKind::Image | MessageKind::Video => MessageBody::Media { reference },
        }
    }

    /// Body to use when resolution failed.
    pub fn unresolved_body(&self) -> MessageBody {
        MessageBody::Unresolved {
            label: self.file_name.clone(),
        }
    }
}

/// Error resolving an attachment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    /// The file could not be read.
    #[error("Could not read {file_name}: {reason}")]
    Unreadable { file_name: String, reason: String },

    /// The file was read but could not be encoded for sending.
    #[error("Could not encode {file_name}: {reason}")]
    Encoding { file_name: String, reason: String },
}

/// Resolves attachments into media references.
pub trait AttachmentSource {
    /// Read the attachment and return a reference to it.
    fn resolve(&mut self, attachment: &Attachment) -> Result<String, AttachmentError>;
}

/// Source that hands out sequential in-memory object references.
#[derive(Debug, Default)]
pub struct ObjectUrlSource {
    next: u64,
}

impl AttachmentSource for ObjectUrlSource {
    fn resolve(&mut self, attachment: &Attachment) -> Result<String, AttachmentError> {
        if attachment.file_name.trim().is_empty() {
            return Err(AttachmentError::Unreadable {
                file_name: attachment.file_name.clone(),
                reason: "empty file name".into(),
            });
        }
        self.next += 1;
        Ok(format!("blob:sphere/{}/{}", self.next, attachment.file_name))
    }
}
