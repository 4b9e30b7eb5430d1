//! Built-in sample conversations.
//!
//! The client ships without a backend, so the chat surface opens on this
//! fixed set of contacts and histories.

use chrono::{DateTime, Duration, Utc};

use super::conversation::{Contact, Conversation, ConversationId};
use super::message::DeliveryStatus;

struct SampleChat {
    id: &'static str,
    name: &'static str,
    last_message: &'static str,
    minutes_ago: i64,
    unread: u32,
    is_online: bool,
    is_group: bool,
    verification_tier: Option<&'static str>,
}

const SAMPLE_CHATS: &[SampleChat] = &[
    SampleChat {
        id: "1",
        name: "ESPN",
        last_message: "Breaking: Major trade announcement coming soon!",
        minutes_ago: 2,
        unread: 3,
        is_online: true,
        is_group: false,
        verification_tier: Some("reporter"),
    },
    SampleChat {
        id: "2",
        name: "LeBron James",
        last_message: "Thanks for the support! \u{1f64f}",
        minutes_ago: 15,
        unread: 0,
        is_online: true,
        is_group: false,
        verification_tier: Some("player"),
    },
    SampleChat {
        id: "3",
        name: "Lakers Fans",
        last_message: "Who's watching the game tonight?",
        minutes_ago: 60,
        unread: 12,
        is_online: false,
        is_group: true,
        verification_tier: None,
    },
    SampleChat {
        id: "4",
        name: "Cristiano Ronaldo",
        last_message: "Siuuuu! \u{26bd}",
        minutes_ago: 120,
        unread: 1,
        is_online: false,
        is_group: false,
        verification_tier: Some("player"),
    },
    SampleChat {
        id: "5",
        name: "NBA Updates",
        last_message: "Game highlights from last night",
        minutes_ago: 180,
        unread: 0,
        is_online: true,
        is_group: true,
        verification_tier: None,
    },
];

/// Sample contacts.
pub fn contacts() -> Vec<Contact> {
    SAMPLE_CHATS.iter().map(contact).collect()
}

/// Sample conversations with their histories, timestamped relative to `now`.
pub fn conversations(now: DateTime<Utc>) -> Vec<Conversation> {
    SAMPLE_CHATS
        .iter()
        .map(|chat| {
            let last_at = now - Duration::minutes(chat.minutes_ago);
            Conversation::new(ConversationId::new(chat.id), contact(chat))
                .with_received("Hey! How are you doing?", last_at - Duration::minutes(5))
                .with_sent(
                    "I'm good! Just watching the game highlights.",
                    DeliveryStatus::Read,
                    last_at - Duration::minutes(3),
                )
                .with_received(
                    "That last play was incredible! \u{1f525}",
                    last_at - Duration::minutes(1),
                )
                .with_received(chat.last_message, last_at)
                .with_unread(chat.unread)
        })
        .collect()
}

fn contact(chat: &SampleChat) -> Contact {
    Contact {
        id: format!("contact-{}", chat.id),
        name: chat.name.into(),
        is_online: chat.is_online,
        is_group: chat.is_group,
        verification_tier: chat.verification_tier.map(Into::into),
    }
}
