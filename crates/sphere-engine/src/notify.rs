//! Toast notifications.
//!
//! Components never talk to a global toast channel; they receive a
//! [`Notifier`] and push [`Notification`]s into it. [`ToastQueue`] is the
//! stock implementation: toasts show immediately and are dismissed after a
//! fixed lifetime on the engine's timer queue.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::clock::{Scheduler, TimerHandle, TimerQueue};
use crate::config::ToastConfig;

/// Severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    /// Confirmation of a completed action.
    #[default]
    Success,
    /// Something the user asked for did not happen.
    Error,
    /// Neutral information.
    Info,
}

impl std::fmt::Display for ToastLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A message a component wants shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity.
    pub level: ToastLevel,
    /// Text to show.
    pub message: String,
}

impl Notification {
    /// Create a success notification.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    /// Create an error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }
}

/// Capability for surfacing notifications to the user.
pub trait Notifier: Send {
    /// Show a notification.
    fn notify(&mut self, notification: Notification);
}

impl Notifier for mpsc::UnboundedSender<Notification> {
    fn notify(&mut self, notification: Notification) {
        // Receiver gone means nobody is showing toasts anymore.
        let _ = self.send(notification);
    }
}

/// Identifier of a shown toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToastId(pub u64);

/// A toast currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    /// Toast identifier.
    pub id: ToastId,
    /// Severity.
    pub level: ToastLevel,
    /// Text shown.
    pub message: String,
    /// When the toast appeared, on the queue's clock.
    pub shown_at: Duration,
    #[serde(skip)]
    timer: TimerHandle,
}

/// Visible toasts with automatic dismissal.
#[derive(Debug)]
pub struct ToastQueue {
    lifetime: Duration,
    timers: TimerQueue<ToastId>,
    visible: Vec<Toast>,
    next_id: u64,
}

impl ToastQueue {
    /// Create an empty queue using the configured lifetime.
    pub fn new(config: &ToastConfig) -> Self {
        Self {
            lifetime: config.dismiss_after(),
            timers: TimerQueue::new(),
            visible: Vec::new(),
            next_id: 1,
        }
    }

    /// Show a toast now. It is dismissed once its lifetime has elapsed.
    pub fn show(&mut self, level: ToastLevel, message: impl Into<String>) -> ToastId {
        let id = ToastId(self.next_id);
        self.next_id += 1;
        let timer = self.timers.schedule_after(self.lifetime, id);
        self.visible.push(Toast {
            id,
            level,
            message: message.into(),
            shown_at: self.timers.now(),
            timer,
        });
        id
    }

    /// Dismiss a toast before its lifetime ends.
    pub fn dismiss(&mut self, id: ToastId) -> bool {
        let Some(index) = self.visible.iter().position(|t| t.id == id) else {
            return false;
        };
        let toast = self.visible.remove(index);
        self.timers.cancel(toast.timer);
        true
    }

    /// Advance the queue clock, returning the toasts that expired.
    pub fn advance_to(&mut self, now: Duration) -> Vec<Toast> {
        let mut expired = Vec::new();
        for fired in self.timers.drain_until(now) {
            if let Some(index) = self.visible.iter().position(|t| t.id == fired.payload) {
                expired.push(self.visible.remove(index));
            }
        }
        expired
    }

    /// Advance the queue clock by `elapsed`.
    pub fn advance_by(&mut self, elapsed: Duration) -> Vec<Toast> {
        let now = self.timers.now() + elapsed;
        self.advance_to(now)
    }

    /// Toasts currently on screen, oldest first.
    pub fn visible(&self) -> &[Toast] {
        &self.visible
    }

    /// Deadline of the next automatic dismissal.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }
}

impl Notifier for ToastQueue {
    fn notify(&mut self, notification: Notification) {
        self.show(notification.level, notification.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> ToastQueue {
        ToastQueue::new(&ToastConfig::default())
    }

    #[test]
    fn test_toast_visible_until_lifetime_elapses() {
        let mut toasts = queue();
        let id = toasts.show(ToastLevel::Success, "Feed refreshed!");

        assert_eq!(toasts.visible().len(), 1);
        assert!(toasts.advance_by(Duration::from_millis(2999)).is_empty());

        let expired = toasts.advance_by(Duration::from_millis(1));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, id);
        assert!(toasts.visible().is_empty());
    }

    #[test]
    fn test_toasts_expire_in_order_shown() {
        let mut toasts = queue();
        toasts.show(ToastLevel::Info, "first");
        toasts.advance_by(Duration::from_millis(1000));
        toasts.show(ToastLevel::Error, "second");

        let expired = toasts.advance_by(Duration::from_millis(2000));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].message, "first");
        assert_eq!(toasts.visible()[0].message, "second");
        assert_eq!(toasts.visible()[0].shown_at, Duration::from_millis(1000));
        assert_eq!(toasts.next_deadline(), Some(Duration::from_millis(4000)));
    }

    #[test]
    fn test_manual_dismiss_cancels_timer() {
        let mut toasts = queue();
        let id = toasts.show(ToastLevel::Success, "done");

        assert!(toasts.dismiss(id));
        assert!(!toasts.dismiss(id));
        assert_eq!(toasts.next_deadline(), None);
        assert!(toasts.advance_by(Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_queue_as_notifier() {
        let mut toasts = queue();
        let notifier: &mut dyn Notifier = &mut toasts;
        notifier.notify(Notification::error("Could not share post"));

        assert_eq!(toasts.visible()[0].level, ToastLevel::Error);
        assert_eq!(toasts.visible()[0].message, "Could not share post");
    }

    #[test]
    fn test_channel_notifier_forwards() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        tx.notify(Notification::success("saved"));
        assert_eq!(rx.try_recv().unwrap(), Notification::success("saved"));

        drop(rx);
        // A closed channel is not an error for the notifying component.
        tx.notify(Notification::success("ignored"));
    }
}
