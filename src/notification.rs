use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A passive banner; the reader keeps working while it is shown
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    #[serde(skip)]
    pub expires_at: Instant,
}

impl Notification {
    pub fn new(
        message: impl Into<String>,
        level: NotificationLevel,
        now: Instant,
        duration: Duration,
    ) -> Self {
        Self {
            message: message.into(),
            level,
            expires_at: now + duration,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct NotificationManager {
    notifications: Vec<Notification>,
    default_duration: Duration,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::with_default_duration(Duration::from_secs(5))
    }

    pub fn with_default_duration(default_duration: Duration) -> Self {
        Self {
            notifications: Vec::new(),
            default_duration,
        }
    }

    /// Newest notifications come first
    pub fn notify(&mut self, message: impl Into<String>, level: NotificationLevel, now: Instant) {
        let notification = Notification::new(message, level, now, self.default_duration);
        self.notifications.insert(0, notification);
    }

    pub fn info(&mut self, message: impl Into<String>, now: Instant) {
        self.notify(message, NotificationLevel::Info, now);
    }

    pub fn warn(&mut self, message: impl Into<String>, now: Instant) {
        self.notify(message, NotificationLevel::Warning, now);
    }

    pub fn error(&mut self, message: impl Into<String>, now: Instant) {
        self.notify(message, NotificationLevel::Error, now);
    }

    /// Remove expired notifications, returns true if any were removed
    pub fn update(&mut self, now: Instant) -> bool {
        let initial_len = self.notifications.len();
        self.notifications.retain(|n| !n.is_expired(now));
        self.notifications.len() != initial_len
    }

    pub fn current(&self) -> Option<&Notification> {
        self.notifications.first()
    }

    pub fn all(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn dismiss_current(&mut self) -> bool {
        if self.notifications.is_empty() {
            false
        } else {
            self.notifications.remove(0);
            true
        }
    }

    pub fn count(&self) -> usize {
        self.notifications.len()
    }
}
