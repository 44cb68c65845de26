use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: Uuid,
    pub level: ToastLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Fire-and-forget user notification sink.
pub trait Notifier: Send + Sync {
    fn toast(&self, level: ToastLevel, message: &str);
}

/// Keeps toasts until their display time runs out.
#[derive(Debug)]
pub struct ToastQueue {
    ttl: chrono::Duration,
    toasts: Mutex<Vec<Toast>>,
}

impl ToastQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(4)),
            toasts: Mutex::new(Vec::new()),
        }
    }

    fn toasts(&self) -> MutexGuard<'_, Vec<Toast>> {
        self.toasts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_at(&self, level: ToastLevel, message: &str, now: DateTime<Utc>) -> Toast {
        let toast = Toast {
            id: Uuid::new_v4(),
            level,
            message: message.to_string(),
            created_at: now,
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let mut toasts = self.toasts();
        toasts.retain(|existing| existing.expires_at > now);
        toasts.push(toast.clone());
        toast
    }

    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Toast> {
        let mut toasts = self.toasts();
        toasts.retain(|toast| toast.expires_at > now);
        toasts.clone()
    }

    pub fn active(&self) -> Vec<Toast> {
        self.active_at(Utc::now())
    }

    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut toasts = self.toasts();
        let before = toasts.len();
        toasts.retain(|toast| toast.id != id);
        before != toasts.len()
    }
}

impl Notifier for ToastQueue {
    fn toast(&self, level: ToastLevel, message: &str) {
        self.push_at(level, message, Utc::now());
    }
}
