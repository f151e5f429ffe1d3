//! User-facing notification records.
//!
//! Operations report outcomes as notices on a channel the host polls; the
//! engine never panics or blocks on a missing listener.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A single user-visible notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: NoticeLevel,
    /// Short headline shown in the toast
    pub title: String,
    /// Expanded context, e.g. the underlying error text
    pub detail: Option<String>,
}

impl Notice {
    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn new(level: NoticeLevel, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            title: title.into(),
            detail: None,
        }
    }
}

/// Sending half of the notice channel.
///
/// Send failures are swallowed: a host that dropped its receiver just stops
/// listening, it does not break the operation that produced the notice.
#[derive(Clone)]
pub struct NoticeSink {
    tx: Option<Sender<Notice>>,
}

impl NoticeSink {
    pub fn new(tx: Sender<Notice>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that discards everything; for tests and headless embedding.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn push(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::error!(title = %notice.title, "notice"),
            NoticeLevel::Warning => tracing::warn!(title = %notice.title, "notice"),
            NoticeLevel::Info => tracing::info!(title = %notice.title, "notice"),
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(notice);
        }
    }
}
