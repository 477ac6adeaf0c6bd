use crate::internal::refresh::ProgressEvent;
use std::time::{Duration, Instant};

/// Type of notification to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    Info,
    Warning,
    Error,
}

impl NotificationType {
    fn timeout(&self) -> Duration {
        match self {
            NotificationType::Info => Duration::from_secs(3),
            NotificationType::Warning => Duration::from_secs(5),
            NotificationType::Error => Duration::from_secs(10),
        }
    }
}

/// A status-line message with auto-dismiss
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub notification_type: NotificationType,
    pub timestamp: Instant,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, NotificationType::Info)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, NotificationType::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, NotificationType::Error)
    }

    fn new(message: impl Into<String>, notification_type: NotificationType) -> Self {
        Self {
            message: message.into(),
            notification_type,
            timestamp: Instant::now(),
        }
    }

    /// Map a refresh progress event to something worth telling the user.
    /// Per-node progress is shown by the status bar instead, so it maps to `None`.
    pub fn from_progress(event: &ProgressEvent) -> Option<Self> {
        match event {
            ProgressEvent::Completed {
                version,
                truncated,
                failed,
                ..
            } => {
                let mut message = format!("Refreshed (v{})", version);
                if *failed > 0 {
                    message.push_str(&format!(", {} unavailable", failed));
                }
                if *truncated {
                    message.push_str(", truncated");
                }
                Some(Self::info(message))
            }
            ProgressEvent::Failed { message } => {
                Some(Self::warning(format!("Refresh failed: {}", message)))
            }
            ProgressEvent::Started { .. } | ProgressEvent::Progress { .. } | ProgressEvent::Dropped => {
                None
            }
        }
    }

    pub fn should_dismiss(&self) -> bool {
        self.timestamp.elapsed() > self.notification_type.timeout()
    }
}
