//! Client events surfaced to the embedding shell.
//!
//! The core never renders anything and never navigates; it broadcasts
//! [`ClientEvent`]s instead. A shell subscribes once and decides how to show
//! notices and where to send the user when a session dies.

use tokio::sync::broadcast;

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Events emitted by the request pipeline and session machinery.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A user-visible notice (toast material).
    Notice {
        level: NoticeLevel,
        message: String,
    },

    /// The session is gone for good; the shell should route to login and
    /// preserve the current destination for the post-login return.
    SessionExpired,
}

/// Broadcast handle for [`ClientEvent`]s.
///
/// Cheap to clone; emitting with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct ClientEvents {
    tx: broadcast::Sender<ClientEvent>,
}

impl ClientEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(ClientEvent::Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(ClientEvent::Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        });
    }

    pub fn session_expired(&self) {
        self.emit(ClientEvent::SessionExpired);
    }
}

impl Default for ClientEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let events = ClientEvents::new();
        let mut rx = events.subscribe();

        events.error("boom");

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ClientEvent::Notice {
                level: NoticeLevel::Error,
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let events = ClientEvents::new();
        events.session_expired();
    }
}
