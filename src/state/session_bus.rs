use crate::error::RefreshError;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 32;

fn now_iso() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn { at: String },
    Refreshed { at: String },
    LoggedOut { at: String },
    /// No usable credential pair remains; the shell should send the user to sign in.
    Invalidated { reason: String, at: String },
}

impl SessionEvent {
    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::Invalidated { .. })
    }
}

#[derive(Clone)]
pub struct SessionBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscriber is fine: nobody is listening for redirects.
        let _ = self.tx.send(event);
    }

    pub(crate) fn logged_in(&self) {
        self.emit(SessionEvent::LoggedIn { at: now_iso() });
    }

    pub(crate) fn refreshed(&self) {
        self.emit(SessionEvent::Refreshed { at: now_iso() });
    }

    pub(crate) fn logged_out(&self) {
        self.emit(SessionEvent::LoggedOut { at: now_iso() });
    }

    pub(crate) fn invalidated(&self, reason: &RefreshError) {
        tracing::warn!(reason = %reason, "session invalidated");
        self.emit(SessionEvent::Invalidated {
            reason: reason.to_string(),
            at: now_iso(),
        });
    }
}
