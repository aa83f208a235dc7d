use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::messaging::ProgressHandle;
use crate::{ChatKey, MediaKind};

/// Where a conversation currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogState {
    /// Not started, or cancelled; only `/start` moves on
    #[default]
    Idle,
    AwaitingUrl,
    AwaitingFormat,
    AwaitingQuality,
    /// A job is running for this chat
    Downloading,
}

/// Per-conversation captured state
#[derive(Debug, Clone)]
pub struct Session {
    pub state: DialogState,
    pub url: Option<String>,
    pub format: Option<MediaKind>,
    pub quality: Option<String>,
    pub progress: Option<ProgressHandle>,
    pub last_seen: Instant,
}

impl Session {
    pub fn new(state: DialogState) -> Self {
        Self {
            state,
            url: None,
            format: None,
            quality: None,
            progress: None,
            last_seen: Instant::now(),
        }
    }

    /// Drop everything captured and move to `state`
    pub fn reset(&mut self, state: DialogState) {
        *self = Self::new(state);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DialogState::Idle)
    }
}

/// Sessions keyed by conversation
///
/// The lock is only held for the duration of a single call, never across an
/// await point, so chats never wait on each other.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<ChatKey, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a chat's session, if it has one
    pub fn get(&self, chat: ChatKey) -> Option<Session> {
        self.lock().get(&chat).cloned()
    }

    pub fn put(&self, chat: ChatKey, mut session: Session) {
        session.last_seen = Instant::now();
        self.lock().insert(chat, session);
    }

    /// Mutate a chat's session in place, creating it if needed
    pub fn update<F>(&self, chat: ChatKey, f: F) -> Session
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.lock();
        let session = sessions.entry(chat).or_default();
        f(session);
        session.last_seen = Instant::now();
        session.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget sessions untouched for longer than `ttl`; returns how many went
    ///
    /// Sessions with a running job are kept regardless of age.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.evict_idle_at(ttl, Instant::now())
    }

    fn evict_idle_at(&self, ttl: Duration, now: Instant) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.state == DialogState::Downloading
                || now.saturating_duration_since(session.last_seen) <= ttl
        });
        before - sessions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChatKey, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
