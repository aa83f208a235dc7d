use std::sync::Arc;
use std::time::Duration;

pub mod menus;
pub mod session;

pub use session::{DialogState, Session, SessionStore};

use crate::messaging::{Keyboard, Messenger};
use crate::pipeline::{JobRequest, JobRunner};
use crate::utils::strip_query;
use crate::{ChatKey, MediaKind};

/// An inbound message, already classified by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    Cancel,
    Text(String),
}

/// Per-chat dialog: URL, then format, then quality, then download
///
/// Selection mistakes are answered with a re-prompt and never advance the
/// dialog. Once a job has run, whatever its outcome, the chat is back to
/// waiting for a URL.
pub struct ConversationEngine {
    sessions: SessionStore,
    runner: Arc<dyn JobRunner>,
    messenger: Arc<dyn Messenger>,
}

impl ConversationEngine {
    pub fn new(runner: Arc<dyn JobRunner>, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            sessions: SessionStore::new(),
            runner,
            messenger,
        }
    }

    /// Current state of a chat; chats never seen are idle
    pub fn state(&self, chat: ChatKey) -> DialogState {
        self.sessions
            .get(chat)
            .map(|session| session.state)
            .unwrap_or_default()
    }

    pub fn session(&self, chat: ChatKey) -> Option<Session> {
        self.sessions.get(chat)
    }

    /// Drop conversations idle for longer than `ttl`
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.sessions.evict_idle(ttl)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Process one inbound message and return the resulting state
    pub async fn handle(&self, chat: ChatKey, input: Input) -> DialogState {
        match input {
            Input::Start => {
                self.sessions.put(chat, Session::new(DialogState::AwaitingUrl));
                self.reply(chat, menus::WELCOME, Keyboard::Remove).await;
            }
            Input::Cancel => {
                self.sessions.put(chat, Session::new(DialogState::Idle));
                self.reply(chat, menus::CANCELLED, Keyboard::Remove).await;
            }
            Input::Text(text) => self.handle_text(chat, &text).await,
        }

        self.state(chat)
    }

    async fn handle_text(&self, chat: ChatKey, text: &str) {
        let session = self.sessions.get(chat).unwrap_or_default();

        match session.state {
            DialogState::Idle => self.reply(chat, menus::NOT_STARTED, Keyboard::Keep).await,
            DialogState::AwaitingUrl => self.capture_url(chat, text).await,
            DialogState::AwaitingFormat => self.choose_format(chat, &session, text).await,
            DialogState::AwaitingQuality => self.choose_quality(chat, &session, text).await,
            DialogState::Downloading => self.reply(chat, menus::BUSY, Keyboard::Keep).await,
        }
    }

    async fn capture_url(&self, chat: ChatKey, text: &str) {
        let url = strip_query(text.trim());
        if url.is_empty() {
            self.reply(chat, menus::EMPTY_URL, Keyboard::Keep).await;
            return;
        }

        tracing::info!(chat = %chat, "Captured URL: {}", url);
        self.sessions.update(chat, |session| {
            session.url = Some(url.to_string());
            session.state = DialogState::AwaitingFormat;
        });

        self.reply(chat, menus::CHOOSE_FORMAT, menus::format_keyboard()).await;
    }

    async fn choose_format(&self, chat: ChatKey, session: &Session, text: &str) {
        if session.url.is_none() {
            return self.missing_context(chat).await;
        }

        let Some(kind) = MediaKind::from_label(text) else {
            tracing::debug!(chat = %chat, "Invalid format choice: {:?}", text);
            return self.reply(chat, menus::INVALID_FORMAT, menus::format_keyboard()).await;
        };

        self.sessions.update(chat, |session| {
            session.format = Some(kind);
            session.quality = None;
            session.state = DialogState::AwaitingQuality;
        });

        self.reply(chat, &menus::choose_quality(kind), menus::quality_keyboard(kind)).await;
    }

    async fn choose_quality(&self, chat: ChatKey, session: &Session, text: &str) {
        let (Some(url), Some(kind)) = (session.url.clone(), session.format) else {
            return self.missing_context(chat).await;
        };

        let Some(option) = menus::find_quality(kind, text) else {
            tracing::debug!(chat = %chat, "Invalid quality choice: {:?}", text);
            return self.reply(chat, menus::INVALID_QUALITY, menus::quality_keyboard(kind)).await;
        };

        self.sessions.update(chat, |session| {
            session.quality = Some(option.selector.to_string());
            session.state = DialogState::Downloading;
        });

        self.dispatch(chat, url, kind, option.selector).await;
    }

    async fn dispatch(&self, chat: ChatKey, url: String, kind: MediaKind, quality: &str) {
        let progress = match self.messenger.send_notice(chat, menus::STARTING).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(chat = %chat, "Could not send progress message: {:#}", err);
                None
            }
        };
        self.sessions.update(chat, |session| session.progress = progress);

        let request = JobRequest {
            chat,
            url,
            kind,
            quality: quality.to_string(),
            progress,
        };

        // The runner reports to the user itself; only the log needs the outcome here
        match self.runner.run(request).await {
            Ok(delivered) => tracing::debug!(chat = %chat, "Delivered: {:?}", delivered),
            Err(err) => tracing::debug!(chat = %chat, "Job ended with error: {}", err),
        }

        self.sessions.update(chat, |session| session.reset(DialogState::AwaitingUrl));
        self.reply(chat, menus::NEXT_URL, Keyboard::Remove).await;
    }

    async fn missing_context(&self, chat: ChatKey) {
        tracing::warn!(chat = %chat, "Selection received without a captured URL");
        self.sessions.update(chat, |session| session.reset(DialogState::AwaitingUrl));
        self.reply(chat, menus::MISSING_URL, Keyboard::Remove).await;
    }

    async fn reply(&self, chat: ChatKey, text: &str, keyboard: Keyboard) {
        if let Err(err) = self.messenger.send_text(chat, text, keyboard).await {
            tracing::warn!(chat = %chat, "Failed to send reply: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Delivered, MockJobRunner};
    use crate::testing::RecordingMessenger;
    use crate::JobError;

    const CHAT: ChatKey = ChatKey(100);

    fn engine_with(runner: MockJobRunner) -> (ConversationEngine, Arc<RecordingMessenger>) {
        let messenger = Arc::new(RecordingMessenger::default());
        let engine = ConversationEngine::new(Arc::new(runner), messenger.clone());
        (engine, messenger)
    }

    fn idle_runner() -> MockJobRunner {
        let mut runner = MockJobRunner::new();
        runner.expect_run().never();
        runner
    }

    fn text(value: &str) -> Input {
        Input::Text(value.to_string())
    }

    /// Drive a chat to the given state through the public interface
    async fn reach(engine: &ConversationEngine, state: DialogState) {
        engine.handle(CHAT, Input::Start).await;
        if state == DialogState::AwaitingUrl {
            return;
        }
        engine.handle(CHAT, text("https://youtu.be/XYZ")).await;
        if state == DialogState::AwaitingFormat {
            return;
        }
        engine.handle(CHAT, text("🎥 Video")).await;
    }

    #[tokio::test]
    async fn test_start_always_awaits_url() {
        for state in [
            DialogState::Idle,
            DialogState::AwaitingUrl,
            DialogState::AwaitingFormat,
            DialogState::AwaitingQuality,
        ] {
            let (engine, messenger) = engine_with(idle_runner());
            if state != DialogState::Idle {
                reach(&engine, state).await;
            }
            assert_eq!(engine.state(CHAT), state);

            assert_eq!(engine.handle(CHAT, Input::Start).await, DialogState::AwaitingUrl);
            assert_eq!(messenger.last_text().unwrap(), menus::WELCOME);
            assert!(engine.session(CHAT).unwrap().url.is_none());
        }
    }

    #[tokio::test]
    async fn test_url_query_is_stripped() {
        let (engine, messenger) = engine_with(idle_runner());
        engine.handle(CHAT, Input::Start).await;

        let state = engine.handle(CHAT, text("https://youtu.be/XYZ?list=abc")).await;

        assert_eq!(state, DialogState::AwaitingFormat);
        assert_eq!(engine.session(CHAT).unwrap().url.as_deref(), Some("https://youtu.be/XYZ"));
        let sent = messenger.texts().pop().unwrap();
        assert_eq!(sent.text, menus::CHOOSE_FORMAT);
        assert_eq!(sent.keyboard, menus::format_keyboard());
    }

    #[tokio::test]
    async fn test_url_without_query_is_kept() {
        let (engine, _) = engine_with(idle_runner());
        engine.handle(CHAT, Input::Start).await;
        engine.handle(CHAT, text("  https://www.youtube.com/shorts/abc  ")).await;

        assert_eq!(
            engine.session(CHAT).unwrap().url.as_deref(),
            Some("https://www.youtube.com/shorts/abc")
        );
    }

    #[tokio::test]
    async fn test_invalid_format_holds_state() {
        let (engine, messenger) = engine_with(idle_runner());
        reach(&engine, DialogState::AwaitingFormat).await;

        for input in ["Video", "🎵 audio", "https://youtu.be/other", ""] {
            assert_eq!(engine.handle(CHAT, text(input)).await, DialogState::AwaitingFormat);
            assert_eq!(messenger.last_text().unwrap(), menus::INVALID_FORMAT);
        }
        assert_eq!(engine.session(CHAT).unwrap().url.as_deref(), Some("https://youtu.be/XYZ"));
    }

    #[tokio::test]
    async fn test_invalid_quality_holds_state() {
        let (engine, messenger) = engine_with(idle_runner());
        reach(&engine, DialogState::AwaitingQuality).await;

        // An audio label is not valid in the video menu
        for input in ["720p", "🔊 Alta (320kbps)", "🎥 Video"] {
            assert_eq!(engine.handle(CHAT, text(input)).await, DialogState::AwaitingQuality);
            assert_eq!(messenger.last_text().unwrap(), menus::INVALID_QUALITY);
        }
        assert!(messenger.notices().is_empty());
    }

    #[tokio::test]
    async fn test_padded_labels_are_not_accepted() {
        let (engine, messenger) = engine_with(idle_runner());
        reach(&engine, DialogState::AwaitingFormat).await;

        for input in [" 🎵 Audio ", "🎥 Video\n"] {
            assert_eq!(engine.handle(CHAT, text(input)).await, DialogState::AwaitingFormat);
            assert_eq!(messenger.last_text().unwrap(), menus::INVALID_FORMAT);
        }
        assert!(engine.session(CHAT).unwrap().format.is_none());

        engine.handle(CHAT, text("🎥 Video")).await;
        for input in [" 📺 720p", "📺 720p "] {
            assert_eq!(engine.handle(CHAT, text(input)).await, DialogState::AwaitingQuality);
            assert_eq!(messenger.last_text().unwrap(), menus::INVALID_QUALITY);
        }
        assert!(messenger.notices().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_goes_idle_from_anywhere() {
        for state in [DialogState::AwaitingUrl, DialogState::AwaitingFormat, DialogState::AwaitingQuality] {
            let (engine, messenger) = engine_with(idle_runner());
            reach(&engine, state).await;

            assert_eq!(engine.handle(CHAT, Input::Cancel).await, DialogState::Idle);
            assert_eq!(messenger.last_text().unwrap(), menus::CANCELLED);

            // Text is not interpreted until the dialog is restarted
            assert_eq!(engine.handle(CHAT, text("https://youtu.be/XYZ")).await, DialogState::Idle);
            assert_eq!(messenger.last_text().unwrap(), menus::NOT_STARTED);
        }
    }

    #[tokio::test]
    async fn test_audio_end_to_end() {
        let mut runner = MockJobRunner::new();
        runner
            .expect_run()
            .withf(|request| {
                request.chat == CHAT
                    && request.url == "https://youtu.be/XYZ"
                    && request.kind == MediaKind::Audio
                    && request.quality == "320"
                    && request.progress.is_some()
            })
            .times(1)
            .returning(|_| Ok(Delivered::Complete));
        let (engine, messenger) = engine_with(runner);

        assert_eq!(engine.handle(CHAT, Input::Start).await, DialogState::AwaitingUrl);
        engine.handle(CHAT, text("https://youtu.be/XYZ?list=abc")).await;
        assert_eq!(engine.session(CHAT).unwrap().url.as_deref(), Some("https://youtu.be/XYZ"));

        assert_eq!(engine.handle(CHAT, text("🎵 Audio")).await, DialogState::AwaitingQuality);
        let prompt = messenger.texts().pop().unwrap();
        match prompt.keyboard {
            Keyboard::Options(rows) => assert_eq!(rows.concat().len(), 4),
            other => panic!("expected quality options, got {:?}", other),
        }

        let state = engine.handle(CHAT, text("🔊 Alta (320kbps)")).await;

        assert_eq!(state, DialogState::AwaitingUrl);
        assert_eq!(messenger.notices(), vec![menus::STARTING.to_string()]);
        assert_eq!(messenger.last_text().unwrap(), menus::NEXT_URL);
        let session = engine.session(CHAT).unwrap();
        assert!(session.url.is_none());
        assert!(session.format.is_none());
        assert!(session.quality.is_none());
    }

    #[tokio::test]
    async fn test_failed_job_returns_to_awaiting_url() {
        let mut runner = MockJobRunner::new();
        runner
            .expect_run()
            .withf(|request| request.kind == MediaKind::Video && request.quality == "480")
            .times(1)
            .returning(|_| Err(JobError::DeliveryTimeout));
        let (engine, messenger) = engine_with(runner);
        reach(&engine, DialogState::AwaitingQuality).await;

        assert_eq!(engine.handle(CHAT, text("📺 480p")).await, DialogState::AwaitingUrl);
        assert_eq!(messenger.last_text().unwrap(), menus::NEXT_URL);

        // The next URL starts a fresh round
        assert_eq!(
            engine.handle(CHAT, text("https://youtu.be/next")).await,
            DialogState::AwaitingFormat
        );
    }

    #[tokio::test]
    async fn test_missing_url_recovers_to_awaiting_url() {
        let (engine, messenger) = engine_with(idle_runner());
        engine.sessions.put(CHAT, Session::new(DialogState::AwaitingQuality));

        assert_eq!(engine.handle(CHAT, text("📺 720p")).await, DialogState::AwaitingUrl);
        assert_eq!(messenger.last_text().unwrap(), menus::MISSING_URL);
    }

    #[tokio::test]
    async fn test_downloading_chat_is_told_to_wait() {
        let (engine, messenger) = engine_with(idle_runner());
        engine.sessions.put(CHAT, Session::new(DialogState::Downloading));

        assert_eq!(engine.handle(CHAT, text("https://youtu.be/XYZ")).await, DialogState::Downloading);
        assert_eq!(messenger.last_text().unwrap(), menus::BUSY);
    }

    #[tokio::test]
    async fn test_chats_do_not_interfere() {
        let (engine, _) = engine_with(idle_runner());
        let other = ChatKey(200);

        engine.handle(CHAT, Input::Start).await;
        engine.handle(other, Input::Start).await;
        engine.handle(CHAT, text("https://youtu.be/one")).await;

        assert_eq!(engine.state(CHAT), DialogState::AwaitingFormat);
        assert_eq!(engine.state(other), DialogState::AwaitingUrl);
        assert!(engine.session(other).unwrap().url.is_none());
        assert_eq!(engine.active_sessions(), 2);
    }
}
