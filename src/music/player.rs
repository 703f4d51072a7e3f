use std::collections::HashMap;
use std::sync::Arc;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, info_span, warn};
use tracing_futures::Instrument;

use super::{MusicError, PlaybackState, PlayerEvent, PlayerEventKind, StopBehavior};
use crate::playlists::PlaylistStore;

/// The voice transport and stream decoder the player drives.
#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    type Source: Send + 'static;

    /// Fetches and decodes an audio-only stream for `url`.
    async fn load(&self, url: &str) -> Result<Self::Source, MusicError>;

    async fn is_connected(&self, guild_id: GuildId) -> bool;

    /// Joins `channel_id`, reusing the guild's connection if one already exists.
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError>;

    async fn start(
        &self,
        guild_id: GuildId,
        source: Self::Source,
        on_end: TrackEnd,
    ) -> Result<(), MusicError>;

    /// Stops the current output but keeps the connection.
    async fn halt(&self, guild_id: GuildId);

    /// Stops the output and leaves the channel. No-op when not connected.
    async fn disconnect(&self, guild_id: GuildId) -> Result<(), MusicError>;
}

/// Completion callback registered with every started track.
#[derive(Clone)]
pub struct TrackEnd {
    notify: Arc<dyn Fn() + Send + Sync>,
}

impl TrackEnd {
    fn new(notify: impl Fn() + Send + Sync + 'static) -> Self {
        TrackEnd {
            notify: Arc::new(notify),
        }
    }

    pub fn notify(&self) {
        (self.notify)()
    }
}

enum Message<S> {
    Play {
        voice_channel: ChannelId,
        text_channel: ChannelId,
        reply: oneshot::Sender<Result<String, MusicError>>,
    },
    Skip {
        reply: oneshot::Sender<Result<Option<String>, MusicError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<(), MusicError>>,
    },
    Disconnected,
    State {
        reply: oneshot::Sender<PlaybackState>,
    },
    Loaded {
        generation: u64,
        result: Result<S, MusicError>,
    },
    TrackEnded {
        generation: u64,
    },
}

type Mailbox<S> = mpsc::UnboundedSender<Message<S>>;

/// Owns the playlist store and one player task per guild.
pub struct MusicManager<B: AudioBackend> {
    inner: Arc<Inner<B>>,
}

struct Inner<B: AudioBackend> {
    store: Arc<PlaylistStore>,
    backend: Arc<B>,
    stop_behavior: StopBehavior,
    events: mpsc::UnboundedSender<PlayerEvent>,
    players: Mutex<HashMap<GuildId, Mailbox<B::Source>>>,
}

impl<B: AudioBackend> Clone for MusicManager<B> {
    fn clone(&self) -> Self {
        MusicManager {
            inner: self.inner.clone(),
        }
    }
}

impl<B: AudioBackend> MusicManager<B> {
    pub fn new(
        store: Arc<PlaylistStore>,
        backend: Arc<B>,
        stop_behavior: StopBehavior,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        MusicManager {
            inner: Arc::new(Inner {
                store,
                backend,
                stop_behavior,
                events,
                players: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn stop_behavior(&self) -> StopBehavior {
        self.inner.stop_behavior
    }

    pub async fn add_song(&self, guild_id: GuildId, url: &str) -> Result<(), MusicError> {
        self.inner.store.add_song(guild_id, url).await
    }

    pub async fn playlist(&self, guild_id: GuildId) -> Vec<String> {
        self.inner.store.playlist(guild_id).await
    }

    /// Removes `url` from the queue only. A session currently playing it keeps playing.
    pub async fn remove_song(&self, guild_id: GuildId, url: &str) -> Result<usize, MusicError> {
        self.inner.store.remove_song(guild_id, url).await
    }

    /// Starts the head of the guild's playlist and resolves once it is playing.
    pub async fn play(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<String, MusicError> {
        let (reply, response) = oneshot::channel();
        self.send(
            guild_id,
            Message::Play {
                voice_channel,
                text_channel,
                reply,
            },
        )
        .await?;

        response.await.map_err(|_| MusicError::PlayerGone)?
    }

    /// Drops the current track and moves on. Returns the next url, if any.
    pub async fn skip(&self, guild_id: GuildId) -> Result<Option<String>, MusicError> {
        let (reply, response) = oneshot::channel();
        self.send(guild_id, Message::Skip { reply }).await?;

        response.await.map_err(|_| MusicError::PlayerGone)?
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let (reply, response) = oneshot::channel();
        self.send(guild_id, Message::Stop { reply }).await?;

        response.await.map_err(|_| MusicError::PlayerGone)?
    }

    /// The bot was removed from voice by someone else; forget the session, keep the playlist.
    pub async fn disconnected(&self, guild_id: GuildId) {
        let players = self.inner.players.lock().await;
        if let Some(mailbox) = players.get(&guild_id) {
            let _ = mailbox.send(Message::Disconnected);
        }
    }

    pub async fn state(&self, guild_id: GuildId) -> PlaybackState {
        let mailbox = match self.inner.players.lock().await.get(&guild_id) {
            Some(mailbox) => mailbox.clone(),
            None => return PlaybackState::Idle,
        };

        let (reply, response) = oneshot::channel();
        if mailbox.send(Message::State { reply }).is_err() {
            return PlaybackState::Idle;
        }

        response.await.unwrap_or(PlaybackState::Idle)
    }

    async fn send(&self, guild_id: GuildId, message: Message<B::Source>) -> Result<(), MusicError> {
        let mut players = self.inner.players.lock().await;
        let mailbox = players
            .entry(guild_id)
            .or_insert_with(|| GuildPlayer::spawn(guild_id, &self.inner));

        mailbox.send(message).map_err(|_| MusicError::PlayerGone)
    }
}

struct GuildPlayer<B: AudioBackend> {
    guild_id: GuildId,
    store: Arc<PlaylistStore>,
    backend: Arc<B>,
    stop_behavior: StopBehavior,
    events: mpsc::UnboundedSender<PlayerEvent>,
    mailbox: Mailbox<B::Source>,
    state: PlaybackState,
    generation: u64,
    pending: Option<oneshot::Sender<Result<String, MusicError>>>,
    voice_channel: Option<ChannelId>,
    text_channel: Option<ChannelId>,
    /// Set once this session has joined voice, cleared whenever it leaves.
    connected: bool,
}

impl<B: AudioBackend> GuildPlayer<B> {
    fn spawn(guild_id: GuildId, inner: &Inner<B>) -> Mailbox<B::Source> {
        let (mailbox, inbox) = mpsc::unbounded_channel();

        let player = GuildPlayer {
            guild_id,
            store: inner.store.clone(),
            backend: inner.backend.clone(),
            stop_behavior: inner.stop_behavior,
            events: inner.events.clone(),
            mailbox: mailbox.clone(),
            state: PlaybackState::Idle,
            generation: 0,
            pending: None,
            voice_channel: None,
            text_channel: None,
            connected: false,
        };

        tokio::spawn(
            player
                .run(inbox)
                .instrument(info_span!("guild_player", guild_id = guild_id.0)),
        );

        mailbox
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message<B::Source>>) {
        debug!("Player started");

        while let Some(message) = inbox.recv().await {
            match message {
                Message::Play {
                    voice_channel,
                    text_channel,
                    reply,
                } => self.play(voice_channel, text_channel, reply).await,
                Message::Skip { reply } => {
                    let result = self.skip().await;
                    let _ = reply.send(result);
                }
                Message::Stop { reply } => {
                    let result = self.stop().await;
                    let _ = reply.send(result);
                }
                Message::Disconnected => self.forget_session().await,
                Message::State { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                Message::Loaded { generation, result } => self.loaded(generation, result).await,
                Message::TrackEnded { generation } => self.track_ended(generation).await,
            }
        }
    }

    async fn play(
        &mut self,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        reply: oneshot::Sender<Result<String, MusicError>>,
    ) {
        if self.state != PlaybackState::Idle {
            let _ = reply.send(Err(MusicError::AlreadyPlaying));
            return;
        }

        let Some(url) = self.store.playlist(self.guild_id).await.into_iter().next() else {
            let _ = reply.send(Err(MusicError::EmptyPlaylist));
            return;
        };

        self.voice_channel = Some(voice_channel);
        self.text_channel = Some(text_channel);
        self.pending = Some(reply);
        self.begin_loading(url);
    }

    fn begin_loading(&mut self, url: String) {
        self.generation += 1;
        let generation = self.generation;

        info!("Loading {url}");
        self.state = PlaybackState::Loading { url: url.clone() };

        let backend = self.backend.clone();
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = backend.load(&url).await;
            let _ = mailbox.send(Message::Loaded { generation, result });
        });
    }

    async fn loaded(&mut self, generation: u64, result: Result<B::Source, MusicError>) {
        if generation != self.generation {
            debug!("Dropping stale load for generation {generation}");
            return;
        }

        let PlaybackState::Loading { url } = self.state.clone() else {
            return;
        };

        let outcome = match result {
            Ok(source) => self.start(source, generation).await,
            Err(why) => Err(why),
        };

        match outcome {
            Ok(()) => {
                info!("Now playing {url}");
                self.state = PlaybackState::Playing { url: url.clone() };

                match self.pending.take() {
                    Some(reply) => {
                        let _ = reply.send(Ok(url));
                    }
                    None => self.announce(PlayerEventKind::NowPlaying(url)),
                }
            }
            Err(why) => {
                error!("Could not play {url}: {why}");
                self.state = PlaybackState::Idle;
                self.leave().await;

                match self.pending.take() {
                    Some(reply) => {
                        let _ = reply.send(Err(why));
                    }
                    None => self.announce(PlayerEventKind::PlaybackFailed(url)),
                }
            }
        }
    }

    async fn start(&mut self, source: B::Source, generation: u64) -> Result<(), MusicError> {
        let voice_channel = self
            .voice_channel
            .ok_or_else(|| MusicError::Voice("no voice channel to join".to_string()))?;

        self.backend.connect(self.guild_id, voice_channel).await?;
        self.connected = true;

        let mailbox = self.mailbox.clone();
        let on_end = TrackEnd::new(move || {
            let _ = mailbox.send(Message::TrackEnded { generation });
        });

        self.backend.start(self.guild_id, source, on_end).await
    }

    async fn track_ended(&mut self, generation: u64) {
        if generation != self.generation {
            debug!("Ignoring end of a replaced track");
            return;
        }

        let PlaybackState::Playing { url } = self.state.clone() else {
            return;
        };

        info!("Finished {url}");
        self.advance(&url).await;
    }

    async fn skip(&mut self) -> Result<Option<String>, MusicError> {
        let Some(current) = self.state.current_url().map(str::to_string) else {
            return Err(MusicError::NotPlaying);
        };

        if let Some(reply) = self.pending.take() {
            let _ = reply.send(Err(MusicError::Cancelled));
        }

        // the halted track will still report its end; it must not count as a finish
        self.generation += 1;
        self.backend.halt(self.guild_id).await;

        Ok(self.advance(&current).await)
    }

    /// Consumes `finished` and starts whatever is next, or tears the session down.
    async fn advance(&mut self, finished: &str) -> Option<String> {
        if let Err(why) = self.store.consume(self.guild_id, finished).await {
            error!("Failed to persist playlist after {finished}: {why}");
        }

        match self.store.playlist(self.guild_id).await.into_iter().next() {
            Some(next) => {
                self.begin_loading(next.clone());
                Some(next)
            }
            None => {
                info!("Queue finished");
                self.generation += 1;
                self.state = PlaybackState::Idle;
                self.leave().await;
                self.announce(PlayerEventKind::QueueFinished);
                None
            }
        }
    }

    async fn stop(&mut self) -> Result<(), MusicError> {
        self.generation += 1;
        self.state = PlaybackState::Stopping;

        if let Some(reply) = self.pending.take() {
            let _ = reply.send(Err(MusicError::Cancelled));
        }

        let disconnected = self.backend.disconnect(self.guild_id).await;
        self.connected = false;
        self.state = PlaybackState::Idle;

        if self.stop_behavior == StopBehavior::ClearPlaylist {
            self.store.clear(self.guild_id).await?;
        }

        info!("Playback stopped");
        disconnected
    }

    async fn forget_session(&mut self) {
        if self.state == PlaybackState::Idle || !self.connected {
            debug!("Ignoring voice disconnect, this session has not joined voice");
            return;
        }

        // a late event for a channel we already left and rejoined
        if self.backend.is_connected(self.guild_id).await {
            debug!("Ignoring voice disconnect, the connection is still up");
            return;
        }

        warn!("Voice connection dropped while {:?}", self.state);
        self.generation += 1;
        self.state = PlaybackState::Idle;

        if let Some(reply) = self.pending.take() {
            let _ = reply.send(Err(MusicError::Cancelled));
        }

        self.leave().await;
    }

    async fn leave(&mut self) {
        if let Err(why) = self.backend.disconnect(self.guild_id).await {
            warn!("Failed to leave voice: {why}");
        }

        self.connected = false;
    }

    fn announce(&self, kind: PlayerEventKind) {
        if let Some(text_channel) = self.text_channel {
            let _ = self.events.send(PlayerEvent {
                guild_id: self.guild_id,
                text_channel,
                kind,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::sync::Notify;

    use super::*;

    const GUILD: GuildId = GuildId(1);
    const VOICE: ChannelId = ChannelId(10);
    const TEXT: ChannelId = ChannelId(20);

    #[derive(Default)]
    struct FakeBackend {
        failing: StdMutex<HashSet<String>>,
        gates: StdMutex<HashMap<String, Arc<Notify>>>,
        connected: StdMutex<HashSet<GuildId>>,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        halts: AtomicUsize,
        started: StdMutex<Vec<String>>,
        track_ends: StdMutex<Vec<TrackEnd>>,
    }

    impl FakeBackend {
        fn fail(&self, url: &str) {
            self.failing.lock().unwrap().insert(url.to_string());
        }

        fn gate(&self, url: &str) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            self.gates.lock().unwrap().insert(url.to_string(), notify.clone());
            notify
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }

        fn connected(&self) -> bool {
            self.connected.lock().unwrap().contains(&GUILD)
        }

        /// Someone else removed the bot from voice.
        fn kick(&self) {
            self.connected.lock().unwrap().remove(&GUILD);
        }

        /// Fires the completion callback of the n-th started track.
        fn finish(&self, index: usize) {
            let on_end = self.track_ends.lock().unwrap()[index].clone();
            on_end.notify();
        }
    }

    #[async_trait]
    impl AudioBackend for FakeBackend {
        type Source = String;

        async fn load(&self, url: &str) -> Result<String, MusicError> {
            let gate = self.gates.lock().unwrap().get(url).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            if self.failing.lock().unwrap().contains(url) {
                return Err(MusicError::Source {
                    url: url.to_string(),
                    reason: "video unavailable".to_string(),
                });
            }

            Ok(url.to_string())
        }

        async fn is_connected(&self, guild_id: GuildId) -> bool {
            self.connected.lock().unwrap().contains(&guild_id)
        }

        async fn connect(&self, guild_id: GuildId, _channel_id: ChannelId) -> Result<(), MusicError> {
            if self.connected.lock().unwrap().insert(guild_id) {
                self.connects.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn start(
            &self,
            _guild_id: GuildId,
            source: String,
            on_end: TrackEnd,
        ) -> Result<(), MusicError> {
            self.started.lock().unwrap().push(source);
            self.track_ends.lock().unwrap().push(on_end);
            Ok(())
        }

        async fn halt(&self, _guild_id: GuildId) {
            self.halts.fetch_add(1, Ordering::SeqCst);
        }

        async fn disconnect(&self, guild_id: GuildId) -> Result<(), MusicError> {
            if self.connected.lock().unwrap().remove(&guild_id) {
                self.disconnects.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        backend: Arc<FakeBackend>,
        manager: MusicManager<FakeBackend>,
        events: mpsc::UnboundedReceiver<PlayerEvent>,
    }

    async fn harness(stop_behavior: StopBehavior) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(PlaylistStore::load(dir.path().join("playlists.json")).await);
        let backend = Arc::new(FakeBackend::default());
        let (events_tx, events) = mpsc::unbounded_channel();
        let manager = MusicManager::new(store, backend.clone(), stop_behavior, events_tx);

        Harness {
            _dir: dir,
            backend,
            manager,
            events,
        }
    }

    async fn wait_for(manager: &MusicManager<FakeBackend>, expected: PlaybackState) {
        for _ in 0..200 {
            if manager.state(GUILD).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("player never reached {expected:?}, last {:?}", manager.state(GUILD).await);
    }

    fn playing(url: &str) -> PlaybackState {
        PlaybackState::Playing { url: url.to_string() }
    }

    #[tokio::test]
    async fn test_empty_playlist_never_opens_a_connection() {
        let h = harness(StopBehavior::ClearPlaylist).await;

        let result = h.manager.play(GUILD, VOICE, TEXT).await;

        assert!(matches!(result, Err(MusicError::EmptyPlaylist)));
        assert_eq!(h.backend.connects.load(Ordering::SeqCst), 0);
        assert_eq!(h.manager.state(GUILD).await, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_queue_advances_and_removal_does_not_touch_current_track() {
        // Arrange
        let mut h = harness(StopBehavior::ClearPlaylist).await;
        h.manager.add_song(GUILD, "A").await.unwrap();
        h.manager.add_song(GUILD, "B").await.unwrap();
        assert_eq!(h.manager.playlist(GUILD).await, vec!["A", "B"]);

        // Act: play A, let it finish
        let started = h.manager.play(GUILD, VOICE, TEXT).await.unwrap();
        assert_eq!(started, "A");
        h.backend.finish(0);
        wait_for(&h.manager, playing("B")).await;

        // Assert: A consumed, B announced
        assert_eq!(h.manager.playlist(GUILD).await, vec!["B"]);
        assert_eq!(
            h.events.recv().await.unwrap().kind,
            PlayerEventKind::NowPlaying("B".to_string())
        );

        // Act: remove B while it plays
        assert_eq!(h.manager.remove_song(GUILD, "B").await.unwrap(), 1);

        // Assert: still playing B
        assert!(h.manager.playlist(GUILD).await.is_empty());
        assert_eq!(h.manager.state(GUILD).await, playing("B"));
        assert!(h.backend.connected());

        // Act: B finishes with nothing left
        h.backend.finish(1);
        wait_for(&h.manager, PlaybackState::Idle).await;

        // Assert: torn down exactly once, same connection reused for both tracks
        assert!(!h.backend.connected());
        assert_eq!(h.backend.connects.load(Ordering::SeqCst), 1);
        assert_eq!(h.backend.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(h.backend.started(), vec!["A", "B"]);
        assert_eq!(h.events.recv().await.unwrap().kind, PlayerEventKind::QueueFinished);
    }

    #[tokio::test]
    async fn test_failed_source_is_reported_and_kept_in_queue() {
        let h = harness(StopBehavior::ClearPlaylist).await;
        h.backend.fail("broken");
        h.manager.add_song(GUILD, "broken").await.unwrap();
        h.manager.add_song(GUILD, "fine").await.unwrap();

        let result = h.manager.play(GUILD, VOICE, TEXT).await;

        assert!(matches!(result, Err(MusicError::Source { .. })));
        assert_eq!(h.manager.playlist(GUILD).await, vec!["broken", "fine"]);
        assert!(h.backend.started().is_empty());
        assert!(!h.backend.connected());
        assert_eq!(h.manager.state(GUILD).await, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_failure_during_auto_advance_aborts_the_chain() {
        let mut h = harness(StopBehavior::ClearPlaylist).await;
        h.backend.fail("broken");
        for url in ["A", "broken", "C"] {
            h.manager.add_song(GUILD, url).await.unwrap();
        }

        h.manager.play(GUILD, VOICE, TEXT).await.unwrap();
        h.backend.finish(0);

        assert_eq!(
            h.events.recv().await.unwrap().kind,
            PlayerEventKind::PlaybackFailed("broken".to_string())
        );
        wait_for(&h.manager, PlaybackState::Idle).await;
        assert_eq!(h.manager.playlist(GUILD).await, vec!["broken", "C"]);
        assert_eq!(h.backend.started(), vec!["A"]);
        assert!(!h.backend.connected());
    }

    #[tokio::test]
    async fn test_second_play_is_rejected_while_playing() {
        let h = harness(StopBehavior::ClearPlaylist).await;
        h.manager.add_song(GUILD, "A").await.unwrap();
        h.manager.play(GUILD, VOICE, TEXT).await.unwrap();

        let result = h.manager.play(GUILD, VOICE, TEXT).await;

        assert!(matches!(result, Err(MusicError::AlreadyPlaying)));
        assert_eq!(h.backend.started(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_stop_while_playing_disconnects_and_clears() {
        let h = harness(StopBehavior::ClearPlaylist).await;
        h.manager.add_song(GUILD, "A").await.unwrap();
        h.manager.add_song(GUILD, "B").await.unwrap();
        h.manager.play(GUILD, VOICE, TEXT).await.unwrap();

        h.manager.stop(GUILD).await.unwrap();

        assert!(!h.backend.connected());
        assert_eq!(h.manager.state(GUILD).await, PlaybackState::Idle);
        assert!(h.manager.playlist(GUILD).await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_can_keep_the_playlist() {
        let h = harness(StopBehavior::KeepPlaylist).await;
        h.manager.add_song(GUILD, "A").await.unwrap();
        h.manager.play(GUILD, VOICE, TEXT).await.unwrap();

        h.manager.stop(GUILD).await.unwrap();

        assert!(!h.backend.connected());
        assert_eq!(h.manager.playlist(GUILD).await, vec!["A"]);
    }

    #[tokio::test]
    async fn test_stop_when_idle_leaves_no_connection() {
        let h = harness(StopBehavior::KeepPlaylist).await;

        h.manager.stop(GUILD).await.unwrap();

        assert!(!h.backend.connected());
        assert_eq!(h.manager.state(GUILD).await, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_stop_during_load_discards_the_late_stream() {
        // Arrange
        let h = harness(StopBehavior::KeepPlaylist).await;
        let gate = h.backend.gate("slow");
        h.manager.add_song(GUILD, "slow").await.unwrap();

        let manager = h.manager.clone();
        let play = tokio::spawn(async move { manager.play(GUILD, VOICE, TEXT).await });
        wait_for(&h.manager, PlaybackState::Loading { url: "slow".to_string() }).await;

        // Act
        h.manager.stop(GUILD).await.unwrap();
        gate.notify_one();

        // Assert
        assert!(matches!(play.await.unwrap(), Err(MusicError::Cancelled)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.backend.started().is_empty());
        assert!(!h.backend.connected());
        assert_eq!(h.manager.state(GUILD).await, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_skip_moves_to_next_and_ignores_the_halted_track_end() {
        let h = harness(StopBehavior::ClearPlaylist).await;
        for url in ["A", "B"] {
            h.manager.add_song(GUILD, url).await.unwrap();
        }
        h.manager.play(GUILD, VOICE, TEXT).await.unwrap();

        let next = h.manager.skip(GUILD).await.unwrap();
        wait_for(&h.manager, playing("B")).await;
        h.backend.finish(0);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(next.as_deref(), Some("B"));
        assert_eq!(h.backend.halts.load(Ordering::SeqCst), 1);
        assert_eq!(h.manager.state(GUILD).await, playing("B"));
        assert_eq!(h.manager.playlist(GUILD).await, vec!["B"]);
    }

    #[tokio::test]
    async fn test_skip_requires_an_active_session() {
        let h = harness(StopBehavior::ClearPlaylist).await;
        h.manager.add_song(GUILD, "A").await.unwrap();

        let result = h.manager.skip(GUILD).await;

        assert!(matches!(result, Err(MusicError::NotPlaying)));
    }

    #[tokio::test]
    async fn test_external_disconnect_keeps_playlist_and_allows_replay() {
        let h = harness(StopBehavior::ClearPlaylist).await;
        h.manager.add_song(GUILD, "A").await.unwrap();
        h.manager.play(GUILD, VOICE, TEXT).await.unwrap();

        h.backend.kick();
        h.manager.disconnected(GUILD).await;
        wait_for(&h.manager, PlaybackState::Idle).await;
        h.backend.finish(0);

        assert_eq!(h.manager.playlist(GUILD).await, vec!["A"]);
        assert_eq!(h.manager.play(GUILD, VOICE, TEXT).await.unwrap(), "A");
    }

    #[tokio::test]
    async fn test_late_disconnect_from_a_stopped_session_spares_the_next_play() {
        // Arrange
        let h = harness(StopBehavior::KeepPlaylist).await;
        h.manager.add_song(GUILD, "A").await.unwrap();
        h.manager.play(GUILD, VOICE, TEXT).await.unwrap();
        h.manager.stop(GUILD).await.unwrap();

        let gate = h.backend.gate("A");
        let manager = h.manager.clone();
        let play = tokio::spawn(async move { manager.play(GUILD, VOICE, TEXT).await });
        wait_for(&h.manager, PlaybackState::Loading { url: "A".to_string() }).await;

        // Act: the gateway reports the leave caused by the stop above
        h.manager.disconnected(GUILD).await;
        gate.notify_one();

        // Assert
        assert_eq!(play.await.unwrap().unwrap(), "A");
        assert_eq!(h.manager.state(GUILD).await, playing("A"));
        assert!(h.backend.connected());
    }

    #[tokio::test]
    async fn test_late_disconnect_while_still_connected_is_ignored() {
        let h = harness(StopBehavior::KeepPlaylist).await;
        h.manager.add_song(GUILD, "A").await.unwrap();
        h.manager.play(GUILD, VOICE, TEXT).await.unwrap();

        h.manager.disconnected(GUILD).await;

        assert_eq!(h.manager.state(GUILD).await, playing("A"));
        assert_eq!(h.backend.disconnects.load(Ordering::SeqCst), 0);
    }
}
