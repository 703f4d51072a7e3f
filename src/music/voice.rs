use std::sync::Arc;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::Input;
use songbird::{ytdl, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent};
use tracing::info;

use super::{AudioBackend, MusicError, TrackEnd};

/// Plays through songbird, decoding sources with yt-dlp.
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>) -> Self {
        SongbirdBackend { manager }
    }
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    type Source = Input;

    async fn load(&self, url: &str) -> Result<Input, MusicError> {
        ytdl(url).await.map_err(|why| {
            info!("Err starting source: {why:?}");

            MusicError::Source {
                url: url.to_string(),
                reason: why.to_string(),
            }
        })
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.manager.get(guild_id) {
            Some(handler_lock) => handler_lock.lock().await.current_channel().is_some(),
            None => false,
        }
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        if self.is_connected(guild_id).await {
            return Ok(());
        }

        let (handler_lock, joined) = self.manager.join(guild_id, channel_id).await;
        joined.map_err(|why| MusicError::Voice(why.to_string()))?;

        let mut handler = handler_lock.lock().await;

        if handler.is_deaf() {
            info!("Already deafen!")
        } else if let Err(e) = handler.deafen(true).await {
            info!("Deafen failed due to {e:?}")
        }

        Ok(())
    }

    async fn start(&self, guild_id: GuildId, source: Input, on_end: TrackEnd) -> Result<(), MusicError> {
        let handler_lock = self
            .manager
            .get(guild_id)
            .ok_or_else(|| MusicError::Voice("not in a voice channel to play in".to_string()))?;

        let mut handler = handler_lock.lock().await;

        handler.stop(); // Just in case something was playing before
        let track_handle = handler.play_source(source);

        track_handle
            .add_event(Event::Track(TrackEvent::End), TrackEndNotifier { on_end })
            .map_err(|why| MusicError::Voice(why.to_string()))
    }

    async fn halt(&self, guild_id: GuildId) {
        if let Some(handler_lock) = self.manager.get(guild_id) {
            handler_lock.lock().await.stop();
        }
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), MusicError> {
        if self.manager.get(guild_id).is_none() {
            return Ok(());
        }

        self.halt(guild_id).await;

        self.manager
            .remove(guild_id)
            .await
            .map_err(|why| MusicError::Voice(why.to_string()))?;

        info!("Left voice channel");

        Ok(())
    }
}

struct TrackEndNotifier {
    on_end: TrackEnd,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        info!("End notifier triggered");

        self.on_end.notify();

        None
    }
}
