//! Per-guild queue and playback.
//!
//! Each guild gets one actor task that owns its playback session. Commands, load completions
//! and track-end callbacks all arrive on that task's channel, so transitions for one guild never
//! interleave. Stale completions are recognised by the generation they were started with.

mod player;
mod voice;

use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;

pub use self::player::{AudioBackend, MusicManager, TrackEnd};
pub use self::voice::SongbirdBackend;

#[derive(Debug, Error)]
pub enum MusicError {
    #[error("the playlist is empty")]
    EmptyPlaylist,

    #[error("something is already playing")]
    AlreadyPlaying,

    #[error("nothing is playing")]
    NotPlaying,

    #[error("playback was cancelled")]
    Cancelled,

    #[error("could not load {url}: {reason}")]
    Source { url: String, reason: String },

    #[error("voice connection failed: {0}")]
    Voice(String),

    #[error("the player for this guild has shut down")]
    PlayerGone,

    #[error(transparent)]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Whether `stop` also empties the persisted playlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopBehavior {
    ClearPlaylist,
    KeepPlaylist,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading { url: String },
    Playing { url: String },
    Stopping,
}

impl PlaybackState {
    pub fn current_url(&self) -> Option<&str> {
        match self {
            PlaybackState::Loading { url } | PlaybackState::Playing { url } => Some(url),
            PlaybackState::Idle | PlaybackState::Stopping => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerEventKind {
    NowPlaying(String),
    PlaybackFailed(String),
    QueueFinished,
}

/// Outcome of an automatic advance, to be announced in the channel the session started from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerEvent {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    pub kind: PlayerEventKind,
}
