use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use dotenvy::dotenv;
use serenity::{client::Client, http::Http, prelude::GatewayIntents};
use songbird::{SerenityInit, Songbird};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::commands::check_msg;
use crate::config::{Config, DEFAULT_LOG_DIR};
use crate::error::BotResult;
use crate::features::ai_chat::AiChat;
use crate::handler::Handler;
use crate::music::{MusicManager, PlayerEvent, PlayerEventKind, SongbirdBackend};
use crate::playlists::PlaylistStore;
use crate::settings::SettingsClient;

mod commands;
mod config;
mod error;
mod extractor;
mod features;
mod handler;
mod logging;
mod models;
mod music;
mod playlists;
mod settings;

#[tokio::main]
async fn main() {
    let dotenv_result = dotenv();
    let config = Config::from_env();

    let log_dir = config
        .as_ref()
        .map(|config| config.log_dir.clone())
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));

    let guard = logging::init_logging(&log_dir);
    logging::install_crash_hook(log_dir);

    if let Err(why) = dotenv_result {
        warn!("No .env file loaded: {why}");
    }

    let result = match config {
        Ok(config) => run(Arc::new(config)).await,
        Err(why) => Err(why),
    };

    if let Err(why) = result {
        error!("Fatal error: {why}");
        drop(guard);
        process::exit(1);
    }

    info!("Shut down cleanly.");
}

async fn run(config: Arc<Config>) -> BotResult {
    let settings = Arc::new(SettingsClient::new(
        config.api_endpoint.clone(),
        config.accept_invalid_certs,
    )?);

    let store = Arc::new(PlaylistStore::load(config.playlist_path.clone()).await);
    info!("Playlists loaded from {}", store.path().display());

    let songbird = Songbird::serenity();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let music = MusicManager::new(
        store,
        Arc::new(SongbirdBackend::new(songbird.clone())),
        config.stop_behavior,
        events_tx,
    );

    let chat = match config.ai.clone() {
        Some(ai) => Some(Arc::new(AiChat::new(ai, config.memory_dir.clone())?)),
        None => {
            info!("GEMINI_API_KEY is not set, AI chat is disabled");
            None
        }
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::DIRECT_MESSAGES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler::new(config.clone(), settings, music, chat))
        .application_id(config.application_id)
        .register_songbird_with(songbird)
        .await?;

    tokio::spawn(announce_player_events(client.cache_and_http.http.clone(), events_rx));

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(why) = tokio::signal::ctrl_c().await {
            error!("Control-C interruption failed: {why}");
            return;
        }

        info!("Received Ctrl-C, shutting down.");
        shard_manager.lock().await.shutdown_all().await;
    });

    client.start().await?;

    Ok(())
}

/// Posts the outcome of automatic queue advances in the channel each session was started from.
async fn announce_player_events(http: Arc<Http>, mut events: mpsc::UnboundedReceiver<PlayerEvent>) {
    while let Some(event) = events.recv().await {
        let content = match &event.kind {
            PlayerEventKind::NowPlaying(url) => format!("🎶 Now playing: {url}"),
            PlayerEventKind::PlaybackFailed(url) => {
                format!("❌ Unable to play {url}. Playback has stopped, use /music_remove to drop it.")
            }
            PlayerEventKind::QueueFinished => "✅ The playlist has finished.".to_string(),
        };

        info!("Guild {}: {content}", event.guild_id.0);
        check_msg(event.text_channel.say(&http, content).await);
    }
}
